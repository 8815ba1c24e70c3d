//! Retrying wrapper around a generator.
//!
//! Each call is bounded by `attempt_timeout`; transient failures (see
//! [`LlmError::is_transient`]) are asked again after a jittered, doubling pause.
//! Stage deadlines in the use cases sit on top of this.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse};

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Extra attempts after the first one.
    pub max_retries: u32,
    /// Pause before the first retry; doubled for each one after.
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Fraction of the pause that may be added or removed at random (0.0 to 1.0).
    pub jitter_factor: f64,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 250,
            max_delay_ms: 4000,
            jitter_factor: 0.2,
            attempt_timeout: Some(Duration::from_secs(20)),
        }
    }
}

impl RetryConfig {
    /// Pause before retry number `retry` (1-based), before jitter.
    fn backoff(&self, retry: u32) -> u64 {
        let doublings = retry.saturating_sub(1).min(32);
        self.base_delay_ms
            .saturating_mul(1u64 << doublings)
            .min(self.max_delay_ms)
    }

    fn pause(&self, retry: u32) -> Duration {
        let nominal = self.backoff(retry);
        let spread = (nominal as f64 * self.jitter_factor.clamp(0.0, 1.0)) as u64;
        if spread == 0 {
            return Duration::from_millis(nominal);
        }
        let offset = rand::thread_rng().gen_range(0..=spread * 2);
        Duration::from_millis((nominal + offset).saturating_sub(spread))
    }
}

pub struct ResilientLlmClient {
    inner: Arc<dyn LlmPort>,
    config: RetryConfig,
}

impl ResilientLlmClient {
    pub fn new(inner: Arc<dyn LlmPort>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn call_once(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let Some(limit) = self.config.attempt_timeout else {
            return self.inner.generate(request).await;
        };
        match tokio::time::timeout(limit, self.inner.generate(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(LlmError::timeout(limit)),
        }
    }
}

#[async_trait]
impl LlmPort for ResilientLlmClient {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let attempts = self.config.max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            let error = match self.call_once(request.clone()).await {
                Ok(response) => {
                    if attempt > 1 {
                        tracing::info!(attempt, "Generator answered after retrying");
                    }
                    return Ok(response);
                }
                Err(error) => error,
            };

            if !error.is_transient() {
                tracing::warn!(attempt, error = %error, "Generator call failed, not retrying");
                return Err(error);
            }
            if attempt >= attempts {
                tracing::error!(attempts, error = %error, "Generator call failed on every attempt");
                return Err(error);
            }

            let pause = self.config.pause(attempt);
            tracing::warn!(
                attempt,
                attempts,
                pause_ms = pause.as_millis() as u64,
                error = %error,
                "Generator call failed, retrying"
            );
            tokio::time::sleep(pause).await;
            attempt += 1;
        }
    }
}
