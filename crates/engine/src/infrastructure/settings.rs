//! Engine settings loaded from environment variables.
//!
//! Every value has a default, so an empty environment yields a working engine.
//! Unparseable values are logged and replaced by their default.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::infrastructure::resilient_llm::RetryConfig;
use crate::use_cases::night::NightSettings;

const DEFAULT_GENERATOR_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Overall deadline for one generator-backed stage (classification, a tool call, a
    /// night phase call, narration).
    pub generator_timeout: Duration,
    pub retry: RetryConfig,
    pub night: NightSettings,
    pub scenario_path: Option<PathBuf>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            generator_timeout: Duration::from_millis(DEFAULT_GENERATOR_TIMEOUT_MS),
            retry: RetryConfig::default(),
            night: NightSettings::default(),
            scenario_path: None,
        }
    }
}

impl EngineSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let read = Reader { lookup: &lookup };

        let generator_timeout = Duration::from_millis(
            read.parse("GENERATOR_TIMEOUT_MS", DEFAULT_GENERATOR_TIMEOUT_MS),
        );
        let retry = RetryConfig {
            max_retries: read.parse("GENERATOR_MAX_RETRIES", defaults.retry.max_retries),
            base_delay_ms: read.parse("GENERATOR_BASE_DELAY_MS", defaults.retry.base_delay_ms),
            // A single attempt never outlives the stage deadline.
            attempt_timeout: Some(generator_timeout),
            ..defaults.retry
        };
        let night = NightSettings {
            seed: read.parse("NIGHT_SEED", defaults.night.seed),
            max_pairs: read.parse("NIGHT_MAX_PAIRS", defaults.night.max_pairs),
            utterances_per_pair: read
                .parse("NIGHT_UTTERANCES_PER_PAIR", defaults.night.utterances_per_pair),
            reflection_threshold: read
                .parse("REFLECTION_THRESHOLD", defaults.night.reflection_threshold),
            ..defaults.night
        };

        Self {
            generator_timeout,
            retry,
            night,
            scenario_path: lookup("DOLLHOUSE_SCENARIO_PATH").map(PathBuf::from),
        }
    }
}

struct Reader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Reader<'_, F> {
    fn parse<T: FromStr>(&self, name: &str, default: T) -> T {
        let Some(raw) = (self.lookup)(name) else {
            return default;
        };
        match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(variable = name, value = %raw, "Ignoring unparseable setting");
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> EngineSettings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineSettings::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let s = settings(&[]);
        assert_eq!(s.generator_timeout, Duration::from_millis(30_000));
        assert_eq!(s.night.max_pairs, NightSettings::default().max_pairs);
        assert!(s.scenario_path.is_none());
    }

    #[test]
    fn reads_overrides_and_ignores_garbage() {
        let s = settings(&[
            ("GENERATOR_TIMEOUT_MS", "1500"),
            ("NIGHT_SEED", "7"),
            ("NIGHT_MAX_PAIRS", "many"),
            ("REFLECTION_THRESHOLD", "12.5"),
            ("DOLLHOUSE_SCENARIO_PATH", "scenarios/attic.json"),
        ]);
        assert_eq!(s.generator_timeout, Duration::from_millis(1500));
        assert_eq!(s.retry.attempt_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(s.night.seed, 7);
        assert_eq!(s.night.max_pairs, NightSettings::default().max_pairs);
        assert_eq!(s.night.reflection_threshold, 12.5);
        assert_eq!(
            s.scenario_path,
            Some(PathBuf::from("scenarios/attic.json"))
        );
    }
}
