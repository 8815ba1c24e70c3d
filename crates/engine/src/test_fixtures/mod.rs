//! Shared test scaffolding: the attic scenario from `test_data/` and a scripted generator
//! that answers by prompt task.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dollhouse_domain::{PlayerKey, ScenarioAssets, WorldState};

use crate::infrastructure::clock::FixedClock;
use crate::infrastructure::ports::{LlmError, LlmPort, LlmRequest, LlmResponse};
use crate::use_cases::prompts::PromptTask;

/// Parse a JSON file under `test_data/`, panicking with the path on any failure.
pub fn load_fixture<T: serde::de::DeserializeOwned>(relative: &str) -> T {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_data").join(relative);
    let raw = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", path.display()));
    serde_json::from_str(&raw).unwrap_or_else(|e| panic!("cannot parse {}: {e}", path.display()))
}

/// The four-NPC household used across engine tests.
pub fn attic() -> ScenarioAssets {
    load_fixture("scenarios/attic.json")
}

pub fn attic_world() -> WorldState {
    WorldState::from_scenario(&attic())
}

pub fn player_key() -> PlayerKey {
    PlayerKey::new("alice", "attic")
}

pub fn fixed_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock(
        Utc.with_ymd_and_hms(2026, 3, 14, 21, 0, 0)
            .single()
            .unwrap_or_else(Utc::now),
    ))
}

// =============================================================================
// Scripted LLM
// =============================================================================

type Responder = dyn Fn(PromptTask, &LlmRequest) -> Result<String, LlmError> + Send + Sync;

/// Deterministic `LlmPort`: answers come from a closure keyed on the prompt's task.
pub struct ScriptedLlm {
    responder: Box<Responder>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new(
        responder: impl Fn(PromptTask, &LlmRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            delay: None,
        }
    }

    /// Plausible answers for every task.
    pub fn household() -> Self {
        Self::new(|task, _| Ok(household_answer(task).to_string()))
    }

    /// Every call fails.
    pub fn failing() -> Self {
        Self::new(|_, _| Err(LlmError::RequestFailed("scripted failure".to_string())))
    }

    /// Sleep before answering, to exercise timeouts and cancellation.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

pub fn household_answer(task: PromptTask) -> &'static str {
    match task {
        PromptTask::NpcTalk => r#"{"reply": "Keep your voice down.", "npc_stats": {"affection": 1}}"#,
        PromptTask::Reflection => "- The new child is hiding something\n- Mother watches the garden door",
        PromptTask::Plan => "LONG: Keep the family together\nSHORT: Talk to grandmother about the garden door",
        PromptTask::Dialogue => "Did you hear the door last night?",
        PromptTask::Impact => {
            r#"{"npc_stats": {"brother": {"suspicion": 1}, "grandmother": {"affection": 5}, "stepmother": {"fear": -1}, "sister": {"fear": 1}}}"#
        }
        PromptTask::Unknown => "",
    }
}

#[async_trait]
impl LlmPort for ScriptedLlm {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let task = PromptTask::of(&request);
        (self.responder)(task, &request).map(LlmResponse::text)
    }
}
