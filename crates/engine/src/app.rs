//! Application state and composition.

use std::sync::Arc;

use crate::infrastructure::{
    clock::SystemClock,
    ports::{ClockPort, IntentClassifierPort, LlmPort, NarrativePort, WorldStateRepo},
    resilient_llm::ResilientLlmClient,
    settings::EngineSettings,
    world_store::InMemoryWorldStore,
};
use crate::use_cases::TurnService;

/// Main application state.
///
/// Holds the wired turn service plus the settings it was built from.
pub struct App {
    pub settings: EngineSettings,
    pub turns: Arc<TurnService>,
}

impl App {
    /// Create a new App with all dependencies wired up.
    ///
    /// The raw LLM is wrapped with retry and a per-attempt deadline; the turn service
    /// still applies its own stage deadline on top.
    pub fn new(
        settings: EngineSettings,
        repo: Arc<dyn WorldStateRepo>,
        classifier: Arc<dyn IntentClassifierPort>,
        llm: Arc<dyn LlmPort>,
        narrator: Arc<dyn NarrativePort>,
        clock: Arc<dyn ClockPort>,
    ) -> Self {
        tracing::info!(
            max_retries = settings.retry.max_retries,
            base_delay_ms = settings.retry.base_delay_ms,
            generator_timeout_ms = settings.generator_timeout.as_millis() as u64,
            "LLM client configured with retry"
        );
        let llm: Arc<dyn LlmPort> = Arc::new(ResilientLlmClient::new(llm, settings.retry.clone()));

        let turns = Arc::new(TurnService::new(
            repo,
            classifier,
            llm,
            narrator,
            clock,
            settings.night.clone(),
            settings.generator_timeout,
        ));

        Self { settings, turns }
    }

    /// In-memory storage and the system clock.
    pub fn in_memory(
        settings: EngineSettings,
        classifier: Arc<dyn IntentClassifierPort>,
        llm: Arc<dyn LlmPort>,
        narrator: Arc<dyn NarrativePort>,
    ) -> Self {
        Self::new(
            settings,
            Arc::new(InMemoryWorldStore::new()),
            classifier,
            llm,
            narrator,
            Arc::new(SystemClock::new()),
        )
    }
}
