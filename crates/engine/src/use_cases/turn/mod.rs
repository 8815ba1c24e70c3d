//! Turn service: the caller-facing entry point.
//!
//! A day turn runs status tick, lock check, day pipeline, auto-acquire and ending check
//! against an in-memory copy of the player's world, renders the narrative, and stores the
//! result with a single write at the very end. Dropping the future before that write
//! leaves the stored state untouched. Turns for one player are serialized by a per-player
//! mutex; different players never wait on each other.

mod result;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dollhouse_domain::{
    merge, DomainError, EndingMatch, PlayerKey, ScenarioAssets, ScenarioId, StateDelta,
    ValidationIssue, WorldState,
};
use serde_json::json;
use tokio::sync::Mutex;

use crate::infrastructure::ports::{
    ClockPort, IntentClassifierPort, LlmPort, NarrativeKind, NarrativePort, NarrativeRequest,
    WorldStateRepo,
};
use crate::use_cases::day::DayController;
use crate::use_cases::ending::EndingChecker;
use crate::use_cases::items::ItemAcquirer;
use crate::use_cases::locks::LockManager;
use crate::use_cases::night::{NightController, NightSettings};
use crate::use_cases::status::StatusEffectManager;
use crate::use_cases::world_state::{apply_logged, WorldStateManager};

pub use result::{NightDebug, NightResult, StateResult, TurnDebug, TurnError, TurnResult};

pub struct TurnService {
    scenarios: DashMap<ScenarioId, Arc<ScenarioAssets>>,
    player_locks: DashMap<PlayerKey, Arc<Mutex<()>>>,
    state: WorldStateManager,
    day: DayController,
    night: NightController,
    narrator: Arc<dyn NarrativePort>,
    locks: LockManager,
    endings: EndingChecker,
    acquirer: ItemAcquirer,
    status: StatusEffectManager,
    generator_timeout: Duration,
}

impl TurnService {
    pub fn new(
        repo: Arc<dyn WorldStateRepo>,
        classifier: Arc<dyn IntentClassifierPort>,
        llm: Arc<dyn LlmPort>,
        narrator: Arc<dyn NarrativePort>,
        clock: Arc<dyn ClockPort>,
        night: NightSettings,
        generator_timeout: Duration,
    ) -> Self {
        Self {
            scenarios: DashMap::new(),
            player_locks: DashMap::new(),
            state: WorldStateManager::new(repo),
            day: DayController::new(classifier, llm.clone(), clock.clone(), generator_timeout),
            night: NightController::new(llm, clock.clone(), night, generator_timeout),
            narrator,
            locks: LockManager::new(clock),
            endings: EndingChecker::new(),
            acquirer: ItemAcquirer::new(),
            status: StatusEffectManager::new(),
            generator_timeout,
        }
    }

    /// Make a scenario playable. Authoring problems are logged and returned, never fatal.
    pub fn register_scenario(&self, assets: ScenarioAssets) -> Vec<ValidationIssue> {
        let issues = assets.validate();
        for issue in &issues {
            tracing::warn!(
                scenario_id = %assets.scenario_id,
                location = %issue.location,
                message = %issue.message,
                "Scenario validation issue"
            );
        }
        tracing::info!(
            scenario_id = %assets.scenario_id,
            npcs = assets.npcs.len(),
            rules = assets.rules.len(),
            issues = issues.len(),
            "Scenario registered"
        );
        self.scenarios
            .insert(assets.scenario_id.clone(), Arc::new(assets));
        issues
    }

    pub fn scenario(&self, scenario_id: &ScenarioId) -> Result<Arc<ScenarioAssets>, TurnError> {
        self.scenarios
            .get(scenario_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| TurnError::UnknownScenario(scenario_id.clone()))
    }

    pub async fn state(&self, key: &PlayerKey) -> Result<WorldState, TurnError> {
        let assets = self.scenario(&key.scenario_id)?;
        Ok(self.state.get_state(key, &assets).await?)
    }

    pub async fn reset(&self, key: &PlayerKey) -> Result<WorldState, TurnError> {
        let assets = self.scenario(&key.scenario_id)?;
        let lock = self.player_lock(key);
        let _guard = lock.lock().await;
        Ok(self.state.reset(key, &assets).await?)
    }

    pub async fn process_turn(&self, key: &PlayerKey, raw_input: &str) -> Result<TurnResult, TurnError> {
        let assets = self.scenario(&key.scenario_id)?;
        let lock = self.player_lock(key);
        let _guard = lock.lock().await;

        let start = self.state.get_state(key, &assets).await?;
        reject_if_ended(&start)?;
        tracing::info!(player = %key, turn = start.turn, "Processing day turn");

        let mut stages = Stages::new(&assets, start);
        let mut debug = TurnDebug {
            turn_before: stages.world.turn,
            ..TurnDebug::default()
        };

        let tick = self.status.tick(&stages.world);
        debug.expired_effects = tick.expired.iter().map(|e| e.effect_id.clone()).collect();
        stages.push_events(&tick.delta);
        stages.apply("status_tick", tick.delta)?;
        stages.step(json!({ "stage": "status_tick", "expired": debug.expired_effects.len() }));

        let unlocks = self.locks.check_unlocks(&stages.world, &assets);
        debug.unlocked = unlocks.unlocked.iter().map(|u| u.lock_id.clone()).collect();
        stages.push_events(&unlocks.delta);
        stages.apply("lock_check", unlocks.delta)?;
        stages.step(json!({ "stage": "lock_check", "unlocked": debug.unlocked }));

        let day = self.day.run(raw_input, &stages.world, &assets).await;
        stages.events.extend(day.events.iter().cloned());
        stages.apply("day", day.delta)?;
        stages.step(json!({
            "stage": "day",
            "intent": day.intent,
            "classified": day.classified,
            "tool_delta": day.tool_delta,
            "rule_delta": day.rule_delta,
        }));
        debug.day_trace = day.trace;
        debug.tool = Some(day.intent.tool);
        debug.classified = day.classified;
        debug.fired_rules = day.fired_rules;

        let acquisition = self.acquirer.scan(&stages.world, &assets);
        for item_id in &acquisition.items {
            let name = assets
                .item(item_id.as_str())
                .map(|i| i.name.to_lowercase())
                .unwrap_or_else(|| item_id.as_str().replace('_', " "));
            stages.events.push(format!("You now have the {}.", name));
        }
        debug.acquired = acquisition.items;
        stages.apply("auto_acquire", acquisition.delta)?;
        stages.step(json!({ "stage": "auto_acquire", "acquired": debug.acquired }));

        let ending = self.enter_ending(&mut stages, &assets)?;

        let (world, delta, events, steps, dropped) = stages.finish();
        debug.turn_after = world.turn;
        debug.steps = steps;
        debug.dropped = dropped;

        let narrative = self
            .narrate(NarrativeRequest {
                kind: if ending.is_some() {
                    NarrativeKind::Ending
                } else {
                    NarrativeKind::Day
                },
                turn: debug.turn_before,
                events,
                delta: delta.clone(),
                ending: ending.clone(),
            })
            .await;

        self.state.persist(key, &world).await?;
        tracing::info!(
            player = %key,
            turn_after = world.turn,
            ending = ?ending.as_ref().map(|e| &e.ending_id),
            "Day turn stored"
        );

        Ok(TurnResult {
            narrative,
            ending_info: ending,
            state_result: StateResult { delta, world },
            rejection: day.rejection,
            debug,
        })
    }

    pub async fn process_night(&self, key: &PlayerKey) -> Result<NightResult, TurnError> {
        let assets = self.scenario(&key.scenario_id)?;
        let lock = self.player_lock(key);
        let _guard = lock.lock().await;

        let start = self.state.get_state(key, &assets).await?;
        reject_if_ended(&start)?;
        tracing::info!(player = %key, turn = start.turn, "Processing night");

        let outcome = self.night.run(&start, &assets).await;
        let mut stages = Stages::new(&assets, start);
        for utterance in &outcome.conversation_log {
            stages.events.push(format!(
                "{}: \"{}\"",
                assets.npc_name(utterance.speaker.as_str()),
                utterance.text
            ));
        }
        stages.events.extend(outcome.descriptions.iter().cloned());
        stages.apply("night", outcome.night_delta.clone())?;

        let ending = self.enter_ending(&mut stages, &assets)?;
        let (world, delta, events, _, dropped) = stages.finish();

        let narrative = self
            .narrate(NarrativeRequest {
                kind: if ending.is_some() {
                    NarrativeKind::Ending
                } else {
                    NarrativeKind::Night
                },
                turn: world.turn,
                events,
                delta,
                ending: ending.clone(),
            })
            .await;

        self.state.persist(key, &world).await?;

        Ok(NightResult {
            night_delta: outcome.night_delta,
            conversation_log: outcome.conversation_log,
            narrative,
            ending_info: ending,
            debug: NightDebug {
                turn: world.turn,
                pairs: outcome.pairs,
                reflected: outcome.reflected,
                planned: outcome.planned,
                descriptions: outcome.descriptions,
                dropped,
            },
            world,
        })
    }

    /// Check endings against the staged world and merge the entry effects of a match.
    fn enter_ending(
        &self,
        stages: &mut Stages<'_>,
        assets: &ScenarioAssets,
    ) -> Result<Option<EndingMatch>, DomainError> {
        let Some(ending) = self.endings.check_ending(&stages.world, assets) else {
            return Ok(None);
        };
        let entry = self.endings.entry_delta(&ending, &stages.world, assets);
        stages.push_events(&entry);
        stages.apply("ending", entry)?;
        stages.step(json!({ "stage": "ending", "ending_id": ending.ending_id }));
        tracing::info!(
            ending_id = %ending.ending_id,
            turn = ending.matched_turn,
            "Ending reached"
        );
        Ok(Some(ending))
    }

    async fn narrate(&self, request: NarrativeRequest) -> String {
        let fallback = request.fallback_text();
        match tokio::time::timeout(self.generator_timeout, self.narrator.render(request)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => text,
            Ok(Ok(_)) => fallback,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Narrative render failed, using event lines");
                fallback
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.generator_timeout.as_millis() as u64,
                    "Narrative render timed out, using event lines"
                );
                fallback
            }
        }
    }

    fn player_lock(&self, key: &PlayerKey) -> Arc<Mutex<()>> {
        self.player_locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn reject_if_ended(world: &WorldState) -> Result<(), TurnError> {
    match &world.ending {
        Some(ending) => Err(TurnError::SessionEnded {
            ending_id: ending.ending_id.clone(),
        }),
        None => Ok(()),
    }
}

/// The staged world plus everything applied to it so far.
struct Stages<'a> {
    assets: &'a ScenarioAssets,
    world: WorldState,
    applied: Vec<StateDelta>,
    events: Vec<String>,
    steps: Vec<serde_json::Value>,
    dropped: Vec<String>,
}

impl<'a> Stages<'a> {
    fn new(assets: &'a ScenarioAssets, world: WorldState) -> Self {
        Self {
            assets,
            world,
            applied: Vec::new(),
            events: Vec::new(),
            steps: Vec::new(),
            dropped: Vec::new(),
        }
    }

    fn apply(&mut self, stage: &'static str, delta: StateDelta) -> Result<(), DomainError> {
        if delta.is_empty() {
            return Ok(());
        }
        let applied = apply_logged(stage, &self.world, &delta, self.assets)?;
        self.dropped.extend(applied.dropped.iter().map(|d| {
            format!("{}: {} '{}' ({})", stage, d.field, d.reference, d.reason)
        }));
        self.world = applied.state;
        self.applied.push(delta);
        Ok(())
    }

    fn push_events(&mut self, delta: &StateDelta) {
        self.events.extend(delta.events.iter().cloned());
    }

    fn step(&mut self, record: serde_json::Value) {
        self.steps.push(record);
    }

    fn finish(self) -> (WorldState, StateDelta, Vec<String>, Vec<serde_json::Value>, Vec<String>) {
        (
            self.world,
            merge(self.applied),
            self.events,
            self.steps,
            self.dropped,
        )
    }
}
