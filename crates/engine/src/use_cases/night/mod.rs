//! Night controller.
//!
//! Four phases run strictly in order: reflection, planning, group dialogue, impact
//! analysis. Each phase reads the memories the previous one wrote, so the controller keeps
//! a working copy of every NPC's memory alongside the delta it builds. Nothing is applied
//! here; the turn service applies `night_delta` in one step.

mod impact;
mod ledger;
mod pairing;
mod parse;

use std::sync::Arc;
use std::time::Duration;

use dollhouse_domain::{
    rule_based_importance, MemoryEntry, MemoryKind, NpcId, NpcPlan, ScenarioAssets, StateDelta,
    WorldState,
};
use futures_util::future::join_all;
use serde::Serialize;

use crate::infrastructure::ports::{ClockPort, LlmPort};
use crate::use_cases::generation::generate_text;
use crate::use_cases::prompts;

use ledger::NightLedger;

pub use impact::{parse_impact, StatChanges, MAX_NIGHT_STAT_CHANGE};
pub use pairing::{select_pairs, PairCandidate};
pub use parse::{parse_insights, parse_plan};

/// Importance given to every synthesized insight.
pub const REFLECTION_IMPORTANCE: f32 = 8.0;
const PLAN_IMPORTANCE: f32 = 5.0;
const PLAN_RECALL: usize = 8;
const DIALOGUE_RECALL: usize = 4;
const REFLECTION_CANDIDATE_LIMIT: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct NightSettings {
    /// Base seed for pairing; the night's turn is added so each night differs.
    pub seed: u64,
    pub max_pairs: usize,
    pub utterances_per_pair: usize,
    /// Accumulated importance an NPC must exceed before it reflects. Reaching it
    /// exactly is not enough.
    pub reflection_threshold: f32,
    pub reflection_window_turns: u32,
    pub min_reflection_importance: f32,
    pub max_insights: usize,
}

impl Default for NightSettings {
    fn default() -> Self {
        Self {
            seed: 42,
            max_pairs: 2,
            utterances_per_pair: 6,
            reflection_threshold: 40.0,
            reflection_window_turns: 5,
            min_reflection_importance: 5.0,
            max_insights: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Utterance {
    pub speaker: NpcId,
    pub listener: NpcId,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct NightOutcome {
    pub night_delta: StateDelta,
    pub conversation_log: Vec<Utterance>,
    /// Speaker first.
    pub pairs: Vec<(NpcId, NpcId)>,
    /// Plain-language lines for the narrator, fallbacks included.
    pub descriptions: Vec<String>,
    pub reflected: Vec<NpcId>,
    pub planned: Vec<NpcId>,
}

/// What a speaker brings into a conversation: their plan and the memories it calls up.
#[derive(Default)]
struct Briefing {
    plan: Option<NpcPlan>,
    memories: Vec<MemoryEntry>,
}

impl Briefing {
    fn recall(
        speaker: &NpcId,
        listener: &NpcId,
        world: &WorldState,
        assets: &ScenarioAssets,
        ledger: &NightLedger,
    ) -> Self {
        let Some(memory) = ledger.memory(speaker) else {
            return Self::default();
        };
        let listener_name = assets.npc_name(listener.as_str());
        let query = match &memory.plan {
            Some(plan) => format!("{} {}", listener_name, plan.short_term),
            None => listener_name.to_string(),
        };
        Self {
            plan: memory.plan.clone(),
            memories: memory
                .retrieve(&query, world.turn, DIALOGUE_RECALL)
                .into_iter()
                .cloned()
                .collect(),
        }
    }
}

pub struct NightController {
    llm: Arc<dyn LlmPort>,
    clock: Arc<dyn ClockPort>,
    settings: NightSettings,
    generator_timeout: Duration,
}

impl NightController {
    pub fn new(
        llm: Arc<dyn LlmPort>,
        clock: Arc<dyn ClockPort>,
        settings: NightSettings,
        generator_timeout: Duration,
    ) -> Self {
        Self {
            llm,
            clock,
            settings,
            generator_timeout,
        }
    }

    pub async fn run(&self, world: &WorldState, assets: &ScenarioAssets) -> NightOutcome {
        let mut ledger = NightLedger::new(world);
        let mut outcome = NightOutcome::default();

        outcome.reflected = self.reflect(world, assets, &mut ledger).await;
        outcome.planned = self.plan(world, assets, &mut ledger).await;
        outcome.pairs = self.choose_pairs(world, assets, &ledger);
        let transcripts = self
            .converse(&outcome.pairs, world, assets, &mut ledger, &mut outcome.conversation_log)
            .await;
        self.analyze_impact(&transcripts, assets, &mut ledger).await;

        tracing::info!(
            turn = world.turn,
            reflected = outcome.reflected.len(),
            planned = outcome.planned.len(),
            pairs = outcome.pairs.len(),
            utterances = outcome.conversation_log.len(),
            "Night pipeline complete"
        );

        let (night_delta, descriptions) = ledger.finish();
        outcome.night_delta = night_delta;
        outcome.descriptions = descriptions;
        outcome
    }

    // =========================================================================
    // Phase 1: reflection
    // =========================================================================

    async fn reflect(
        &self,
        world: &WorldState,
        assets: &ScenarioAssets,
        ledger: &mut NightLedger,
    ) -> Vec<NpcId> {
        let mut requests = Vec::new();
        for (npc_id, state) in &world.npcs {
            let memory = ledger.memory(npc_id).unwrap_or(&state.memory);
            if memory.accumulated_importance <= self.settings.reflection_threshold {
                continue;
            }
            let mut candidates = memory.recent(
                world.turn,
                self.settings.reflection_window_turns,
                self.settings.min_reflection_importance,
            );
            candidates.retain(|m| m.kind.counts_toward_reflection());
            if candidates.is_empty() {
                continue;
            }
            // Keep the most important, then restore chronological order.
            candidates.sort_by(|a, b| b.importance.total_cmp(&a.importance));
            candidates.truncate(REFLECTION_CANDIDATE_LIMIT);
            candidates.sort_by_key(|m| m.creation_turn);

            let (name, persona) = match assets.npc(npc_id.as_str()) {
                Some(def) => (def.name.as_str(), def.persona.as_str()),
                None => (npc_id.as_str(), ""),
            };
            requests.push((
                npc_id.clone(),
                prompts::reflection(name, persona, &candidates, self.settings.max_insights),
            ));
        }

        let results = join_all(requests.into_iter().map(|(npc_id, request)| async move {
            let result =
                generate_text(self.llm.as_ref(), request, self.generator_timeout, "reflection").await;
            (npc_id, result)
        }))
        .await;

        let now = self.clock.now();
        let mut reflected = Vec::new();
        for (npc_id, result) in results {
            let name = assets.npc_name(npc_id.as_str()).to_string();
            let insights = result
                .map(|text| parse_insights(&text, self.settings.max_insights))
                .unwrap_or_default();
            if insights.is_empty() {
                ledger.describe(format!("{} lies awake, thoughts going nowhere.", name));
                continue;
            }
            ledger.reset_importance(&npc_id, world.turn);
            for insight in insights {
                ledger.remember(
                    &npc_id,
                    MemoryEntry::new(
                        insight,
                        MemoryKind::Reflection,
                        REFLECTION_IMPORTANCE,
                        world.turn,
                        now,
                    ),
                );
            }
            tracing::debug!(npc_id = %npc_id, "Reflection stored");
            reflected.push(npc_id);
        }
        reflected
    }

    // =========================================================================
    // Phase 2: planning
    // =========================================================================

    async fn plan(
        &self,
        world: &WorldState,
        assets: &ScenarioAssets,
        ledger: &mut NightLedger,
    ) -> Vec<NpcId> {
        let mut requests = Vec::new();
        for (npc_id, state) in &world.npcs {
            let memory = ledger.memory(npc_id).unwrap_or(&state.memory);
            let others: Vec<&str> = world
                .npcs
                .keys()
                .filter(|other| *other != npc_id)
                .map(|other| assets.npc_name(other.as_str()))
                .collect();
            let (name, persona) = match assets.npc(npc_id.as_str()) {
                Some(def) => (def.name.as_str(), def.persona.as_str()),
                None => (npc_id.as_str(), ""),
            };
            let query = match &memory.plan {
                Some(plan) => format!("{} {}", plan.long_term, others.join(" ")),
                None => others.join(" "),
            };
            let memories = memory.retrieve(&query, world.turn, PLAN_RECALL);
            requests.push((
                npc_id.clone(),
                prompts::plan(name, persona, &state.stats, &memories, memory.plan.as_ref(), &others),
            ));
        }

        let results = join_all(requests.into_iter().map(|(npc_id, request)| async move {
            let result =
                generate_text(self.llm.as_ref(), request, self.generator_timeout, "plan").await;
            (npc_id, result)
        }))
        .await;

        let now = self.clock.now();
        let mut planned = Vec::new();
        for (npc_id, result) in results {
            let previous = ledger.memory(&npc_id).and_then(|m| m.plan.clone());
            let plan = result
                .ok()
                .and_then(|text| parse_plan(&text, previous.as_ref(), world.turn));
            let Some(plan) = plan else {
                ledger.describe(format!(
                    "{} keeps to yesterday's routine.",
                    assets.npc_name(npc_id.as_str())
                ));
                continue;
            };
            ledger.remember(
                &npc_id,
                MemoryEntry::new(
                    format!("My plan: {}", plan.short_term),
                    MemoryKind::Plan,
                    PLAN_IMPORTANCE,
                    world.turn,
                    now,
                ),
            );
            ledger.set_plan(&npc_id, plan);
            planned.push(npc_id);
        }
        planned
    }

    // =========================================================================
    // Phase 3: group dialogue
    // =========================================================================

    fn choose_pairs(
        &self,
        world: &WorldState,
        assets: &ScenarioAssets,
        ledger: &NightLedger,
    ) -> Vec<(NpcId, NpcId)> {
        let candidates: Vec<PairCandidate> = world
            .npcs
            .iter()
            .filter(|(npc_id, _)| assets.npc(npc_id.as_str()).is_some())
            .map(|(npc_id, state)| PairCandidate {
                npc_id: npc_id.clone(),
                name: assets.npc_name(npc_id.as_str()).to_string(),
                plan: ledger
                    .memory(npc_id)
                    .unwrap_or(&state.memory)
                    .plan
                    .clone(),
            })
            .collect();
        let seed = self.settings.seed.wrapping_add(u64::from(world.turn));
        let pairs = select_pairs(&candidates, seed, self.settings.max_pairs);
        tracing::debug!(seed, pairs = ?pairs, "Night pairs selected");
        pairs
    }

    async fn converse(
        &self,
        pairs: &[(NpcId, NpcId)],
        world: &WorldState,
        assets: &ScenarioAssets,
        ledger: &mut NightLedger,
        log: &mut Vec<Utterance>,
    ) -> Vec<PairTranscript> {
        let briefings: Vec<(Briefing, Briefing)> = pairs
            .iter()
            .map(|(first, second)| {
                (
                    Briefing::recall(first, second, world, assets, ledger),
                    Briefing::recall(second, first, world, assets, ledger),
                )
            })
            .collect();
        let conversations = join_all(
            pairs
                .iter()
                .zip(&briefings)
                .map(|((first, second), briefings)| self.conversation(first, second, briefings, assets)),
        )
        .await;

        let now = self.clock.now();
        let mut transcripts = Vec::new();
        for ((first, second), (utterances, cut_short)) in pairs.iter().zip(conversations) {
            let first_name = assets.npc_name(first.as_str());
            let second_name = assets.npc_name(second.as_str());
            if cut_short {
                ledger.describe(format!(
                    "{} and {} fall silent and go to bed.",
                    first_name, second_name
                ));
            }
            if utterances.is_empty() {
                continue;
            }
            ledger.describe(format!("{} and {} talk late into the night.", first_name, second_name));

            let mut lines = Vec::with_capacity(utterances.len());
            for utterance in utterances {
                let speaker_name = assets.npc_name(utterance.speaker.as_str());
                let listener_name = assets.npc_name(utterance.listener.as_str());
                for (owner, description) in [
                    (
                        &utterance.speaker,
                        format!("I told {}: \"{}\"", listener_name, utterance.text),
                    ),
                    (
                        &utterance.listener,
                        format!("{} told me: \"{}\"", speaker_name, utterance.text),
                    ),
                ] {
                    ledger.remember(
                        owner,
                        MemoryEntry::new(
                            description.clone(),
                            MemoryKind::Dialogue,
                            rule_based_importance(&description),
                            world.turn,
                            now,
                        ),
                    );
                }
                lines.push(format!("{}: {}", speaker_name, utterance.text));
                log.push(utterance);
            }
            transcripts.push(PairTranscript {
                pair: (first.clone(), second.clone()),
                lines,
            });
        }
        transcripts
    }

    /// One pair's exchange. Speakers alternate; the first failed line ends it.
    async fn conversation(
        &self,
        first: &NpcId,
        second: &NpcId,
        briefings: &(Briefing, Briefing),
        assets: &ScenarioAssets,
    ) -> (Vec<Utterance>, bool) {
        let mut utterances = Vec::new();
        let mut transcript: Vec<String> = Vec::new();
        for turn in 0..self.settings.utterances_per_pair {
            let (speaker, listener, briefing) = if turn % 2 == 0 {
                (first, second, &briefings.0)
            } else {
                (second, first, &briefings.1)
            };
            let Some(definition) = assets.npc(speaker.as_str()) else {
                return (utterances, true);
            };
            let request = prompts::dialogue(
                definition,
                assets.npc_name(listener.as_str()),
                briefing.plan.as_ref(),
                &briefing.memories.iter().collect::<Vec<_>>(),
                &transcript,
            );
            let text = match generate_text(self.llm.as_ref(), request, self.generator_timeout, "dialogue")
                .await
            {
                Ok(raw) => parse::clean_utterance(&raw, &definition.name),
                Err(_) => None,
            };
            let Some(text) = text else {
                return (utterances, true);
            };
            transcript.push(format!("{}: {}", definition.name, text));
            utterances.push(Utterance {
                speaker: speaker.clone(),
                listener: listener.clone(),
                text,
            });
        }
        (utterances, false)
    }

    // =========================================================================
    // Phase 4: impact analysis
    // =========================================================================

    async fn analyze_impact(
        &self,
        transcripts: &[PairTranscript],
        assets: &ScenarioAssets,
        ledger: &mut NightLedger,
    ) {
        let stat_names: Vec<&str> = assets.stat_names().collect();
        let results = join_all(transcripts.iter().map(|transcript| {
            let (first, second) = &transcript.pair;
            let participants = [
                (first.as_str(), assets.npc_name(first.as_str())),
                (second.as_str(), assets.npc_name(second.as_str())),
            ];
            let request = prompts::impact(&participants, &stat_names, &transcript.lines);
            generate_text(self.llm.as_ref(), request, self.generator_timeout, "impact")
        }))
        .await;

        for (transcript, result) in transcripts.iter().zip(results) {
            let (first, second) = &transcript.pair;
            match result {
                Ok(text) => {
                    let changes = parse_impact(&text, (first, second), assets, &stat_names);
                    tracing::debug!(first = %first, second = %second, changes = ?changes, "Impact parsed");
                    ledger.add_stats(changes);
                }
                Err(_) => ledger.describe(format!(
                    "Nobody can tell what {} and {} made of it.",
                    assets.npc_name(first.as_str()),
                    assets.npc_name(second.as_str())
                )),
            }
        }
    }
}

#[derive(Debug, Clone)]
struct PairTranscript {
    pair: (NpcId, NpcId),
    lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::LlmError;
    use crate::test_fixtures::{attic, attic_world, fixed_clock, household_answer, ScriptedLlm};
    use crate::use_cases::prompts::PromptTask;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn controller(llm: ScriptedLlm, settings: NightSettings) -> NightController {
        NightController::new(Arc::new(llm), fixed_clock(), settings, Duration::from_secs(1))
    }

    fn stressed_world() -> WorldState {
        let mut world = attic_world();
        world.turn = 6;
        let now = fixed_clock().0;
        if let Some(sister) = world.npcs.get_mut("sister") {
            for i in 0..6 {
                sister.memory.record(MemoryEntry::new(
                    format!("I found evidence in the study ({})", i),
                    MemoryKind::Observation,
                    8.0,
                    5,
                    now,
                ));
            }
        }
        world
    }

    #[tokio::test]
    async fn runs_all_four_phases() {
        let outcome = controller(ScriptedLlm::household(), NightSettings::default())
            .run(&stressed_world(), &attic())
            .await;

        assert_eq!(outcome.reflected, vec![NpcId::new("sister")]);
        assert_eq!(outcome.planned.len(), 4);
        assert_eq!(outcome.pairs.len(), 2);
        assert_eq!(outcome.conversation_log.len(), 12);

        let sister = &outcome.night_delta.memory_updates["sister"];
        assert_eq!(sister.reset_importance, Some(6));
        assert!(sister.plan.is_some());
        let insights = sister
            .append
            .iter()
            .filter(|m| m.kind == MemoryKind::Reflection)
            .count();
        assert_eq!(insights, 2);
        assert_eq!(outcome.night_delta.turn_increment, 0);
    }

    #[tokio::test]
    async fn plan_mentions_pair_first_and_impact_is_clamped() {
        let outcome = controller(ScriptedLlm::household(), NightSettings::default())
            .run(&attic_world(), &attic())
            .await;

        // Every household plan mentions grandmother; brother is first in id order.
        assert_eq!(
            outcome.pairs[0],
            (NpcId::new("brother"), NpcId::new("grandmother"))
        );
        let stats = &outcome.night_delta.npc_stats;
        assert_eq!(stats["grandmother"]["affection"], MAX_NIGHT_STAT_CHANGE);
        assert_eq!(stats["brother"]["suspicion"], 1);
    }

    #[tokio::test]
    async fn same_seed_gives_same_pairs_and_stats() {
        let settings = NightSettings {
            max_pairs: 2,
            ..NightSettings::default()
        };
        let no_plans = || {
            ScriptedLlm::new(|task, _| match task {
                PromptTask::Plan => Ok("LONG: Survive\nSHORT: Sleep early".to_string()),
                other => Ok(household_answer(other).to_string()),
            })
        };

        let first = controller(no_plans(), settings.clone())
            .run(&attic_world(), &attic())
            .await;
        let second = controller(no_plans(), settings)
            .run(&attic_world(), &attic())
            .await;

        assert_eq!(first.pairs, second.pairs);
        assert_eq!(first.night_delta.npc_stats, second.night_delta.npc_stats);
        assert_eq!(first.conversation_log, second.conversation_log);
    }

    #[tokio::test]
    async fn when_generator_fails_every_phase_falls_back() {
        let outcome = controller(ScriptedLlm::failing(), NightSettings::default())
            .run(&stressed_world(), &attic())
            .await;

        assert!(outcome.reflected.is_empty());
        assert!(outcome.planned.is_empty());
        assert!(outcome.conversation_log.is_empty());
        assert!(outcome.night_delta.npc_stats.is_empty());
        assert!(outcome
            .descriptions
            .iter()
            .any(|d| d == "Sister lies awake, thoughts going nowhere."));
        assert!(outcome.descriptions.iter().any(|d| d.ends_with("fall silent and go to bed.")));
    }

    #[tokio::test]
    async fn reflection_needs_more_than_the_threshold() {
        // The sister has accumulated exactly 48.
        let at_threshold = NightSettings {
            reflection_threshold: 48.0,
            ..NightSettings::default()
        };
        let outcome = controller(ScriptedLlm::household(), at_threshold)
            .run(&stressed_world(), &attic())
            .await;
        assert!(outcome.reflected.is_empty());

        let just_below = NightSettings {
            reflection_threshold: 47.5,
            ..NightSettings::default()
        };
        let outcome = controller(ScriptedLlm::household(), just_below)
            .run(&stressed_world(), &attic())
            .await;
        assert_eq!(outcome.reflected, vec![NpcId::new("sister")]);
    }

    #[tokio::test]
    async fn speakers_bring_relevant_memories_into_dialogue() {
        let recalled = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&recalled);
        // No plans or insights tonight, so only the day's observations can be recalled.
        let llm = ScriptedLlm::new(move |task, request| match task {
            PromptTask::Plan | PromptTask::Reflection => {
                Err(LlmError::RequestFailed("overloaded".to_string()))
            }
            PromptTask::Dialogue => {
                let text = request.full_text();
                if text.contains("You are Sister") && text.contains("evidence in the study") {
                    seen.store(true, Ordering::SeqCst);
                }
                Ok(household_answer(task).to_string())
            }
            other => Ok(household_answer(other).to_string()),
        });

        controller(llm, NightSettings::default())
            .run(&stressed_world(), &attic())
            .await;

        assert!(recalled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dialogue_failure_midway_keeps_earlier_lines() {
        let llm = ScriptedLlm::new(|task, request| match task {
            PromptTask::Dialogue if request.full_text().contains("Did you hear") => {
                Err(LlmError::RequestFailed("overloaded".to_string()))
            }
            other => Ok(household_answer(other).to_string()),
        });

        let outcome = controller(llm, NightSettings::default())
            .run(&attic_world(), &attic())
            .await;

        assert_eq!(outcome.conversation_log.len(), 2);
        let brother = &outcome.night_delta.memory_updates["brother"];
        assert!(brother
            .append
            .iter()
            .any(|m| m.kind == MemoryKind::Dialogue && m.description.starts_with("I told Grandmother")));
    }
}
