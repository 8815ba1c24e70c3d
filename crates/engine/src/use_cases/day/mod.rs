//! Day controller.
//!
//! One day turn walks a fixed sequence of phases: classify the input, select a tool, run
//! it, evaluate rules, merge. The controller reads the world but never writes it; the
//! turn service applies the merged delta.

mod selection;
mod tools;

use std::sync::Arc;
use std::time::Duration;

use dollhouse_domain::{merge, EndingMatch, RuleId, ScenarioAssets, StateDelta, WorldState};
use serde::Serialize;

use crate::infrastructure::ports::{ClassifiedIntent, ClockPort, IntentClassifierPort, LlmPort};
use crate::use_cases::intent::ResolvedIntent;
use crate::use_cases::items::ItemRejection;
use crate::use_cases::rules::RuleEngine;

pub use selection::select_tool;
pub use tools::{ToolExecution, ToolExecutor, MAX_TALK_STAT_CHANGE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayPhase {
    AwaitingIntent,
    ToolSelected,
    ToolExecuted,
    RulesApplied,
    Merged,
    Done,
}

#[derive(Debug, Clone)]
pub struct DayOutcome {
    pub intent: ResolvedIntent,
    /// False when the classifier failed and the default reading was used.
    pub classified: bool,
    pub events: Vec<String>,
    pub tool_delta: StateDelta,
    pub rule_delta: StateDelta,
    /// `tool_delta` and `rule_delta` merged, plus the turn advance.
    pub delta: StateDelta,
    pub fired_rules: Vec<RuleId>,
    pub rejection: Option<ItemRejection>,
    pub ending_preview: Option<EndingMatch>,
    pub trace: Vec<DayPhase>,
}

pub struct DayController {
    classifier: Arc<dyn IntentClassifierPort>,
    tools: ToolExecutor,
    rules: RuleEngine,
    generator_timeout: Duration,
}

impl DayController {
    pub fn new(
        classifier: Arc<dyn IntentClassifierPort>,
        llm: Arc<dyn LlmPort>,
        clock: Arc<dyn ClockPort>,
        generator_timeout: Duration,
    ) -> Self {
        Self {
            classifier,
            tools: ToolExecutor::new(llm, clock, generator_timeout),
            rules: RuleEngine::new(),
            generator_timeout,
        }
    }

    pub async fn run(&self, raw_input: &str, world: &WorldState, assets: &ScenarioAssets) -> DayOutcome {
        let mut trace = vec![DayPhase::AwaitingIntent];

        let (classified, ok) = self.classify(raw_input, world).await;
        let intent = select_tool(raw_input, &classified, world);
        trace.push(DayPhase::ToolSelected);
        tracing::debug!(
            tool = %intent.tool,
            overridden = intent.overridden,
            intent = ?intent.intent,
            active_npc = ?intent.active_npc,
            "Tool selected"
        );

        let execution = self.tools.execute(&intent, world, assets).await;
        trace.push(DayPhase::ToolExecuted);

        let rules = self.rules.evaluate(&intent, world, assets);
        trace.push(DayPhase::RulesApplied);

        let mut delta = merge([execution.delta.clone(), rules.delta.clone()]);
        delta.turn_increment = delta.turn_increment.saturating_add(1);
        trace.push(DayPhase::Merged);

        let mut events = execution.events;
        events.extend(rules.delta.events.iter().cloned());
        trace.push(DayPhase::Done);

        DayOutcome {
            intent,
            classified: ok,
            events,
            tool_delta: execution.delta,
            rule_delta: rules.delta,
            delta,
            fired_rules: rules.fired,
            rejection: execution.rejection,
            ending_preview: execution.item_use.and_then(|u| u.ending_preview),
            trace,
        }
    }

    async fn classify(&self, raw_input: &str, world: &WorldState) -> (ClassifiedIntent, bool) {
        let result = tokio::time::timeout(
            self.generator_timeout,
            self.classifier.classify(raw_input, world),
        )
        .await;
        match result {
            Ok(Ok(classified)) => (classified, true),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Intent classification failed, defaulting to npc_talk");
                (ClassifiedIntent::default(), false)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.generator_timeout.as_millis() as u64,
                    "Intent classification timed out, defaulting to npc_talk"
                );
                (ClassifiedIntent::default(), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{ClassifierError, MockIntentClassifierPort, ToolArgs};
    use crate::test_fixtures::{attic, attic_world, fixed_clock, ScriptedLlm};
    use crate::use_cases::intent::ToolName;
    use dollhouse_domain::{ItemId, NpcId, StateValue};

    fn controller(classifier: MockIntentClassifierPort) -> DayController {
        DayController::new(
            Arc::new(classifier),
            Arc::new(ScriptedLlm::household()),
            fixed_clock(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn talk_turn_walks_every_phase() {
        let mut classifier = MockIntentClassifierPort::new();
        classifier
            .expect_classify()
            .withf(|input, _| input.to_string() == "There, there.")
            .returning(|_, _| {
                Ok(ClassifiedIntent {
                    tool_name: "npc_talk".to_string(),
                    args: ToolArgs {
                        npc_id: Some(NpcId::new("brother")),
                        ..ToolArgs::default()
                    },
                    intent: Some("comfort".to_string()),
                })
            });

        let outcome = controller(classifier)
            .run("There, there.", &attic_world(), &attic())
            .await;

        assert_eq!(
            outcome.trace,
            vec![
                DayPhase::AwaitingIntent,
                DayPhase::ToolSelected,
                DayPhase::ToolExecuted,
                DayPhase::RulesApplied,
                DayPhase::Merged,
                DayPhase::Done,
            ]
        );
        assert_eq!(outcome.fired_rules, vec![RuleId::new("comfort")]);
        // Reply +1 from the generator, +5 from the comfort rule.
        assert_eq!(outcome.delta.npc_stats["brother"]["affection"], 6);
        assert_eq!(outcome.delta.turn_increment, 1);
        assert_eq!(outcome.events, vec!["Brother: \"Keep your voice down.\""]);
    }

    #[tokio::test]
    async fn when_classifier_fails_defaults_to_talk() {
        let mut classifier = MockIntentClassifierPort::new();
        classifier
            .expect_classify()
            .returning(|_, _| Err(ClassifierError::Unavailable));

        let outcome = controller(classifier).run("hello?", &attic_world(), &attic()).await;

        assert!(!outcome.classified);
        assert_eq!(outcome.intent.tool, ToolName::NpcTalk);
        assert_eq!(outcome.delta.turn_increment, 1);
        assert_eq!(outcome.trace.last(), Some(&DayPhase::Done));
    }

    #[tokio::test]
    async fn usage_override_reaches_the_item_resolver() {
        let mut world = attic_world();
        world.inventory.insert(ItemId::new("brass_key"));
        world
            .vars
            .insert("location".to_string(), StateValue::text("player_room"));
        let mut classifier = MockIntentClassifierPort::new();
        classifier.expect_classify().returning(|_, _| {
            Ok(ClassifiedIntent {
                tool_name: "action".to_string(),
                args: ToolArgs {
                    item_id: Some(ItemId::new("brass_key")),
                    target: Some("doghole".to_string()),
                    ..ToolArgs::default()
                },
                intent: None,
            })
        });

        let outcome = controller(classifier)
            .run("use the key on the doghole", &world, &attic())
            .await;

        assert!(outcome.intent.overridden);
        assert_eq!(
            outcome.delta.flags["escaped_via_doghole"],
            StateValue::Bool(true)
        );
        assert!(outcome.ending_preview.is_some());
        assert!(outcome.rejection.is_none());
    }
}
