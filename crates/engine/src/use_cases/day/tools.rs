use std::sync::Arc;
use std::time::Duration;

use dollhouse_domain::{
    rule_based_importance, MemoryEntry, MemoryKind, ScenarioAssets, StateDelta, StateValue,
    WorldState,
};

use crate::infrastructure::ports::{ClockPort, LlmPort};
use crate::use_cases::generation::{generate_text, parse_json_object};
use crate::use_cases::intent::{ResolvedIntent, ToolName};
use crate::use_cases::items::{
    ItemAcquirer, ItemRejection, ItemUseOutcome, ItemUseRequest, ItemUseResolver,
};
use crate::use_cases::prompts;

/// Largest stat change a single generated reply may cause.
pub const MAX_TALK_STAT_CHANGE: i64 = 2;

const TALK_RECALL: usize = 5;

/// What one tool run produced. Tool failures never abort the turn: they come back as an
/// event line and an empty delta.
#[derive(Debug, Clone, Default)]
pub struct ToolExecution {
    pub events: Vec<String>,
    pub delta: StateDelta,
    pub rejection: Option<ItemRejection>,
    pub item_use: Option<ItemUseOutcome>,
}

impl ToolExecution {
    fn event(line: impl Into<String>) -> Self {
        Self {
            events: vec![line.into()],
            ..Self::default()
        }
    }
}

pub struct ToolExecutor {
    llm: Arc<dyn LlmPort>,
    clock: Arc<dyn ClockPort>,
    acquirer: ItemAcquirer,
    resolver: ItemUseResolver,
    generator_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(llm: Arc<dyn LlmPort>, clock: Arc<dyn ClockPort>, generator_timeout: Duration) -> Self {
        Self {
            llm,
            clock,
            acquirer: ItemAcquirer::new(),
            resolver: ItemUseResolver::new(),
            generator_timeout,
        }
    }

    pub async fn execute(
        &self,
        intent: &ResolvedIntent,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> ToolExecution {
        match intent.tool {
            ToolName::NpcTalk => self.npc_talk(intent, world, assets).await,
            ToolName::Action => self.action(intent, world, assets),
            ToolName::ItemUsage => self.item_usage(intent, world, assets),
        }
    }

    async fn npc_talk(
        &self,
        intent: &ResolvedIntent,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> ToolExecution {
        let Some(npc_id) = &intent.active_npc else {
            return ToolExecution::event("You speak, but no one is there to answer.");
        };
        let (Some(definition), Some(state)) = (assets.npc(npc_id.as_str()), world.npc(npc_id.as_str()))
        else {
            return ToolExecution::event("You speak, but no one is there to answer.");
        };

        let player_line = intent
            .args
            .content
            .clone()
            .unwrap_or_else(|| intent.raw_input.clone());
        let memories = state.memory.retrieve(&player_line, world.turn, TALK_RECALL);
        let request = prompts::npc_talk(
            definition,
            &state.stats,
            &state.status,
            &memories,
            state.memory.plan.as_ref(),
            &player_line,
        );

        let Ok(response) =
            generate_text(self.llm.as_ref(), request, self.generator_timeout, "npc_talk").await
        else {
            return ToolExecution::event(format!("{} stays silent.", definition.name));
        };

        let (reply, stat_changes) = parse_talk_response(&response);
        let mut delta = StateDelta::new();
        for (stat, change) in stat_changes {
            if assets.declares_stat(&stat) {
                delta.add_stat(npc_id.clone(), stat, change);
            }
        }
        let description = format!("The player said \"{}\" and I answered \"{}\"", player_line, reply);
        delta.append_memory(
            npc_id.clone(),
            MemoryEntry::new(
                description.clone(),
                MemoryKind::Dialogue,
                rule_based_importance(&description),
                world.turn,
                self.clock.now(),
            ),
        );

        ToolExecution {
            events: vec![format!("{}: \"{}\"", definition.name, reply)],
            delta,
            ..ToolExecution::default()
        }
    }

    fn action(&self, intent: &ResolvedIntent, world: &WorldState, assets: &ScenarioAssets) -> ToolExecution {
        let action_type = intent
            .args
            .action_type
            .as_deref()
            .or(intent.intent.as_deref())
            .unwrap_or("look")
            .trim()
            .to_lowercase();
        let target = intent.args.target.as_deref().map(str::trim);

        match (action_type.as_str(), target) {
            ("move" | "go" | "walk", Some(place)) => {
                let mut delta = StateDelta::new();
                delta.set_var("location", StateValue::text(place));
                delta.next_node = Some(place.to_string());
                ToolExecution {
                    events: vec![format!("You go to the {}.", place.replace('_', " "))],
                    delta,
                    ..ToolExecution::default()
                }
            }
            ("pickup" | "take" | "pick_up", _) => {
                let Some(item_id) = intent
                    .args
                    .item_id
                    .as_ref()
                    .map(|id| id.as_str().to_string())
                    .or_else(|| target.map(|t| t.to_lowercase().replace(' ', "_")))
                else {
                    return ToolExecution::event("There is nothing to pick up.");
                };
                match self.acquirer.pick_up(&item_id, world, assets) {
                    Ok(delta) => {
                        let name = assets
                            .item(&item_id)
                            .map(|i| i.name.clone())
                            .unwrap_or_else(|| item_id.replace('_', " "));
                        ToolExecution {
                            events: vec![format!("You pick up the {}.", name.to_lowercase())],
                            delta,
                            ..ToolExecution::default()
                        }
                    }
                    Err(refusal) => ToolExecution::event(refusal.to_string()),
                }
            }
            (other, Some(target)) => {
                ToolExecution::event(format!("You {} the {}.", other, target.replace('_', " ")))
            }
            (other, None) => ToolExecution::event(format!("You {} around.", other)),
        }
    }

    fn item_usage(&self, intent: &ResolvedIntent, world: &WorldState, assets: &ScenarioAssets) -> ToolExecution {
        let Some(item_id) = intent.item_id.clone() else {
            return ToolExecution::event("You fumble through your pockets but find nothing to use.");
        };
        let request = ItemUseRequest {
            item_id,
            action_id: intent.args.action_id.clone(),
            target: intent.args.target.clone(),
            target_npc: intent.active_npc.clone(),
        };

        match self.resolver.resolve(&request, world, assets) {
            Ok(outcome) => ToolExecution {
                events: vec![outcome.message.clone()],
                delta: outcome.delta.clone(),
                rejection: None,
                item_use: Some(outcome),
            },
            Err(rejection) => {
                tracing::debug!(
                    code = rejection.code.as_str(),
                    item_id = %rejection.item_id,
                    "Item use rejected"
                );
                ToolExecution {
                    events: vec![rejection.reason.clone()],
                    rejection: Some(rejection),
                    ..ToolExecution::default()
                }
            }
        }
    }
}

/// Reply text plus clamped stat changes. Non-JSON output is taken as the reply itself.
fn parse_talk_response(response: &str) -> (String, Vec<(String, i64)>) {
    let Some(object) = parse_json_object(response) else {
        return (response.trim().to_string(), Vec::new());
    };
    let reply = object
        .get("reply")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| response.trim().to_string());
    let changes = object
        .get("npc_stats")
        .and_then(|v| v.as_object())
        .map(|stats| {
            stats
                .iter()
                .filter_map(|(stat, value)| {
                    value.as_i64().map(|n| {
                        (
                            stat.clone(),
                            n.clamp(-MAX_TALK_STAT_CHANGE, MAX_TALK_STAT_CHANGE),
                        )
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    (reply, changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::{LlmError, LlmResponse, MockLlmPort, ToolArgs};
    use crate::test_fixtures::{attic, attic_world, fixed_clock, ScriptedLlm};
    use dollhouse_domain::{ItemId, NpcId, VarChange};

    fn intent(tool: ToolName, args: ToolArgs) -> ResolvedIntent {
        ResolvedIntent {
            tool,
            overridden: false,
            intent: None,
            active_npc: args.npc_id.clone(),
            item_id: args.item_id.clone(),
            args,
            raw_input: "raw".to_string(),
        }
    }

    fn executor(llm: Arc<dyn LlmPort>) -> ToolExecutor {
        ToolExecutor::new(llm, fixed_clock(), Duration::from_secs(1))
    }

    #[tokio::test]
    async fn talk_clamps_stats_and_remembers() {
        let executor = executor(Arc::new(ScriptedLlm::new(|_, _| {
            Ok(r#"{"reply": "Go away.", "npc_stats": {"affection": -9, "courage": 1}}"#.to_string())
        })));
        let args = ToolArgs {
            npc_id: Some(NpcId::new("brother")),
            content: Some("Can I see your diary?".to_string()),
            ..ToolArgs::default()
        };

        let result = executor
            .execute(&intent(ToolName::NpcTalk, args), &attic_world(), &attic())
            .await;

        assert_eq!(result.events, vec!["Brother: \"Go away.\""]);
        assert_eq!(result.delta.npc_stats["brother"]["affection"], -2);
        assert!(!result.delta.npc_stats["brother"].contains_key("courage"));
        let memory = &result.delta.memory_updates["brother"].append[0];
        assert_eq!(memory.kind, MemoryKind::Dialogue);
        assert!(memory.description.contains("Can I see your diary?"));
    }

    #[tokio::test]
    async fn when_generator_fails_talk_falls_back_to_silence() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .returning(|_| Err(LlmError::RequestFailed("down".into())));
        let args = ToolArgs {
            npc_id: Some(NpcId::new("sister")),
            ..ToolArgs::default()
        };

        let result = executor(Arc::new(llm))
            .execute(&intent(ToolName::NpcTalk, args), &attic_world(), &attic())
            .await;

        assert_eq!(result.events, vec!["Sister stays silent."]);
        assert!(result.delta.is_empty());
    }

    #[tokio::test]
    async fn plain_text_reply_is_accepted() {
        let mut llm = MockLlmPort::new();
        llm.expect_generate()
            .returning(|_| Ok(LlmResponse::text("  Not now.  ")));
        let args = ToolArgs {
            npc_id: Some(NpcId::new("sister")),
            ..ToolArgs::default()
        };

        let result = executor(Arc::new(llm))
            .execute(&intent(ToolName::NpcTalk, args), &attic_world(), &attic())
            .await;

        assert_eq!(result.events, vec!["Sister: \"Not now.\""]);
        assert!(result.delta.npc_stats.is_empty());
    }

    #[tokio::test]
    async fn move_sets_location() {
        let args = ToolArgs {
            action_type: Some("move".to_string()),
            target: Some("player_room".to_string()),
            ..ToolArgs::default()
        };

        let result = executor(Arc::new(ScriptedLlm::failing()))
            .execute(&intent(ToolName::Action, args), &attic_world(), &attic())
            .await;

        assert_eq!(
            result.delta.vars["location"],
            VarChange::Set(StateValue::text("player_room"))
        );
        assert_eq!(result.events, vec!["You go to the player room."]);
    }

    #[tokio::test]
    async fn pickup_refusal_is_an_event_not_an_error() {
        let mut world = attic_world();
        world
            .vars
            .insert("location".to_string(), StateValue::text("attic"));
        let args = ToolArgs {
            action_type: Some("pickup".to_string()),
            item_id: Some(ItemId::new("brass_key")),
            ..ToolArgs::default()
        };

        let result = executor(Arc::new(ScriptedLlm::failing()))
            .execute(&intent(ToolName::Action, args), &world, &attic())
            .await;

        assert!(result.delta.is_empty());
        assert_eq!(result.events, vec!["You cannot reach the Brass key from here."]);
    }

    #[tokio::test]
    async fn rejected_item_use_reports_the_rejection() {
        let args = ToolArgs {
            item_id: Some(ItemId::new("brass_key")),
            target: Some("doghole".to_string()),
            ..ToolArgs::default()
        };

        let result = executor(Arc::new(ScriptedLlm::failing()))
            .execute(&intent(ToolName::ItemUsage, args), &attic_world(), &attic())
            .await;

        assert!(result.delta.is_empty());
        assert_eq!(
            result.rejection.map(|r| r.code),
            Some(crate::use_cases::items::RejectionCode::ItemNotHeld)
        );
    }
}
