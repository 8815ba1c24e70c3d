//! Rule engine: matches declared rules against the resolved intent and world state.

use dollhouse_domain::{
    compile_effects, merge, EffectContext, EvalContext, RuleId, ScenarioAssets, StateDelta,
    WorldState,
};

use super::intent::ResolvedIntent;

#[derive(Debug, Clone, Default)]
pub struct RuleOutcome {
    /// Rules whose condition held, in declaration order.
    pub fired: Vec<RuleId>,
    pub delta: StateDelta,
}

/// Stateless; every call reads only its arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleEngine;

impl RuleEngine {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate every rule in declaration order and merge the effects of those that fire.
    pub fn evaluate(
        &self,
        intent: &ResolvedIntent,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> RuleOutcome {
        let ctx = EvalContext::for_scenario(world, assets)
            .with_intent(intent.intent.as_deref())
            .with_tool(Some(intent.tool.as_str()))
            .with_active_npc(intent.active_npc.as_ref());

        let mut fired = Vec::new();
        let mut deltas = Vec::new();
        for rule in &assets.rules {
            if !rule.when.evaluate(&ctx) {
                continue;
            }
            let source = format!("rule:{}", rule.rule_id);
            let compiled = compile_effects(
                &rule.effects,
                &EffectContext::new(world, assets, &source)
                    .with_active_npc(intent.active_npc.as_ref()),
            );
            if !compiled.unresolved.is_empty() {
                tracing::warn!(
                    rule_id = %rule.rule_id,
                    unresolved = ?compiled.unresolved,
                    "Rule referenced NPCs that could not be resolved"
                );
            }
            tracing::debug!(rule_id = %rule.rule_id, "Rule fired");
            fired.push(rule.rule_id.clone());
            deltas.push(compiled.delta);
        }

        RuleOutcome {
            fired,
            delta: merge(deltas),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::ToolArgs;
    use crate::test_fixtures::{attic, attic_world};
    use crate::use_cases::intent::ToolName;
    use dollhouse_domain::{NpcId, StateValue};

    fn intent(tool: ToolName, label: Option<&str>, npc: Option<&str>) -> ResolvedIntent {
        ResolvedIntent {
            tool,
            overridden: false,
            intent: label.map(str::to_string),
            active_npc: npc.map(NpcId::new),
            item_id: None,
            args: ToolArgs::default(),
            raw_input: String::new(),
        }
    }

    #[test]
    fn comfort_rule_targets_the_active_npc() {
        let assets = attic();
        let world = attic_world();

        let outcome = RuleEngine::new().evaluate(
            &intent(ToolName::NpcTalk, Some("comfort"), Some("sister")),
            &world,
            &assets,
        );

        assert_eq!(outcome.fired, vec![RuleId::new("comfort")]);
        assert_eq!(outcome.delta.npc_stats["sister"]["affection"], 5);
    }

    #[test]
    fn tool_must_match_too() {
        let assets = attic();
        let world = attic_world();

        let outcome = RuleEngine::new().evaluate(
            &intent(ToolName::Action, Some("comfort"), Some("sister")),
            &world,
            &assets,
        );

        assert!(outcome.fired.is_empty());
        assert!(outcome.delta.is_empty());
    }

    #[test]
    fn location_gated_rule_reads_world_vars() {
        let assets = attic();
        let mut world = attic_world();
        world
            .vars
            .insert("location".to_string(), StateValue::text("study"));

        let outcome = RuleEngine::new().evaluate(
            &intent(ToolName::Action, Some("search"), None),
            &world,
            &assets,
        );

        assert_eq!(outcome.fired, vec![RuleId::new("snoop")]);
        assert_eq!(outcome.delta.npc_stats["stepmother"]["suspicion"], 10);
        assert_eq!(outcome.delta.events, vec!["Footsteps creak somewhere above."]);
        assert!(!outcome.delta.vars.contains_key("location"));
    }
}
