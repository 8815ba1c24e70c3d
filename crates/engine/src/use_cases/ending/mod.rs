//! Ending checker.

use dollhouse_domain::{
    compile_effects, EffectContext, EndingMatch, EvalContext, ScenarioAssets, StateDelta,
    WorldState,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct EndingChecker;

impl EndingChecker {
    pub fn new() -> Self {
        Self
    }

    /// The first ending, in priority order, whose condition holds.
    ///
    /// Once a world carries an ending it keeps returning that same ending, so the check is
    /// idempotent across retries.
    pub fn check_ending(&self, world: &WorldState, assets: &ScenarioAssets) -> Option<EndingMatch> {
        if let Some(ending) = &world.ending {
            return Some(ending.clone());
        }

        let ctx = EvalContext::for_scenario(world, assets);
        assets
            .endings_by_priority()
            .into_iter()
            .find(|ending| ending.condition.evaluate(&ctx))
            .map(|ending| EndingMatch {
                ending_id: ending.ending_id.clone(),
                name: ending.name.clone(),
                epilogue_prompt: ending.epilogue_prompt.clone(),
                matched_turn: world.turn,
            })
    }

    /// The delta that enters `ending`: its declared on-enter effects plus the session end.
    pub fn entry_delta(
        &self,
        ending: &EndingMatch,
        world: &WorldState,
        assets: &ScenarioAssets,
    ) -> StateDelta {
        let mut delta = StateDelta::new();
        if world.ending.is_none() {
            let definition = assets
                .endings
                .iter()
                .find(|e| e.ending_id == ending.ending_id);
            if let Some(definition) = definition {
                let source = format!("ending:{}", definition.ending_id);
                delta = compile_effects(
                    &definition.on_enter,
                    &EffectContext::new(world, assets, &source),
                )
                .delta;
            }
        }
        delta.end_session = Some(ending.clone());
        delta
    }
}
