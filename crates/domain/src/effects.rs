//! Compiles declared effects into a state delta.
//!
//! Rules, item actions and ending entry events all declare their consequences as a list
//! of [`Effect`]s. Compilation reads the world (to resolve `all`, the active NPC, and the
//! values a timed effect must restore) but never writes it.

use crate::delta::StateDelta;
use crate::ids::NpcId;
use crate::scenario::{normalize_var_key, Effect, ScenarioAssets, ACTIVE_NPC_ALIASES, ALL_NPCS};
use crate::value_objects::{EffectTarget, StatusEffect};
use crate::world::{WorldState, DEFAULT_NPC_STATUS};

#[derive(Debug, Clone, Copy)]
pub struct EffectContext<'a> {
    pub world: &'a WorldState,
    pub assets: &'a ScenarioAssets,
    pub active_npc: Option<&'a NpcId>,
    /// Recorded on created status effects, e.g. `rule:comfort` or `item:brass_key`.
    pub source: &'a str,
}

impl<'a> EffectContext<'a> {
    pub fn new(world: &'a WorldState, assets: &'a ScenarioAssets, source: &'a str) -> Self {
        Self {
            world,
            assets,
            active_npc: None,
            source,
        }
    }

    pub fn with_active_npc(mut self, npc: Option<&'a NpcId>) -> Self {
        self.active_npc = npc;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompiledEffects {
    pub delta: StateDelta,
    /// NPC references that could not be resolved (e.g. `__active__` with no active NPC).
    pub unresolved: Vec<String>,
}

/// Compile `effects` in declaration order into one delta.
pub fn compile_effects(effects: &[Effect], ctx: &EffectContext<'_>) -> CompiledEffects {
    let mut out = CompiledEffects::default();

    for effect in effects {
        match effect {
            Effect::NpcStatAdd { npc, stat, value } => {
                for id in resolve_npcs(npc, ctx, &mut out.unresolved) {
                    out.delta.add_stat(id, stat.clone(), *value);
                }
            }
            Effect::NpcStatSub { npc, stat, value } => {
                for id in resolve_npcs(npc, ctx, &mut out.unresolved) {
                    out.delta.add_stat(id, stat.clone(), value.saturating_neg());
                }
            }
            Effect::VarAdd { key, value } => out.delta.add_var(normalize_var_key(key), *value),
            Effect::VarSub { key, value } => {
                out.delta.add_var(normalize_var_key(key), value.saturating_neg())
            }
            Effect::VarSet { key, value } => {
                out.delta.set_var(normalize_var_key(key), value.clone())
            }
            Effect::FlagSet { key, value } => out.delta.set_flag(key.clone(), value.clone()),
            Effect::SetStatus {
                npc,
                status,
                duration,
                priority,
            } => {
                for id in resolve_npcs(npc, ctx, &mut out.unresolved) {
                    let Some(restore) = displace_status(&id, *priority, ctx, &mut out.delta) else {
                        continue;
                    };
                    out.delta.set_status(id.clone(), status.clone());
                    if let Some(turns) = duration.filter(|t| *t != 0) {
                        let mut reversal = StateDelta::default();
                        reversal.set_status(id.clone(), restore);
                        out.delta.add_status_effect(
                            StatusEffect::new(
                                EffectTarget::Npc(id),
                                turns,
                                format!("status '{}'", status),
                                reversal,
                            )
                            .with_source(ctx.source)
                            .with_priority(*priority),
                        );
                    }
                }
            }
            Effect::TimedStat {
                npc,
                stat,
                value,
                duration,
            } => {
                for id in resolve_npcs(npc, ctx, &mut out.unresolved) {
                    let applied = applied_stat_change(&id, stat, *value, ctx, &out.delta);
                    out.delta.add_stat(id.clone(), stat.clone(), *value);
                    let mut reversal = StateDelta::default();
                    reversal.add_stat(id.clone(), stat.clone(), applied.saturating_neg());
                    out.delta.add_status_effect(
                        StatusEffect::new(
                            EffectTarget::Npc(id),
                            *duration,
                            format!("{} {:+}", stat, value),
                            reversal,
                        )
                        .with_source(ctx.source),
                    );
                }
            }
            Effect::ClearStatus { target } => {
                let targets: Vec<EffectTarget> = if target == "player" {
                    vec![EffectTarget::Player]
                } else {
                    resolve_npcs(target, ctx, &mut out.unresolved)
                        .into_iter()
                        .map(EffectTarget::Npc)
                        .collect()
                };
                for effect in &ctx.world.status_effects {
                    if targets.contains(&effect.target)
                        && out.delta.status_effects.remove.insert(effect.effect_id)
                    {
                        out.delta.merge_from(effect.reversal_delta.clone());
                    }
                }
            }
            Effect::InventoryAdd { item } => out.delta.add_item(item.clone()),
            Effect::InventoryRemove { item } => out.delta.remove_item(item.clone()),
            Effect::UnlockEnding { ending_id } => {
                out.delta
                    .set_flag(format!("ending_unlocked_{}", ending_id), true)
            }
            Effect::ChangeScene { node } => out.delta.next_node = Some(node.clone()),
            Effect::AddEvent { event } => out.delta.push_event(event.clone()),
        }
    }

    out
}

/// Clear the way for a new status on `npc_id`.
///
/// Any status effect already holding the NPC (in the world, or compiled earlier in this
/// batch) is removed, and the status it would have restored is returned so the newcomer
/// restores that instead. Returns `None`, changing nothing, when a holder outranks
/// `priority`.
fn displace_status(
    npc_id: &NpcId,
    priority: i32,
    ctx: &EffectContext<'_>,
    delta: &mut StateDelta,
) -> Option<String> {
    let pending = delta
        .status_effects
        .add
        .iter()
        .position(|e| e.restores_status(npc_id.as_str()).is_some());
    let held: Vec<&StatusEffect> = ctx
        .world
        .status_effects
        .iter()
        .filter(|e| e.restores_status(npc_id.as_str()).is_some())
        .filter(|e| !delta.status_effects.remove.contains(&e.effect_id))
        .collect();

    let strongest = pending
        .map(|i| delta.status_effects.add[i].priority)
        .into_iter()
        .chain(held.iter().map(|e| e.priority))
        .max();
    if strongest.is_some_and(|p| p > priority) {
        return None;
    }

    let mut inherited: Option<String> = None;
    // World order is insertion order, so the first holder saw the status before any effect.
    for effect in held {
        if inherited.is_none() {
            inherited = effect.restores_status(npc_id.as_str()).map(str::to_string);
        }
        delta.status_effects.remove.insert(effect.effect_id);
    }
    if let Some(index) = pending {
        let effect = delta.status_effects.add.remove(index);
        if inherited.is_none() {
            inherited = effect.restores_status(npc_id.as_str()).map(str::to_string);
        }
    }
    let restore = inherited.unwrap_or_else(|| {
        delta
            .npc_status
            .get(npc_id)
            .cloned()
            .or_else(|| ctx.world.npc(npc_id.as_str()).map(|n| n.status.clone()))
            .unwrap_or_else(|| DEFAULT_NPC_STATUS.to_string())
    });
    Some(restore)
}

/// How far `value` actually moves the stat once the apply-time clamp is taken into
/// account, given the changes already compiled into `pending`.
fn applied_stat_change(
    npc_id: &NpcId,
    stat: &str,
    value: i64,
    ctx: &EffectContext<'_>,
    pending: &StateDelta,
) -> i64 {
    let Some(npc) = ctx.world.npc(npc_id.as_str()) else {
        return value;
    };
    let bounds = ctx.assets.stat_bounds(stat);
    let old = npc.stat(stat).unwrap_or_else(|| bounds.clamp(0));
    let earlier = pending
        .npc_stats
        .get(npc_id)
        .and_then(|stats| stats.get(stat))
        .copied()
        .unwrap_or(0);
    let base = old.saturating_add(earlier);
    bounds.clamp(base.saturating_add(value)) - bounds.clamp(base)
}

fn resolve_npcs(reference: &str, ctx: &EffectContext<'_>, unresolved: &mut Vec<String>) -> Vec<NpcId> {
    if ACTIVE_NPC_ALIASES.contains(&reference) {
        return match ctx.active_npc {
            Some(id) => vec![id.clone()],
            None => {
                unresolved.push(reference.to_string());
                Vec::new()
            }
        };
    }
    if reference == ALL_NPCS {
        return ctx.world.npcs.keys().cloned().collect();
    }
    vec![NpcId::new(reference)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::VarChange;
    use crate::value_objects::StateValue;
    use crate::world::apply;

    fn assets() -> ScenarioAssets {
        serde_json::from_value(serde_json::json!({
            "scenario_id": "attic",
            "title": "The Attic",
            "stats": { "affection": {}, "suspicion": {} },
            "vars": { "humanity": { "initial": 50 } },
            "npcs": [
                { "npc_id": "brother", "name": "Brother", "stats": { "affection": 50 } },
                { "npc_id": "stepmother", "name": "Stepmother", "stats": { "suspicion": 20 } }
            ]
        }))
        .unwrap()
    }

    fn effects(json: serde_json::Value) -> Vec<Effect> {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn resolves_active_and_all_npcs() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let brother = NpcId::new("brother");
        let ctx = EffectContext::new(&world, &assets, "rule:test").with_active_npc(Some(&brother));

        let compiled = compile_effects(
            &effects(serde_json::json!([
                { "type": "npc_stat_add", "npc": "__active__", "stat": "affection", "value": 3 },
                { "type": "npc_stat_sub", "npc": "all", "stat": "suspicion", "value": 2 },
                { "type": "var_sub", "key": "player.humanity", "value": 4 }
            ])),
            &ctx,
        );

        let delta = compiled.delta;
        assert_eq!(delta.npc_stats["brother"]["affection"], 3);
        assert_eq!(delta.npc_stats["brother"]["suspicion"], -2);
        assert_eq!(delta.npc_stats["stepmother"]["suspicion"], -2);
        assert_eq!(delta.vars["humanity"], VarChange::Delta(-4));
        assert!(compiled.unresolved.is_empty());
    }

    #[test]
    fn active_alias_without_active_npc_is_unresolved() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let ctx = EffectContext::new(&world, &assets, "rule:test");
        let compiled = compile_effects(
            &effects(serde_json::json!([
                { "type": "npc_stat_add", "npc": "target", "stat": "affection", "value": 3 }
            ])),
            &ctx,
        );
        assert!(compiled.delta.is_empty());
        assert_eq!(compiled.unresolved, vec!["target".to_string()]);
    }

    #[test]
    fn timed_status_records_reversal_to_previous_status() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let ctx = EffectContext::new(&world, &assets, "item:sleeping_pill");
        let compiled = compile_effects(
            &effects(serde_json::json!([
                { "type": "set_status", "npc": "stepmother", "status": "sleeping", "duration": 2 }
            ])),
            &ctx,
        );

        let delta = compiled.delta;
        assert_eq!(delta.npc_status["stepmother"], "sleeping");
        let effect = &delta.status_effects.add[0];
        assert_eq!(effect.remaining_turns, 2);
        assert_eq!(effect.source.as_deref(), Some("item:sleeping_pill"));
        assert_eq!(effect.reversal_delta.npc_status["stepmother"], "alive");
    }

    #[test]
    fn clear_status_removes_and_reverts() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let ctx = EffectContext::new(&world, &assets, "rule:drug");
        let drugged = compile_effects(
            &effects(serde_json::json!([
                { "type": "timed_stat", "npc": "brother", "stat": "affection", "value": -10, "duration": -1 }
            ])),
            &ctx,
        );
        let world = apply(&world, &drugged.delta, &assets).unwrap().state;
        assert_eq!(world.npc("brother").unwrap().stat("affection"), Some(40));

        let ctx = EffectContext::new(&world, &assets, "rule:antidote");
        let cleared = compile_effects(
            &effects(serde_json::json!([ { "type": "clear_status", "target": "brother" } ])),
            &ctx,
        );
        let world = apply(&world, &cleared.delta, &assets).unwrap().state;
        assert!(world.status_effects.is_empty());
        assert_eq!(world.npc("brother").unwrap().stat("affection"), Some(50));
    }

    #[test]
    fn new_status_displaces_the_running_one_and_keeps_the_original() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let sleep = compile_effects(
            &effects(serde_json::json!([
                { "type": "set_status", "npc": "stepmother", "status": "sleeping", "duration": 2 }
            ])),
            &EffectContext::new(&world, &assets, "item:sleeping_pill"),
        );
        let world = apply(&world, &sleep.delta, &assets).unwrap().state;
        let sleeping_id = world.status_effects[0].effect_id;

        let stun = compile_effects(
            &effects(serde_json::json!([
                { "type": "set_status", "npc": "stepmother", "status": "stunned", "duration": 3 }
            ])),
            &EffectContext::new(&world, &assets, "rule:blow"),
        );
        assert!(stun.delta.status_effects.remove.contains(&sleeping_id));

        let world = apply(&world, &stun.delta, &assets).unwrap().state;
        assert_eq!(world.npc("stepmother").unwrap().status, "stunned");
        assert_eq!(world.status_effects.len(), 1);
        assert_eq!(world.status_effects[0].remaining_turns, 3);
        assert_eq!(world.status_effects[0].restores_status("stepmother"), Some("alive"));
    }

    #[test]
    fn higher_priority_status_holds_its_ground() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let sleep = compile_effects(
            &effects(serde_json::json!([
                { "type": "set_status", "npc": "stepmother", "status": "sleeping", "duration": 2, "priority": 5 }
            ])),
            &EffectContext::new(&world, &assets, "item:sleeping_pill"),
        );
        let world = apply(&world, &sleep.delta, &assets).unwrap().state;

        let stun = compile_effects(
            &effects(serde_json::json!([
                { "type": "set_status", "npc": "stepmother", "status": "stunned", "duration": 3 }
            ])),
            &EffectContext::new(&world, &assets, "rule:blow"),
        );
        assert!(stun.delta.is_empty());
    }

    #[test]
    fn two_timed_statuses_in_one_batch_leave_a_single_effect() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let compiled = compile_effects(
            &effects(serde_json::json!([
                { "type": "set_status", "npc": "stepmother", "status": "sleeping", "duration": 2 },
                { "type": "set_status", "npc": "stepmother", "status": "stunned", "duration": 3 }
            ])),
            &EffectContext::new(&world, &assets, "rule:chaos"),
        );

        let delta = compiled.delta;
        assert_eq!(delta.npc_status["stepmother"], "stunned");
        assert_eq!(delta.status_effects.add.len(), 1);
        assert_eq!(delta.status_effects.add[0].restores_status("stepmother"), Some("alive"));
    }

    #[test]
    fn clamped_boost_reverts_only_what_it_added() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let compiled = compile_effects(
            &effects(serde_json::json!([
                { "type": "npc_stat_add", "npc": "brother", "stat": "affection", "value": 30 },
                { "type": "timed_stat", "npc": "brother", "stat": "affection", "value": 95, "duration": 1 }
            ])),
            &EffectContext::new(&world, &assets, "item:tonic"),
        );
        let reversal = compiled.delta.status_effects.add[0].reversal_delta.clone();
        assert_eq!(reversal.npc_stats["brother"]["affection"], -20);

        let boosted = apply(&world, &compiled.delta, &assets).unwrap().state;
        assert_eq!(boosted.npc("brother").unwrap().stat("affection"), Some(100));
        let expired = apply(&boosted, &reversal, &assets).unwrap().state;
        assert_eq!(expired.npc("brother").unwrap().stat("affection"), Some(80));
    }

    #[test]
    fn unlock_ending_and_scene_change() {
        let assets = assets();
        let world = WorldState::from_scenario(&assets);
        let ctx = EffectContext::new(&world, &assets, "rule:test");
        let compiled = compile_effects(
            &effects(serde_json::json!([
                { "type": "unlock_ending", "ending_id": "stealth_exit_test" },
                { "type": "change_scene", "node": "garden" },
                { "type": "inventory_add", "item": "brass_key" }
            ])),
            &ctx,
        );
        let delta = compiled.delta;
        assert_eq!(
            delta.flags["ending_unlocked_stealth_exit_test"],
            StateValue::Bool(true)
        );
        assert_eq!(delta.next_node.as_deref(), Some("garden"));
        assert!(delta.inventory_add.contains("brass_key"));
    }
}
