use serde::Serialize;

use super::WorldState;
use crate::delta::{StateDelta, VarChange};
use crate::error::DomainError;
use crate::scenario::ScenarioAssets;
use crate::value_objects::{EffectTarget, StateValue, MAX_MEMORIES_PER_NPC};

/// Part of a delta that referenced something the world does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedFragment {
    pub field: &'static str,
    pub reference: String,
    pub reason: &'static str,
}

impl DroppedFragment {
    fn new(field: &'static str, reference: impl Into<String>, reason: &'static str) -> Self {
        Self {
            field,
            reference: reference.into(),
            reason,
        }
    }
}

/// Result of applying one delta: the new state plus what had to be dropped.
#[derive(Debug, Clone)]
pub struct Applied {
    pub state: WorldState,
    pub dropped: Vec<DroppedFragment>,
}

/// Apply `delta` to a copy of `world`.
///
/// The input world is never touched, so a caller that discards the result (or is
/// cancelled before storing it) leaves the authoritative state as it was.
pub fn apply(
    world: &WorldState,
    delta: &StateDelta,
    assets: &ScenarioAssets,
) -> Result<Applied, DomainError> {
    if !world.is_initialized() {
        return Err(DomainError::Uninitialized { turn: world.turn });
    }

    let mut next = world.clone();
    let mut dropped = Vec::new();

    for (npc_id, stats) in &delta.npc_stats {
        let Some(npc) = next.npcs.get_mut(npc_id) else {
            dropped.push(DroppedFragment::new("npc_stats", npc_id.as_str(), "unknown npc"));
            continue;
        };
        for (stat, amount) in stats {
            if !npc.stats.contains_key(stat) && !assets.declares_stat(stat) {
                dropped.push(DroppedFragment::new(
                    "npc_stats",
                    format!("{}.{}", npc_id, stat),
                    "stat not in schema",
                ));
                continue;
            }
            let bounds = assets.stat_bounds(stat);
            let old = npc.stats.get(stat).copied().unwrap_or_else(|| bounds.clamp(0));
            npc.stats
                .insert(stat.clone(), bounds.clamp(old.saturating_add(*amount)));
        }
    }

    for (npc_id, status) in &delta.npc_status {
        match next.npcs.get_mut(npc_id) {
            Some(npc) => npc.status = status.clone(),
            None => dropped.push(DroppedFragment::new("npc_status", npc_id.as_str(), "unknown npc")),
        }
    }

    for (name, value) in &delta.flags {
        next.flags.insert(name.clone(), value.clone());
    }

    for (lock_id, unlocked) in &delta.locks {
        next.locks.insert(lock_id.clone(), *unlocked);
    }

    // An id in both sets cancels out.
    for item in delta.inventory_add.difference(&delta.inventory_remove) {
        next.inventory.insert(item.clone());
    }
    for item in delta.inventory_remove.difference(&delta.inventory_add) {
        next.inventory.remove(item);
    }

    for (name, change) in &delta.vars {
        let declared = assets.var_spec(name).is_some();
        if !declared && !next.vars.contains_key(name) {
            dropped.push(DroppedFragment::new("vars", name.as_str(), "unknown var"));
            continue;
        }
        let bounds = assets.var_bounds(name);
        match change {
            VarChange::Delta(amount) => {
                let old = match next.vars.get(name) {
                    Some(StateValue::Number(n)) => *n,
                    None | Some(StateValue::Null) => bounds.clamp(0),
                    Some(_) => {
                        dropped.push(DroppedFragment::new(
                            "vars",
                            name.as_str(),
                            "numeric delta on non-numeric var",
                        ));
                        continue;
                    }
                };
                next.vars.insert(
                    name.clone(),
                    StateValue::Number(bounds.clamp(old.saturating_add(*amount))),
                );
            }
            VarChange::Set(StateValue::Number(n)) => {
                next.vars
                    .insert(name.clone(), StateValue::Number(bounds.clamp(*n)));
            }
            VarChange::Set(value) => {
                next.vars.insert(name.clone(), value.clone());
            }
        }
    }

    next.turn = next.turn.saturating_add(delta.turn_increment);

    for (npc_id, update) in &delta.memory_updates {
        let Some(npc) = next.npcs.get_mut(npc_id) else {
            dropped.push(DroppedFragment::new("memory_updates", npc_id.as_str(), "unknown npc"));
            continue;
        };
        if let Some(turn) = update.reset_importance {
            npc.memory.reset_importance(turn);
        }
        for entry in &update.append {
            npc.memory.record(entry.clone());
        }
        if let Some(plan) = &update.plan {
            npc.memory.plan = Some(plan.clone());
        }
        npc.memory.prune(MAX_MEMORIES_PER_NPC);
    }

    if let Some(node) = &delta.next_node {
        next.current_node = Some(node.clone());
    }

    for event in &delta.events {
        if !next.active_events.contains(event) {
            next.active_events.push(event.clone());
        }
    }

    let changes = &delta.status_effects;
    next.status_effects
        .retain(|effect| !changes.remove.contains(&effect.effect_id));
    for effect in next.status_effects.iter_mut() {
        if effect.remaining_turns > 0 && changes.tick.contains(&effect.effect_id) {
            effect.remaining_turns -= 1;
        }
    }
    for effect in &changes.add {
        if let EffectTarget::Npc(npc_id) = &effect.target {
            if !next.npcs.contains_key(npc_id) {
                dropped.push(DroppedFragment::new("status_effects", npc_id.as_str(), "unknown npc"));
                continue;
            }
        }
        if next
            .status_effects
            .iter()
            .all(|existing| existing.effect_id != effect.effect_id)
        {
            next.status_effects.push(effect.clone());
        }
    }

    // Endings are terminal: the first match sticks.
    if next.ending.is_none() {
        next.ending = delta.end_session.clone();
    }

    Ok(Applied {
        state: next,
        dropped,
    })
}
