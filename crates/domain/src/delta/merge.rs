use std::collections::BTreeMap;

use super::{StateDelta, VarChange};
use crate::value_objects::StateValue;

/// Merge deltas in pipeline order (tool, then rule, then night).
///
/// Numeric fields sum; flags, locks, statuses and non-numeric vars are last-writer-wins;
/// inventory sets are unioned and cancel out at apply time when an id is in both.
pub fn merge<I>(deltas: I) -> StateDelta
where
    I: IntoIterator<Item = StateDelta>,
{
    let mut merged = StateDelta::default();
    for delta in deltas {
        merge_into(&mut merged, delta);
    }
    merged
}

pub(super) fn merge_into(acc: &mut StateDelta, later: StateDelta) {
    for (npc_id, stats) in later.npc_stats {
        let slot = acc.npc_stats.entry(npc_id).or_default();
        for (stat, amount) in stats {
            let value = slot.entry(stat).or_insert(0);
            *value = value.saturating_add(amount);
        }
    }

    acc.npc_status.extend(later.npc_status);
    acc.flags.extend(later.flags);
    acc.locks.extend(later.locks);
    acc.inventory_add.extend(later.inventory_add);
    acc.inventory_remove.extend(later.inventory_remove);

    for (name, change) in later.vars {
        merge_var(&mut acc.vars, name, change);
    }

    acc.turn_increment = acc.turn_increment.saturating_add(later.turn_increment);

    for (npc_id, update) in later.memory_updates {
        let slot = acc.memory_updates.entry(npc_id).or_default();
        slot.append.extend(update.append);
        if update.plan.is_some() {
            slot.plan = update.plan;
        }
        if update.reset_importance.is_some() {
            slot.reset_importance = update.reset_importance;
        }
    }

    if later.next_node.is_some() {
        acc.next_node = later.next_node;
    }

    for event in later.events {
        acc.push_event(event);
    }

    acc.status_effects.add.extend(later.status_effects.add);
    acc.status_effects.tick.extend(later.status_effects.tick);
    acc.status_effects.remove.extend(later.status_effects.remove);

    if later.end_session.is_some() {
        acc.end_session = later.end_session;
    }
}

pub(super) fn merge_var(vars: &mut BTreeMap<String, VarChange>, name: String, change: VarChange) {
    let combined = match (vars.remove(&name), change) {
        (Some(VarChange::Delta(a)), VarChange::Delta(b)) => VarChange::Delta(a.saturating_add(b)),
        (Some(VarChange::Set(StateValue::Number(n))), VarChange::Delta(d)) => {
            VarChange::Set(StateValue::Number(n.saturating_add(d)))
        }
        (_, change) => change,
    };
    vars.insert(name, combined);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{ItemId, LockId, NpcId};

    fn stats(npc: &str, stat: &str, amount: i64) -> StateDelta {
        let mut delta = StateDelta::default();
        delta.add_stat(NpcId::new(npc), stat, amount);
        delta
    }

    #[test]
    fn npc_stats_are_summed() {
        let mut d1 = stats("brother", "affection", 3);
        d1.add_stat(NpcId::new("brother"), "fear", -1);
        let d2 = stats("brother", "affection", -5);
        let d3 = stats("stepmother", "suspicion", 2);

        let merged = merge([d1.clone(), d2.clone(), d3]);
        let brother = &merged.npc_stats["brother"];
        assert_eq!(brother["affection"], -2);
        assert_eq!(brother["fear"], -1);
        assert_eq!(merged.npc_stats["stepmother"]["suspicion"], 2);

        // Summation holds for stats only one side mentions.
        for (stat, expected) in [("affection", 3 - 5), ("fear", -1)] {
            let lhs = d1.npc_stats.get("brother").and_then(|m| m.get(stat)).copied().unwrap_or(0);
            let rhs = d2.npc_stats.get("brother").and_then(|m| m.get(stat)).copied().unwrap_or(0);
            assert_eq!(lhs + rhs, expected);
        }
    }

    #[test]
    fn flags_and_locks_are_last_writer_wins() {
        let mut tool = StateDelta::default();
        tool.set_flag("door_open", false);
        tool.set_lock(LockId::new("diary"), false);
        let mut rule = StateDelta::default();
        rule.set_flag("door_open", true);
        rule.set_lock(LockId::new("diary"), true);

        let merged = merge([tool, rule]);
        assert_eq!(merged.flags["door_open"], StateValue::Bool(true));
        assert!(merged.locks["diary"]);
    }

    #[test]
    fn numeric_vars_sum_and_categorical_vars_overwrite() {
        let mut tool = StateDelta::default();
        tool.add_var("humanity", 4);
        tool.set_var("location", "hallway");
        let mut rule = StateDelta::default();
        rule.add_var("humanity", -1);
        rule.set_var("location", "player_room");

        let merged = merge([tool, rule]);
        assert_eq!(merged.vars["humanity"], VarChange::Delta(3));
        assert_eq!(
            merged.vars["location"],
            VarChange::Set(StateValue::text("player_room"))
        );
    }

    #[test]
    fn delta_after_numeric_set_folds_into_the_set() {
        let mut first = StateDelta::default();
        first.set_var("clock", 10);
        let mut second = StateDelta::default();
        second.add_var("clock", 2);

        let merged = merge([first, second]);
        assert_eq!(merged.vars["clock"], VarChange::Set(StateValue::Number(12)));
    }

    #[test]
    fn inventory_sets_union_and_turns_sum() {
        let mut tool = StateDelta::default().with_turn_increment(1);
        tool.add_item(ItemId::new("brass_key"));
        let mut rule = StateDelta::default();
        rule.add_item(ItemId::new("brass_key"));
        rule.remove_item(ItemId::new("candle"));

        let merged = merge([tool, rule]);
        assert_eq!(merged.inventory_add.len(), 1);
        assert!(merged.inventory_remove.contains("candle"));
        assert_eq!(merged.turn_increment, 1);
    }

    #[test]
    fn merging_nothing_is_empty() {
        assert!(merge(Vec::new()).is_empty());
    }
}
