//! State deltas.
//!
//! Every pipeline stage describes its effect on the world as a `StateDelta`. Deltas are
//! merged (see [`merge`]) and then applied once per stage by [`crate::world::apply`].

mod merge;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, LockId, NpcId, StatusEffectId};
use crate::value_objects::{EndingMatch, MemoryEntry, NpcPlan, StateValue, StatusEffect};

pub use merge::merge;

/// Change to a single var: a signed numeric delta or an overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarChange {
    Delta(i64),
    Set(StateValue),
}

/// Memory writes for one NPC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append: Vec<MemoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<NpcPlan>,
    /// Turn of a reflection; the accumulated importance is reset before appending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_importance: Option<u32>,
}

impl MemoryUpdate {
    pub fn is_empty(&self) -> bool {
        self.append.is_empty() && self.plan.is_none() && self.reset_importance.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusEffectChanges {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub add: Vec<StatusEffect>,
    /// Effects whose `remaining_turns` drops by one.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tick: BTreeSet<StatusEffectId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub remove: BTreeSet<StatusEffectId>,
}

impl StatusEffectChanges {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.tick.is_empty() && self.remove.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub npc_stats: BTreeMap<NpcId, BTreeMap<String, i64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub npc_status: BTreeMap<NpcId, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub flags: BTreeMap<String, StateValue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub locks: BTreeMap<LockId, bool>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub inventory_add: BTreeSet<ItemId>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub inventory_remove: BTreeSet<ItemId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, VarChange>,
    #[serde(default)]
    pub turn_increment: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub memory_updates: BTreeMap<NpcId, MemoryUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    #[serde(default, skip_serializing_if = "StatusEffectChanges::is_empty")]
    pub status_effects: StatusEffectChanges,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session: Option<EndingMatch>,
}

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn add_stat(&mut self, npc_id: NpcId, stat: impl Into<String>, amount: i64) {
        let slot = self
            .npc_stats
            .entry(npc_id)
            .or_default()
            .entry(stat.into())
            .or_insert(0);
        *slot = slot.saturating_add(amount);
    }

    pub fn set_status(&mut self, npc_id: NpcId, status: impl Into<String>) {
        self.npc_status.insert(npc_id, status.into());
    }

    pub fn set_flag(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        self.flags.insert(name.into(), value.into());
    }

    pub fn set_lock(&mut self, lock_id: LockId, unlocked: bool) {
        self.locks.insert(lock_id, unlocked);
    }

    pub fn add_item(&mut self, item_id: ItemId) {
        self.inventory_add.insert(item_id);
    }

    pub fn remove_item(&mut self, item_id: ItemId) {
        self.inventory_remove.insert(item_id);
    }

    pub fn add_var(&mut self, name: impl Into<String>, amount: i64) {
        merge::merge_var(&mut self.vars, name.into(), VarChange::Delta(amount));
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<StateValue>) {
        self.vars.insert(name.into(), VarChange::Set(value.into()));
    }

    pub fn append_memory(&mut self, npc_id: NpcId, entry: MemoryEntry) {
        self.memory_updates.entry(npc_id).or_default().append.push(entry);
    }

    pub fn push_event(&mut self, event: impl Into<String>) {
        let event = event.into();
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    pub fn add_status_effect(&mut self, effect: StatusEffect) {
        self.status_effects.add.push(effect);
    }

    pub fn with_turn_increment(mut self, turn_increment: u32) -> Self {
        self.turn_increment = turn_increment;
        self
    }

    /// Fold `later` into `self`, treating `later` as the more recent writer.
    pub fn merge_from(&mut self, later: StateDelta) {
        merge::merge_into(self, later);
    }
}
