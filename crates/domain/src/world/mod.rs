//! World state: everything one player's run through a scenario has accumulated.

mod apply;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ids::{ItemId, LockId, NpcId};
use crate::scenario::ScenarioAssets;
use crate::value_objects::{EndingMatch, NpcMemory, StateValue, StatusEffect};

pub use apply::{apply, Applied, DroppedFragment};

pub const DEFAULT_NPC_STATUS: &str = "alive";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    pub status: String,
    #[serde(default)]
    pub memory: NpcMemory,
}

impl NpcState {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            stats: BTreeMap::new(),
            status: status.into(),
            memory: NpcMemory::default(),
        }
    }

    pub fn stat(&self, name: &str) -> Option<i64> {
        self.stats.get(name).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub turn: u32,
    #[serde(default)]
    pub npcs: BTreeMap<NpcId, NpcState>,
    #[serde(default)]
    pub flags: BTreeMap<String, StateValue>,
    #[serde(default)]
    pub inventory: BTreeSet<ItemId>,
    #[serde(default)]
    pub locks: BTreeMap<LockId, bool>,
    #[serde(default)]
    pub vars: BTreeMap<String, StateValue>,
    #[serde(default)]
    pub active_events: Vec<String>,
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ending: Option<EndingMatch>,
}

impl WorldState {
    /// An uninitialized world (turn 0). Deltas cannot be applied to it.
    pub fn blank() -> Self {
        Self {
            turn: 0,
            npcs: BTreeMap::new(),
            flags: BTreeMap::new(),
            inventory: BTreeSet::new(),
            locks: BTreeMap::new(),
            vars: BTreeMap::new(),
            active_events: Vec::new(),
            status_effects: Vec::new(),
            current_node: None,
            ending: None,
        }
    }

    /// Fresh world built from scenario defaults, starting at turn 1.
    ///
    /// Initial stats and numeric vars are clamped into their declared bounds so the
    /// range invariant holds from the first turn.
    pub fn from_scenario(assets: &ScenarioAssets) -> Self {
        let mut world = Self::blank();
        world.turn = 1;

        for npc in &assets.npcs {
            let mut state = NpcState::new(npc.status.clone());
            for (stat, value) in &npc.stats {
                state
                    .stats
                    .insert(stat.clone(), assets.stat_bounds(stat).clamp(*value));
            }
            world.npcs.insert(npc.npc_id.clone(), state);
        }

        for (name, spec) in &assets.vars {
            let initial = match &spec.initial {
                StateValue::Number(n) => StateValue::Number(spec.bounds().clamp(*n)),
                other => other.clone(),
            };
            world.vars.insert(name.clone(), initial);
        }

        world.flags = assets.flags.clone();
        world.inventory = assets.initial_inventory.clone();
        for lock in &assets.locks {
            world.locks.insert(lock.lock_id.clone(), false);
        }
        world.current_node = assets.start_node.clone();
        world
    }

    pub fn is_initialized(&self) -> bool {
        self.turn >= 1
    }

    pub fn is_ended(&self) -> bool {
        self.ending.is_some()
    }

    pub fn has_item(&self, item_id: &str) -> bool {
        self.inventory.contains(item_id)
    }

    pub fn npc(&self, npc_id: &str) -> Option<&NpcState> {
        self.npcs.get(npc_id)
    }

    pub fn var(&self, name: &str) -> Option<&StateValue> {
        self.vars.get(name)
    }

    pub fn flag(&self, name: &str) -> Option<&StateValue> {
        self.flags.get(name)
    }

    pub fn is_unlocked(&self, lock_id: &str) -> bool {
        self.locks.get(lock_id).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::ScenarioAssets;

    fn scenario() -> ScenarioAssets {
        serde_json::from_value(serde_json::json!({
            "scenario_id": "attic",
            "title": "The Attic",
            "start_node": "kitchen",
            "stats": { "affection": { "min": 0, "max": 100 }, "fear": { "min": -10, "max": 10 } },
            "vars": {
                "humanity": { "initial": 150, "min": 0, "max": 100 },
                "location": { "initial": "kitchen" }
            },
            "flags": { "door_open": false },
            "initial_inventory": ["candle"],
            "npcs": [
                { "npc_id": "brother", "name": "Brother", "stats": { "affection": 50, "fear": 30 } }
            ],
            "locks": [
                { "lock_id": "diary", "title": "Diary", "condition": "vars.humanity > 50" }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn built_from_scenario_defaults() {
        let world = WorldState::from_scenario(&scenario());
        assert_eq!(world.turn, 1);
        assert_eq!(world.npc("brother").unwrap().stat("affection"), Some(50));
        assert_eq!(world.npc("brother").unwrap().stat("fear"), Some(10));
        assert_eq!(world.npc("brother").unwrap().status, DEFAULT_NPC_STATUS);
        assert_eq!(world.var("humanity"), Some(&StateValue::Number(100)));
        assert_eq!(world.var("location"), Some(&StateValue::text("kitchen")));
        assert!(world.has_item("candle"));
        assert!(!world.is_unlocked("diary"));
        assert_eq!(world.current_node.as_deref(), Some("kitchen"));
        assert!(!world.is_ended());
    }

    #[test]
    fn blank_world_is_uninitialized() {
        assert!(!WorldState::blank().is_initialized());
    }
}
