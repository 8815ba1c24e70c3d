//! Scenario assets: the read-only, author-declared definition of a scenario.
//!
//! Loaded once by an external collaborator and shared across all players of the scenario.
//! Field names here are the single canonical schema.

mod validate;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::ids::{EndingId, ItemId, LockId, NpcId, RuleId, ScenarioId};
use crate::value_objects::StateValue;
use crate::world::DEFAULT_NPC_STATUS;

pub use validate::ValidationIssue;

/// NPC references in effects that resolve to the turn's active NPC.
pub const ACTIVE_NPC_ALIASES: &[&str] = &["__active__", "target"];
/// NPC reference in effects that fans out to every NPC.
pub const ALL_NPCS: &str = "all";

fn default_max() -> i64 {
    100
}

fn default_status() -> String {
    DEFAULT_NPC_STATUS.to_string()
}

fn default_flag_value() -> StateValue {
    StateValue::Bool(true)
}

/// Inclusive range of a stat or numeric var.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    #[serde(default)]
    pub min: i64,
    #[serde(default = "default_max")]
    pub max: i64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self { min: 0, max: 100 }
    }
}

impl Bounds {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Never panics, even for inverted bounds (reported by validation instead).
    pub fn clamp(&self, value: i64) -> i64 {
        value.max(self.min).min(self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSpec {
    #[serde(default)]
    pub initial: StateValue,
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl VarSpec {
    pub fn bounds(&self) -> Bounds {
        Bounds {
            min: self.min.unwrap_or(0),
            max: self.max.unwrap_or(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcDefinition {
    pub npc_id: NpcId,
    pub name: String,
    #[serde(default)]
    pub persona: String,
    #[serde(default)]
    pub stats: BTreeMap<String, i64>,
    #[serde(default = "default_status")]
    pub status: String,
}

/// A single declared state change. Used by rules, item actions and ending entry events.
///
/// `npc` fields accept an NPC id, `__active__`/`target` for the turn's active NPC, or
/// `all`. Var keys may carry a `vars.` or `player.` prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    NpcStatAdd {
        npc: String,
        stat: String,
        value: i64,
    },
    NpcStatSub {
        npc: String,
        stat: String,
        value: i64,
    },
    VarAdd {
        key: String,
        value: i64,
    },
    VarSub {
        key: String,
        value: i64,
    },
    VarSet {
        key: String,
        value: StateValue,
    },
    FlagSet {
        key: String,
        #[serde(default = "default_flag_value")]
        value: StateValue,
    },
    /// Change an NPC's categorical status, optionally for a number of turns. Replaces a
    /// timed status already on the NPC unless that one has a higher `priority`.
    SetStatus {
        npc: String,
        status: String,
        #[serde(default)]
        duration: Option<i32>,
        #[serde(default)]
        priority: i32,
    },
    /// Temporary stat shift, reverted when it expires.
    TimedStat {
        npc: String,
        stat: String,
        value: i64,
        duration: i32,
    },
    /// Remove every status effect on `target` (`player` or an NPC reference) and revert it.
    ClearStatus {
        target: String,
    },
    InventoryAdd {
        item: ItemId,
    },
    InventoryRemove {
        item: ItemId,
    },
    UnlockEnding {
        ending_id: EndingId,
    },
    ChangeScene {
        node: String,
    },
    AddEvent {
        event: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub rule_id: RuleId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub when: Condition,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockDefinition {
    pub lock_id: LockId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub condition: Condition,
    #[serde(default)]
    pub reveal_trigger: Option<String>,
    #[serde(default)]
    pub allowed_npcs: Vec<NpcId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Key,
    Consumable,
    Tool,
    Gift,
    Clue,
    #[serde(other)]
    Misc,
}

impl ItemKind {
    /// Kinds that leave the inventory once used.
    pub fn is_consumed_on_use(self) -> bool {
        matches!(self, Self::Consumable | Self::Tool | Self::Gift)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquireMethod {
    /// Picked up by the acquirer scan as soon as the condition holds.
    Auto,
    /// Taken explicitly through the `pickup` action.
    Pickup,
    /// Only granted by effects.
    Reward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquireSpec {
    pub method: AcquireMethod,
    #[serde(default)]
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemAction {
    pub action_id: String,
    /// What the item is used on, e.g. `doghole`.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub allowed_when: Condition,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub success_message: Option<String>,
    #[serde(default)]
    pub failure_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDefinition {
    pub item_id: ItemId,
    pub name: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acquire: Option<AcquireSpec>,
    #[serde(default)]
    pub actions: Vec<ItemAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndingDefinition {
    pub ending_id: EndingId,
    pub name: String,
    pub condition: Condition,
    /// Higher first; declaration order breaks ties.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub epilogue_prompt: Option<String>,
    #[serde(default)]
    pub on_enter: Vec<Effect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioAssets {
    pub scenario_id: ScenarioId,
    pub title: String,
    #[serde(default)]
    pub turn_limit: Option<u32>,
    #[serde(default)]
    pub start_node: Option<String>,
    /// Declared NPC stat names with their bounds.
    #[serde(default)]
    pub stats: BTreeMap<String, Bounds>,
    #[serde(default)]
    pub vars: BTreeMap<String, VarSpec>,
    #[serde(default)]
    pub flags: BTreeMap<String, StateValue>,
    #[serde(default)]
    pub initial_inventory: BTreeSet<ItemId>,
    #[serde(default)]
    pub npcs: Vec<NpcDefinition>,
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
    #[serde(default)]
    pub locks: Vec<LockDefinition>,
    #[serde(default)]
    pub items: Vec<ItemDefinition>,
    #[serde(default)]
    pub endings: Vec<EndingDefinition>,
}

impl ScenarioAssets {
    pub fn declares_stat(&self, stat: &str) -> bool {
        self.stats.contains_key(stat)
    }

    pub fn stat_bounds(&self, stat: &str) -> Bounds {
        self.stats.get(stat).copied().unwrap_or_default()
    }

    pub fn stat_names(&self) -> impl Iterator<Item = &str> {
        self.stats.keys().map(String::as_str)
    }

    pub fn var_spec(&self, name: &str) -> Option<&VarSpec> {
        self.vars.get(name)
    }

    pub fn var_bounds(&self, name: &str) -> Bounds {
        self.var_spec(name).map(VarSpec::bounds).unwrap_or_default()
    }

    pub fn npc(&self, npc_id: &str) -> Option<&NpcDefinition> {
        self.npcs.iter().find(|n| n.npc_id.as_str() == npc_id)
    }

    pub fn item(&self, item_id: &str) -> Option<&ItemDefinition> {
        self.items.iter().find(|i| i.item_id.as_str() == item_id)
    }

    pub fn lock(&self, lock_id: &str) -> Option<&LockDefinition> {
        self.locks.iter().find(|l| l.lock_id.as_str() == lock_id)
    }

    /// Display name of an NPC, falling back to its id.
    pub fn npc_name<'a>(&'a self, npc_id: &'a str) -> &'a str {
        self.npc(npc_id).map(|n| n.name.as_str()).unwrap_or(npc_id)
    }

    /// Endings in evaluation order: higher priority first, then declaration order.
    pub fn endings_by_priority(&self) -> Vec<&EndingDefinition> {
        let mut endings: Vec<&EndingDefinition> = self.endings.iter().collect();
        endings.sort_by(|a, b| b.priority.cmp(&a.priority));
        endings
    }

    pub fn validate(&self) -> Vec<ValidationIssue> {
        validate::validate(self)
    }
}

/// Strip the `vars.` / `player.` namespace an author may put on a var key.
pub fn normalize_var_key(key: &str) -> &str {
    key.strip_prefix("vars.")
        .or_else(|| key.strip_prefix("player."))
        .unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effects_deserialize_from_tagged_json() {
        let effects: Vec<Effect> = serde_json::from_value(serde_json::json!([
            { "type": "npc_stat_add", "npc": "__active__", "stat": "affection", "value": 5 },
            { "type": "flag_set", "key": "escaped_via_doghole" },
            { "type": "set_status", "npc": "stepmother", "status": "sleeping", "duration": 3 },
            { "type": "unlock_ending", "ending_id": "stealth_exit_test" }
        ]))
        .unwrap();
        assert_eq!(
            effects[1],
            Effect::FlagSet {
                key: "escaped_via_doghole".into(),
                value: StateValue::Bool(true)
            }
        );
        assert!(matches!(effects[2], Effect::SetStatus { duration: Some(3), .. }));
    }

    #[test]
    fn unknown_item_kinds_become_misc() {
        let kind: ItemKind = serde_json::from_str("\"trinket\"").unwrap();
        assert_eq!(kind, ItemKind::Misc);
        assert!(ItemKind::Gift.is_consumed_on_use());
        assert!(!ItemKind::Key.is_consumed_on_use());
    }

    #[test]
    fn endings_sorted_by_priority_then_declaration() {
        let assets: ScenarioAssets = serde_json::from_value(serde_json::json!({
            "scenario_id": "s",
            "title": "S",
            "endings": [
                { "ending_id": "a", "name": "A", "condition": "" },
                { "ending_id": "b", "name": "B", "condition": "", "priority": 5 },
                { "ending_id": "c", "name": "C", "condition": "" }
            ]
        }))
        .unwrap();
        let order: Vec<&str> = assets
            .endings_by_priority()
            .iter()
            .map(|e| e.ending_id.as_str())
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn var_keys_lose_their_namespace() {
        assert_eq!(normalize_var_key("vars.humanity"), "humanity");
        assert_eq!(normalize_var_key("player.humanity"), "humanity");
        assert_eq!(normalize_var_key("humanity"), "humanity");
    }

    #[test]
    fn bounds_default_to_percent() {
        let bounds = Bounds::default();
        assert_eq!(bounds.clamp(120), 100);
        assert_eq!(bounds.clamp(-3), 0);
    }
}
