//! The player's input after classification and tool selection.

use std::fmt;

use dollhouse_domain::{ItemId, NpcId};
use serde::{Deserialize, Serialize};

use crate::infrastructure::ports::ToolArgs;

/// The three tools a day turn can dispatch to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolName {
    NpcTalk,
    Action,
    ItemUsage,
}

impl ToolName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NpcTalk => "npc_talk",
            Self::Action => "action",
            Self::ItemUsage => "item_usage",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "npc_talk" | "talk" => Some(Self::NpcTalk),
            "action" => Some(Self::Action),
            "item_usage" | "use_item" => Some(Self::ItemUsage),
            _ => None,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What rules and tools see of one day turn's input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedIntent {
    pub tool: ToolName,
    /// Set when the player's wording forced item usage over the classifier's choice.
    pub overridden: bool,
    pub intent: Option<String>,
    /// The NPC the player addressed, if it exists in the world.
    pub active_npc: Option<NpcId>,
    /// The held item the turn is about, for item usage.
    pub item_id: Option<ItemId>,
    pub args: ToolArgs,
    pub raw_input: String,
}
