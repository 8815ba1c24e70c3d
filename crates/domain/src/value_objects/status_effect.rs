use std::fmt;

use serde::{Deserialize, Serialize};

use crate::delta::StateDelta;
use crate::ids::{NpcId, StatusEffectId};

/// What a status effect is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum EffectTarget {
    Npc(NpcId),
    Player,
}

impl fmt::Display for EffectTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Npc(id) => write!(f, "npc.{}", id),
            Self::Player => f.write_str("player"),
        }
    }
}

/// A timed modifier. When `remaining_turns` reaches zero the effect is removed and
/// `reversal_delta` is applied, exactly once. `-1` means the effect lasts until a rule
/// clears it.
///
/// An NPC carries at most one status-changing effect at a time; a new one displaces the
/// old unless the old has a higher `priority`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub effect_id: StatusEffectId,
    pub target: EffectTarget,
    pub remaining_turns: i32,
    pub reason: String,
    pub reversal_delta: StateDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

impl StatusEffect {
    pub const INDEFINITE: i32 = -1;

    pub fn new(
        target: EffectTarget,
        remaining_turns: i32,
        reason: impl Into<String>,
        reversal_delta: StateDelta,
    ) -> Self {
        Self {
            effect_id: StatusEffectId::new(),
            target,
            remaining_turns,
            reason: reason.into(),
            reversal_delta,
            source: None,
            priority: 0,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// The status this effect puts back on `npc_id` when it ends, if it changed one.
    pub fn restores_status(&self, npc_id: &str) -> Option<&str> {
        self.reversal_delta.npc_status.get(npc_id).map(String::as_str)
    }

    pub fn is_indefinite(&self) -> bool {
        self.remaining_turns <= Self::INDEFINITE
    }
}
