//! Value objects - Immutable objects defined by their attributes

mod ending;
mod memory;
mod state_value;
mod status_effect;

pub use ending::EndingMatch;
pub use memory::{
    rule_based_importance, Keywords, MemoryEntry, MemoryKind, NpcMemory, NpcPlan,
    MAX_MEMORIES_PER_NPC,
};
pub use state_value::StateValue;
pub use status_effect::{EffectTarget, StatusEffect};
