//! Dollhouse domain.
//!
//! Pure model of one player's run through a scenario: the world state, the deltas that
//! mutate it, the condition language that gates content, and the read-only scenario
//! declarations. Nothing in here performs I/O or logs; callers decide what to do with
//! the reports (dropped fragments, validation issues) the domain hands back.

pub mod condition;
pub mod delta;
pub mod effects;
pub mod error;
pub mod ids;
pub mod scenario;
pub mod value_objects;
pub mod world;

pub use condition::{evaluate_condition, Condition, ConditionError, EvalContext};
pub use delta::{merge, MemoryUpdate, StateDelta, StatusEffectChanges, VarChange};
pub use effects::{compile_effects, CompiledEffects, EffectContext};
pub use error::DomainError;
pub use ids::{
    EndingId, ItemId, LockId, MemoryId, NpcId, PlayerId, PlayerKey, RuleId, ScenarioId,
    StatusEffectId,
};
pub use scenario::{
    AcquireMethod, AcquireSpec, Bounds, Effect, EndingDefinition, ItemAction, ItemDefinition,
    ItemKind, LockDefinition, NpcDefinition, RuleDefinition, ScenarioAssets, ValidationIssue,
    VarSpec, ACTIVE_NPC_ALIASES,
};
pub use value_objects::{
    rule_based_importance, EffectTarget, EndingMatch, MemoryEntry, MemoryKind, NpcMemory,
    NpcPlan, StateValue, StatusEffect, MAX_MEMORIES_PER_NPC,
};
pub use world::{apply, Applied, DroppedFragment, NpcState, WorldState, DEFAULT_NPC_STATUS};
