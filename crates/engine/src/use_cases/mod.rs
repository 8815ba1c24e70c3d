//! Use cases - turn orchestration.
//!
//! Synchronous gating components (rules, locks, items, status effects, endings) are pure
//! functions of the world and the scenario. The day and night controllers add the
//! generator-backed stages, and the turn service ties everything to storage.

pub mod day;
pub mod ending;
pub mod generation;
pub mod intent;
pub mod items;
pub mod locks;
pub mod night;
pub mod prompts;
pub mod rules;
pub mod status;
pub mod turn;
pub mod world_state;

// Re-export main types
pub use day::{DayController, DayOutcome, DayPhase};
pub use ending::EndingChecker;
pub use intent::{ResolvedIntent, ToolName};
pub use items::{ItemAcquirer, ItemRejection, ItemUseResolver, RejectionCode};
pub use locks::LockManager;
pub use night::{NightController, NightOutcome, NightSettings};
pub use rules::RuleEngine;
pub use status::StatusEffectManager;
pub use turn::{NightResult, TurnError, TurnResult, TurnService};
pub use world_state::{StateError, WorldStateManager};
