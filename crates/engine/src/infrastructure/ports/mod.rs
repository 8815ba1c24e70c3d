//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - World state storage (could swap the in-memory map for a database)
//! - Generator calls (LLM text, intent classification, narrative rendering)
//! - Clock (for testing)

mod error;
mod external;
mod repos;
mod testing;

pub use error::{ClassifierError, LlmError, NarrativeError, RepoError};
pub use external::{
    ChatMessage, ClassifiedIntent, IntentClassifierPort, LlmPort, LlmRequest, LlmResponse,
    MessageRole, NarrativeKind, NarrativePort, NarrativeRequest, ToolArgs,
};
pub use repos::WorldStateRepo;
pub use testing::ClockPort;

#[cfg(test)]
pub use external::{MockIntentClassifierPort, MockLlmPort, MockNarrativePort};
#[cfg(test)]
pub use repos::MockWorldStateRepo;
#[cfg(test)]
pub use testing::MockClockPort;
