//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod clock;
pub mod offline;
pub mod ports;
pub mod resilient_llm;
pub mod settings;
pub mod world_store;
