//! Unified error types for the domain layer
//!
//! Data-quality problems in scenario authoring never surface here: they are reported as
//! dropped fragments or validation issues. `DomainError` is reserved for misuse of the model.

use thiserror::Error;

/// Unified error type for domain operations
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// A delta was applied to a world that was never created from scenario defaults.
    #[error("World state is not initialized (turn {turn})")]
    Uninitialized { turn: u32 },
}

impl DomainError {
    /// Check if this error is a programmer error that must abort the caller.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Uninitialized { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_is_fatal() {
        let err = DomainError::Uninitialized { turn: 0 };
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "World state is not initialized (turn 0)");
    }
}
