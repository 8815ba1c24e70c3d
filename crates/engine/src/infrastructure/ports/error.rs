//! Error types for port operations.

/// Repository operation errors with context for debugging.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// Storage operation failed - includes operation name for tracing.
    #[error("Storage error in {operation}: {message}")]
    Database {
        operation: &'static str,
        message: String,
    },
}

impl RepoError {
    /// Create a Database error with operation context.
    pub fn database(operation: &'static str, message: impl ToString) -> Self {
        Self::Database {
            operation,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("LLM call timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("LLM unavailable")]
    Unavailable,
}

impl LlmError {
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout {
            after_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether asking again could plausibly succeed. A refused request (bad input,
    /// credentials) or a missing backend will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RequestFailed(message) => !["400", "401", "403", "Invalid"]
                .iter()
                .any(|marker| message.contains(marker)),
            Self::InvalidResponse(_) | Self::Timeout { .. } => true,
            Self::Unavailable => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifierError {
    #[error("Classification failed: {0}")]
    Failed(String),
    #[error("Classifier unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NarrativeError {
    #[error("Narrative rendering failed: {0}")]
    Failed(String),
    #[error("Narrator unavailable")]
    Unavailable,
}
