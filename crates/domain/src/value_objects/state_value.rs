use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a flag or a var.
///
/// Scenario authors write flags and vars as plain JSON scalars, so this is untagged:
/// `null`, `true`, `3` and `"player_room"` all deserialize directly.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    #[default]
    Null,
    Bool(bool),
    Number(i64),
    Text(String),
}

impl StateValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Truthiness used when a bare operand appears in a condition.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0,
            Self::Text(s) => !s.is_empty(),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for StateValue {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}
