//! Condition language shared by locks, endings, rules and item preconditions.
//!
//! Conditions are parsed once, when scenario assets are deserialized, and evaluated as
//! often as needed. Evaluation never fails: unknown identifiers and malformed sources
//! both evaluate to `false`.
//!
//! Supported lookups:
//!
//! | path | resolves to |
//! |------|-------------|
//! | `npc.<id>.<stat>` | NPC stat (`npc.target.<stat>` uses the active NPC) |
//! | `npc.<id>.status` | NPC categorical status |
//! | `vars.<name>` / `player.<name>` | var |
//! | `flags.<name>` | flag, `null` when unset |
//! | `locks.<id>` | whether the lock is open |
//! | `system.turn`, `turn` | current turn |
//! | `turn_limit` | scenario turn limit |
//! | `intent`, `tool` | classified intent and selected tool of the current turn |

mod eval;
mod lexer;
mod parser;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::NpcId;
use crate::scenario::ScenarioAssets;
use crate::world::WorldState;

pub use lexer::CmpOp;
use parser::Expr;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("unexpected {found} at offset {position}")]
    Unexpected { position: usize, found: String },

    #[error("unexpected end of condition at offset {position}")]
    UnexpectedEnd { position: usize },

    #[error("unterminated string starting at offset {position}")]
    UnterminatedString { position: usize },

    #[error("unknown function '{name}' at offset {position}")]
    UnknownFunction { position: usize, name: String },

    #[error("nesting deeper than {limit} levels at offset {position}")]
    TooDeep { position: usize, limit: usize },
}

impl ConditionError {
    pub(crate) fn unexpected(position: usize, found: impl Into<String>) -> Self {
        Self::Unexpected {
            position,
            found: found.into(),
        }
    }
}

/// A compiled condition. Keeps its source text for serialization and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Condition {
    source: String,
    compiled: Result<Option<Expr>, ConditionError>,
}

impl Condition {
    /// Parse strictly, surfacing syntax errors.
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let compiled = compile(source)?;
        Ok(Self {
            source: source.to_string(),
            compiled: Ok(compiled),
        })
    }

    /// Parse leniently: a malformed source is kept and always evaluates to `false`.
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = compile(&source);
        Self { source, compiled }
    }

    /// The empty condition, which always holds.
    pub fn always() -> Self {
        Self {
            source: String::new(),
            compiled: Ok(None),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn error(&self) -> Option<&ConditionError> {
        self.compiled.as_ref().err()
    }

    /// Whether the condition mentions `has_item(..)` anywhere.
    pub fn references_inventory(&self) -> bool {
        match &self.compiled {
            Ok(Some(expr)) => eval::mentions_inventory(expr),
            _ => false,
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext<'_>) -> bool {
        match &self.compiled {
            Ok(Some(expr)) => eval::evaluate(expr, ctx),
            Ok(None) => true,
            Err(_) => false,
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::always()
    }
}

impl From<String> for Condition {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Condition {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Condition> for String {
    fn from(value: Condition) -> Self {
        value.source
    }
}

fn compile(source: &str) -> Result<Option<Expr>, ConditionError> {
    if source.trim().is_empty() {
        return Ok(None);
    }
    let tokens = lexer::tokenize(source)?;
    parser::parse(tokens, source.len()).map(Some)
}

/// Everything a condition can look at.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub world: &'a WorldState,
    pub turn_limit: Option<u32>,
    pub intent: Option<&'a str>,
    pub tool: Option<&'a str>,
    pub active_npc: Option<&'a NpcId>,
}

impl<'a> EvalContext<'a> {
    pub fn new(world: &'a WorldState) -> Self {
        Self {
            world,
            turn_limit: None,
            intent: None,
            tool: None,
            active_npc: None,
        }
    }

    pub fn for_scenario(world: &'a WorldState, assets: &ScenarioAssets) -> Self {
        Self::new(world).with_turn_limit(assets.turn_limit)
    }

    pub fn with_turn_limit(mut self, turn_limit: Option<u32>) -> Self {
        self.turn_limit = turn_limit;
        self
    }

    pub fn with_intent(mut self, intent: Option<&'a str>) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_tool(mut self, tool: Option<&'a str>) -> Self {
        self.tool = tool;
        self
    }

    pub fn with_active_npc(mut self, npc: Option<&'a NpcId>) -> Self {
        self.active_npc = npc;
        self
    }
}

/// One-shot evaluation of a source string. Malformed sources evaluate to `false`.
pub fn evaluate_condition(source: &str, ctx: &EvalContext<'_>) -> bool {
    Condition::new(source).evaluate(ctx)
}
