//! External service port traits (LLM, intent classification, narrative rendering).

use async_trait::async_trait;
use dollhouse_domain::{EndingMatch, ItemId, NpcId, StateDelta, WorldState};
use serde::{Deserialize, Serialize};

use super::error::{ClassifierError, LlmError, NarrativeError};

// =============================================================================
// Text Generation
// =============================================================================

/// One prompt for the generator: a tagged system prompt plus the turn's messages.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f32>,
}

impl LlmRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            system_prompt: None,
            temperature: None,
        }
    }

    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..self
        }
    }

    pub fn with_temperature(self, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..self
        }
    }

    /// System prompt and messages joined by newlines.
    pub fn full_text(&self) -> String {
        std::iter::once(self.system_prompt.as_deref().unwrap_or_default())
            .chain(self.messages.iter().map(|m| m.content.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    /// The player, or the engine speaking for the scene.
    User,
    /// Earlier generator output replayed as context.
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Raw generator output. Parsing is up to the calling stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmResponse {
    pub content: String,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}

// =============================================================================
// Intent Classification
// =============================================================================

/// Arguments the classifier extracted from the player's input. All optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolArgs {
    pub npc_id: Option<NpcId>,
    pub item_id: Option<ItemId>,
    pub action_id: Option<String>,
    /// For the `action` tool: `move`, `pickup`, `investigate`, ...
    pub action_type: Option<String>,
    pub target: Option<String>,
    /// What the player actually says, for `npc_talk`.
    pub content: Option<String>,
}

/// Structured reading of one free-text player input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    /// `npc_talk`, `action` or `item_usage`. Anything else is treated as `npc_talk`.
    #[serde(default)]
    pub tool_name: String,
    #[serde(default)]
    pub args: ToolArgs,
    /// Free-form intent label rules can match on, e.g. `comfort`.
    #[serde(default)]
    pub intent: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IntentClassifierPort: Send + Sync {
    async fn classify(
        &self,
        raw_input: &str,
        world: &WorldState,
    ) -> Result<ClassifiedIntent, ClassifierError>;
}

// =============================================================================
// Narrative Rendering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeKind {
    Day,
    Night,
    Ending,
}

/// Everything the narrator gets to see for one rendering.
#[derive(Debug, Clone)]
pub struct NarrativeRequest {
    pub kind: NarrativeKind,
    pub turn: u32,
    /// Event lines in the order they happened.
    pub events: Vec<String>,
    /// Everything applied during the turn or night.
    pub delta: StateDelta,
    pub ending: Option<EndingMatch>,
}

impl NarrativeRequest {
    /// Plain concatenation of the event lines plus the ending marker. Used whenever a
    /// narrator is unavailable.
    pub fn fallback_text(&self) -> String {
        let mut lines: Vec<String> = self
            .events
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if let Some(ending) = &self.ending {
            lines.push(format!("[ending] {}", ending.name));
        }
        if lines.is_empty() {
            lines.push(match self.kind {
                NarrativeKind::Night => "The house sleeps.".to_string(),
                _ => "Nothing happens.".to_string(),
            });
        }
        lines.join("\n")
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NarrativePort: Send + Sync {
    async fn render(&self, request: NarrativeRequest) -> Result<String, NarrativeError>;
}
