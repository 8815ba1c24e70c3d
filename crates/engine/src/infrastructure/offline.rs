//! Generator adapters that work without any model behind them.
//!
//! The binary wires these in when no real generator is configured. Every engine stage
//! already falls back on generator failure, so `OfflineLlm` simply refuses and lets the
//! deterministic paths run.

use async_trait::async_trait;
use dollhouse_domain::{ItemId, WorldState};

use crate::infrastructure::ports::{
    ClassifiedIntent, ClassifierError, IntentClassifierPort, LlmError, LlmPort, LlmRequest,
    LlmResponse, NarrativeError, NarrativePort, NarrativeRequest, ToolArgs,
};

/// Always unavailable.
#[derive(Debug, Default)]
pub struct OfflineLlm;

#[async_trait]
impl LlmPort for OfflineLlm {
    async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::Unavailable)
    }
}

/// Joins event lines verbatim.
#[derive(Debug, Default)]
pub struct ConcatNarrator;

#[async_trait]
impl NarrativePort for ConcatNarrator {
    async fn render(&self, request: NarrativeRequest) -> Result<String, NarrativeError> {
        Ok(request.fallback_text())
    }
}

/// Reads either a JSON-encoded [`ClassifiedIntent`] or a handful of plain command shapes:
///
/// - `go to <place>` / `move to <place>`
/// - `take <item>` / `pick up <item>`
/// - `use <item> on <target>`
/// - anything else is speech, addressed to the first NPC whose id appears in it
#[derive(Debug, Default)]
pub struct ScriptedClassifier;

#[async_trait]
impl IntentClassifierPort for ScriptedClassifier {
    async fn classify(
        &self,
        raw_input: &str,
        world: &WorldState,
    ) -> Result<ClassifiedIntent, ClassifierError> {
        let trimmed = raw_input.trim();
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed)
                .map_err(|e| ClassifierError::Failed(e.to_string()));
        }
        Ok(classify_plain(trimmed, world))
    }
}

fn classify_plain(input: &str, world: &WorldState) -> ClassifiedIntent {
    let lower = input.to_lowercase();

    for prefix in ["go to ", "move to "] {
        if let Some(place) = lower.strip_prefix(prefix) {
            return action("move", place.trim());
        }
    }
    for prefix in ["take ", "pick up "] {
        if let Some(item) = lower.strip_prefix(prefix) {
            let item = item.trim().trim_start_matches("the ").replace(' ', "_");
            let mut intent = action("pickup", &item);
            intent.args.item_id = Some(ItemId::new(item));
            return intent;
        }
    }
    if let Some(rest) = lower.strip_prefix("use ") {
        let (item, target) = match rest.split_once(" on ") {
            Some((item, target)) => (item, Some(target.trim().to_string())),
            None => (rest, None),
        };
        let item = item.trim().trim_start_matches("the ").replace(' ', "_");
        return ClassifiedIntent {
            tool_name: "item_usage".to_string(),
            args: ToolArgs {
                item_id: Some(ItemId::new(item)),
                target,
                ..ToolArgs::default()
            },
            intent: Some("use".to_string()),
        };
    }

    let npc_id = world
        .npcs
        .keys()
        .find(|id| lower.contains(id.as_str()))
        .cloned();
    ClassifiedIntent {
        tool_name: "npc_talk".to_string(),
        args: ToolArgs {
            npc_id,
            content: Some(input.to_string()),
            ..ToolArgs::default()
        },
        intent: None,
    }
}

fn action(action_type: &str, target: &str) -> ClassifiedIntent {
    ClassifiedIntent {
        tool_name: "action".to_string(),
        args: ToolArgs {
            action_type: Some(action_type.to_string()),
            target: Some(target.to_string()),
            ..ToolArgs::default()
        },
        intent: Some(action_type.to_string()),
    }
}
