use dollhouse_domain::{ItemId, NpcId, WorldState};

use crate::infrastructure::ports::ClassifiedIntent;
use crate::use_cases::intent::{ResolvedIntent, ToolName};

/// Intent labels that mean "use something".
const USAGE_INTENTS: &[&str] = &["use", "use_item", "item_use", "apply", "unlock", "give"];

/// Words in the raw input that mean "use something".
const USAGE_VERBS: &[&str] = &["use", "using", "unlock", "apply", "insert", "give", "open"];

/// Resolve the classifier's reading into the tool that will run.
///
/// Unknown tool names fall back to `npc_talk`. When the input clearly asks to use a held
/// item, `item_usage` wins over whatever the classifier chose.
pub fn select_tool(raw_input: &str, classified: &ClassifiedIntent, world: &WorldState) -> ResolvedIntent {
    let base = ToolName::parse(&classified.tool_name).unwrap_or(ToolName::NpcTalk);
    let held_item = held_item(classified, world);

    let wants_usage = implies_usage(raw_input, classified.intent.as_deref());
    let (tool, overridden) = match &held_item {
        Some(_) if wants_usage && base != ToolName::ItemUsage => (ToolName::ItemUsage, true),
        _ => (base, false),
    };
    if overridden {
        tracing::debug!(
            classified = %classified.tool_name,
            item_id = ?held_item,
            "Usage wording overrides classified tool"
        );
    }

    let active_npc = classified
        .args
        .npc_id
        .clone()
        .filter(|id| world.npc(id.as_str()).is_some())
        .or_else(|| {
            // An item used on an NPC addresses that NPC.
            classified
                .args
                .target
                .as_deref()
                .filter(|t| world.npc(t).is_some())
                .map(NpcId::new)
        });

    ResolvedIntent {
        tool,
        overridden,
        intent: classified.intent.clone(),
        active_npc,
        item_id: if tool == ToolName::ItemUsage {
            held_item.or_else(|| classified.args.item_id.clone())
        } else {
            classified.args.item_id.clone()
        },
        args: classified.args.clone(),
        raw_input: raw_input.to_string(),
    }
}

/// The item the classifier pointed at, but only if the player actually holds it.
fn held_item(classified: &ClassifiedIntent, world: &WorldState) -> Option<ItemId> {
    classified
        .args
        .item_id
        .iter()
        .map(|id| id.as_str().to_string())
        .chain(classified.args.target.iter().map(|t| t.trim().to_lowercase().replace(' ', "_")))
        .find(|id| world.has_item(id))
        .map(ItemId::new)
}

fn implies_usage(raw_input: &str, intent: Option<&str>) -> bool {
    if intent.is_some_and(|i| USAGE_INTENTS.contains(&i.trim().to_lowercase().as_str())) {
        return true;
    }
    raw_input
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| USAGE_VERBS.contains(&word))
}
