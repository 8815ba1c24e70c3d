use std::collections::BTreeMap;
use std::sync::OnceLock;

use dollhouse_domain::{NpcId, ScenarioAssets};
use regex_lite::Regex;

use crate::use_cases::generation::parse_json_object;

/// Largest change one conversation may make to a single stat.
pub const MAX_NIGHT_STAT_CHANGE: i64 = 2;

/// Stat changes keyed the way `StateDelta.npc_stats` is.
pub type StatChanges = BTreeMap<NpcId, BTreeMap<String, i64>>;

fn text_change_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)([a-z_]+)\s*[:.]\s*([a-z_]+)\s*([+-]\s*\d+)").ok())
        .as_ref()
}

/// Read one pair's stat changes out of the impact answer.
///
/// A JSON `npc_stats` object is preferred; failing that, lines like `brother: fear +1`
/// (ids or display names) are picked out of the prose. Only the two participants and
/// declared stats survive, and each stat's total is clamped to the per-conversation cap.
pub fn parse_impact(
    response: &str,
    pair: (&NpcId, &NpcId),
    assets: &ScenarioAssets,
    stat_names: &[&str],
) -> StatChanges {
    let participant = |raw: &str| -> Option<NpcId> {
        [pair.0, pair.1]
            .into_iter()
            .find(|id| {
                id.as_str().eq_ignore_ascii_case(raw)
                    || assets.npc_name(id.as_str()).eq_ignore_ascii_case(raw)
            })
            .cloned()
    };
    let declared = |raw: &str| {
        stat_names
            .iter()
            .copied()
            .find(|stat| stat.eq_ignore_ascii_case(raw))
    };

    let mut raw_changes: Vec<(NpcId, String, i64)> = Vec::new();
    if let Some(object) = parse_json_object(response) {
        let nested = object.get("npc_stats").and_then(|v| v.as_object()).cloned();
        let stats = nested.unwrap_or(object);
        for (npc, changes) in &stats {
            let (Some(npc_id), Some(changes)) = (participant(npc), changes.as_object()) else {
                continue;
            };
            for (stat, value) in changes {
                if let (Some(stat), Some(value)) = (declared(stat), value.as_i64()) {
                    raw_changes.push((npc_id.clone(), stat.to_string(), value));
                }
            }
        }
    } else if let Some(pattern) = text_change_pattern() {
        for captures in pattern.captures_iter(response) {
            let (Some(npc), Some(stat), Some(value)) = (captures.get(1), captures.get(2), captures.get(3))
            else {
                continue;
            };
            let value: Option<i64> = value.as_str().replace(char::is_whitespace, "").parse().ok();
            if let (Some(npc_id), Some(stat), Some(value)) =
                (participant(npc.as_str()), declared(stat.as_str()), value)
            {
                raw_changes.push((npc_id, stat.to_string(), value));
            }
        }
    }

    let mut changes = StatChanges::new();
    for (npc_id, stat, value) in raw_changes {
        let slot = changes.entry(npc_id).or_default().entry(stat).or_insert(0);
        *slot = slot.saturating_add(value);
    }
    for stats in changes.values_mut() {
        for value in stats.values_mut() {
            *value = (*value).clamp(-MAX_NIGHT_STAT_CHANGE, MAX_NIGHT_STAT_CHANGE);
        }
        stats.retain(|_, value| *value != 0);
    }
    changes.retain(|_, stats| !stats.is_empty());
    changes
}
