//! NPC memory stream.
//!
//! Every NPC keeps an append-only list of observations, dialogue lines, reflections and
//! plans. Importance accumulates between reflections; the night pipeline reflects once it
//! crosses a threshold and resets the accumulator.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::MemoryId;

/// Upper bound on a single NPC's memory stream. Lowest-importance, oldest entries go first.
pub const MAX_MEMORIES_PER_NPC: usize = 100;

/// Per-turn decay applied to a memory's recency score.
pub const RECENCY_DECAY: f32 = 0.95;

/// Weights of the three retrieval signals.
const RECENCY_WEIGHT: f32 = 1.0;
const IMPORTANCE_WEIGHT: f32 = 1.0;
const RELEVANCE_WEIGHT: f32 = 1.0;

const HIGH_IMPORTANCE_KEYWORDS: &[&str] = &[
    "culprit", "evidence", "murder", "dead", "secret", "confess", "reveal", "discover",
];
const MID_IMPORTANCE_KEYWORDS: &[&str] = &["suspect", "question", "talk", "investigate", "plan"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Observation,
    Dialogue,
    Reflection,
    Plan,
    UnlockedSecret,
}

impl MemoryKind {
    /// Reflections and plans are derived from other memories and must not retrigger
    /// reflection on their own.
    pub fn counts_toward_reflection(self) -> bool {
        !matches!(self, Self::Reflection | Self::Plan)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub memory_id: MemoryId,
    pub description: String,
    pub creation_turn: u32,
    /// 1..=10
    pub importance: f32,
    pub kind: MemoryKind,
    pub recorded_at: DateTime<Utc>,
}

impl MemoryEntry {
    /// Retrieval score against `query`: recency + importance + keyword relevance,
    /// each in 0..=1.
    pub fn retrieval_score(&self, query: &Keywords, current_turn: u32) -> f32 {
        let elapsed = current_turn.saturating_sub(self.creation_turn);
        let recency = RECENCY_DECAY.powi(elapsed.min(i32::MAX as u32) as i32);
        let importance = self.importance / 10.0;
        let relevance = query.relevance(&self.description);
        RECENCY_WEIGHT * recency + IMPORTANCE_WEIGHT * importance + RELEVANCE_WEIGHT * relevance
    }

    pub fn new(
        description: impl Into<String>,
        kind: MemoryKind,
        importance: f32,
        creation_turn: u32,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            memory_id: MemoryId::new(),
            description: description.into(),
            creation_turn,
            importance: importance.clamp(1.0, 10.0),
            kind,
            recorded_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcPlan {
    pub long_term: String,
    pub short_term: String,
    pub planned_turn: u32,
}

impl NpcPlan {
    /// Whether either horizon of the plan names `needle` (case-insensitive).
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.long_term.to_lowercase().contains(&needle)
            || self.short_term.to_lowercase().contains(&needle)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NpcMemory {
    #[serde(default)]
    pub entries: Vec<MemoryEntry>,
    #[serde(default)]
    pub accumulated_importance: f32,
    #[serde(default)]
    pub last_reflection_turn: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<NpcPlan>,
}

impl NpcMemory {
    pub fn record(&mut self, entry: MemoryEntry) {
        if entry.kind.counts_toward_reflection() {
            self.accumulated_importance += entry.importance;
        }
        self.entries.push(entry);
    }

    pub fn reset_importance(&mut self, turn: u32) {
        self.accumulated_importance = 0.0;
        self.last_reflection_turn = turn;
    }

    /// Drop entries until at most `cap` remain, lowest importance first, oldest first on ties.
    pub fn prune(&mut self, cap: usize) {
        if self.entries.len() <= cap {
            return;
        }
        let excess = self.entries.len() - cap;
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by(|&a, &b| {
            let (ea, eb) = (&self.entries[a], &self.entries[b]);
            ea.importance
                .total_cmp(&eb.importance)
                .then(ea.creation_turn.cmp(&eb.creation_turn))
        });
        let mut doomed = vec![false; self.entries.len()];
        for &idx in &order[..excess] {
            doomed[idx] = true;
        }
        let mut idx = 0;
        self.entries.retain(|_| {
            let keep = !doomed[idx];
            idx += 1;
            keep
        });
    }

    /// Entries from the last `window` turns whose importance is at least `min_importance`.
    pub fn recent(&self, current_turn: u32, window: u32, min_importance: f32) -> Vec<&MemoryEntry> {
        let since = current_turn.saturating_sub(window);
        self.entries
            .iter()
            .filter(|e| e.creation_turn >= since && e.importance >= min_importance)
            .collect()
    }

    /// Up to `k` entries most worth recalling for `query` at `current_turn`.
    ///
    /// The newest reflection always comes first; the remaining slots (at least one)
    /// go to the best-scoring other entries, see [`MemoryEntry::retrieval_score`].
    pub fn retrieve(&self, query: &str, current_turn: u32, k: usize) -> Vec<&MemoryEntry> {
        if k == 0 || self.entries.is_empty() {
            return Vec::new();
        }
        let pinned = self
            .entries
            .iter()
            .rposition(|e| e.kind == MemoryKind::Reflection);

        let keywords = Keywords::new(query);
        let mut scored: Vec<(f32, usize)> = self
            .entries
            .iter()
            .enumerate()
            .filter(|(idx, _)| Some(*idx) != pinned)
            .map(|(idx, e)| (e.retrieval_score(&keywords, current_turn), idx))
            .collect();
        // Highest score first; newer entries win ties.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(b.1.cmp(&a.1)));

        let slots = k.saturating_sub(usize::from(pinned.is_some())).max(1);
        pinned
            .into_iter()
            .chain(scored.into_iter().take(slots).map(|(_, idx)| idx))
            .map(|idx| &self.entries[idx])
            .collect()
    }
}

/// Lowercased word set of a retrieval query.
#[derive(Debug, Clone, Default)]
pub struct Keywords(BTreeSet<String>);

impl Keywords {
    pub fn new(text: &str) -> Self {
        Self(words(text).collect())
    }

    /// Share of the query's words that appear in `text`. An empty query rates
    /// everything 0.5.
    pub fn relevance(&self, text: &str) -> f32 {
        if self.0.is_empty() {
            return 0.5;
        }
        let found: BTreeSet<String> = words(text).filter(|w| self.0.contains(w)).collect();
        (found.len() as f32 / self.0.len() as f32).min(1.0)
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Keyword-based importance used when no generator score is available.
pub fn rule_based_importance(description: &str) -> f32 {
    let lower = description.to_lowercase();
    let mut score: f32 = 5.0;
    if HIGH_IMPORTANCE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        score = score.max(8.0);
    }
    if MID_IMPORTANCE_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        score = score.max(6.0);
    }
    score
}
