//! Prompt builders for every generator-backed stage.
//!
//! Each system prompt opens with a task tag line so adapters (and test doubles) can tell
//! the calls apart without parsing prose.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use dollhouse_domain::{MemoryEntry, NpcDefinition, NpcPlan};

use crate::infrastructure::ports::{ChatMessage, LlmRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTask {
    NpcTalk,
    Reflection,
    Plan,
    Dialogue,
    Impact,
    Unknown,
}

impl PromptTask {
    const ALL: [PromptTask; 5] = [
        Self::NpcTalk,
        Self::Reflection,
        Self::Plan,
        Self::Dialogue,
        Self::Impact,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Self::NpcTalk => "[task:npc_talk]",
            Self::Reflection => "[task:reflection]",
            Self::Plan => "[task:plan]",
            Self::Dialogue => "[task:dialogue]",
            Self::Impact => "[task:impact]",
            Self::Unknown => "[task:unknown]",
        }
    }

    pub fn of(request: &LlmRequest) -> Self {
        let Some(system) = request.system_prompt.as_deref() else {
            return Self::Unknown;
        };
        Self::ALL
            .into_iter()
            .find(|task| system.starts_with(task.tag()))
            .unwrap_or(Self::Unknown)
    }
}

fn memory_lines(out: &mut String, memories: &[&MemoryEntry]) {
    if memories.is_empty() {
        out.push_str("(nothing yet)\n");
    }
    for memory in memories {
        let _ = writeln!(
            out,
            "- [turn {}, importance {:.1}] {}",
            memory.creation_turn, memory.importance, memory.description
        );
    }
}

fn stat_lines(out: &mut String, stats: &BTreeMap<String, i64>) {
    for (stat, value) in stats {
        let _ = writeln!(out, "- {}: {}", stat, value);
    }
}

pub fn npc_talk(
    npc: &NpcDefinition,
    stats: &BTreeMap<String, i64>,
    status: &str,
    memories: &[&MemoryEntry],
    plan: Option<&NpcPlan>,
    player_line: &str,
) -> LlmRequest {
    let mut system = format!(
        "{}\nYou are {}. {}\nCurrent status: {}\nStats:\n",
        PromptTask::NpcTalk.tag(),
        npc.name,
        npc.persona,
        status
    );
    stat_lines(&mut system, stats);
    system.push_str("Memories that come to mind:\n");
    memory_lines(&mut system, memories);
    if let Some(plan) = plan {
        let _ = writeln!(system, "Your plan for today: {}", plan.short_term);
    }
    system.push_str(
        "Answer the player in character. Respond with JSON: \
         {\"reply\": \"...\", \"npc_stats\": {\"<stat>\": <change between -2 and 2>}}",
    );

    LlmRequest::new(vec![ChatMessage::user(player_line)])
        .with_system_prompt(system)
        .with_temperature(0.7)
}

pub fn reflection(name: &str, persona: &str, memories: &[&MemoryEntry], max_insights: usize) -> LlmRequest {
    let mut system = format!(
        "{}\nYou are {}. {}\nThese are your most important recent memories:\n",
        PromptTask::Reflection.tag(),
        name,
        persona
    );
    memory_lines(&mut system, memories);

    LlmRequest::new(vec![ChatMessage::user(format!(
        "What are at most {} high-level insights you can draw from them? One per line.",
        max_insights
    ))])
    .with_system_prompt(system)
    .with_temperature(0.3)
}

pub fn plan(
    name: &str,
    persona: &str,
    stats: &BTreeMap<String, i64>,
    memories: &[&MemoryEntry],
    previous: Option<&NpcPlan>,
    others: &[&str],
) -> LlmRequest {
    let mut system = format!(
        "{}\nYou are {}. {}\nStats:\n",
        PromptTask::Plan.tag(),
        name,
        persona
    );
    stat_lines(&mut system, stats);
    system.push_str("Memories that come to mind:\n");
    memory_lines(&mut system, memories);
    if let Some(previous) = previous {
        let _ = writeln!(
            system,
            "Previous plan: long term '{}', short term '{}'",
            previous.long_term, previous.short_term
        );
    }
    let _ = writeln!(system, "Others in the house: {}", others.join(", "));

    LlmRequest::new(vec![ChatMessage::user(
        "Plan for tomorrow. Answer with two lines:\nLONG: <long-term goal>\nSHORT: <what you will do tomorrow>",
    )])
    .with_system_prompt(system)
    .with_temperature(0.5)
}

pub fn dialogue(
    speaker: &NpcDefinition,
    listener_name: &str,
    plan: Option<&NpcPlan>,
    memories: &[&MemoryEntry],
    transcript: &[String],
) -> LlmRequest {
    let mut system = format!(
        "{}\nYou are {}. {}\nIt is night. You are talking with {}.\n",
        PromptTask::Dialogue.tag(),
        speaker.name,
        speaker.persona,
        listener_name
    );
    if let Some(plan) = plan {
        let _ = writeln!(system, "What you want: {}", plan.short_term);
    }
    if !memories.is_empty() {
        system.push_str("You remember:\n");
        memory_lines(&mut system, memories);
    }
    system.push_str("Conversation so far:\n");
    if transcript.is_empty() {
        system.push_str("(you speak first)\n");
    }
    for line in transcript {
        let _ = writeln!(system, "{}", line);
    }

    LlmRequest::new(vec![ChatMessage::user("Say your next line. One sentence.")])
        .with_system_prompt(system)
        .with_temperature(0.8)
}

pub fn impact(participants: &[(&str, &str)], stat_names: &[&str], transcript: &[String]) -> LlmRequest {
    let mut system = format!("{}\nParticipants:\n", PromptTask::Impact.tag());
    for (id, name) in participants {
        let _ = writeln!(system, "- {} ({})", id, name);
    }
    let _ = writeln!(system, "Stats: {}", stat_names.join(", "));
    system.push_str("Conversation:\n");
    for line in transcript {
        let _ = writeln!(system, "{}", line);
    }

    LlmRequest::new(vec![ChatMessage::user(
        "How did this conversation change each participant? Respond with JSON: \
         {\"npc_stats\": {\"<npc_id>\": {\"<stat>\": <change between -2 and 2>}}}",
    )])
    .with_system_prompt(system)
    .with_temperature(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_is_read_back_from_the_tag() {
        let request = impact(&[("brother", "Brother")], &["affection"], &[]);
        assert_eq!(PromptTask::of(&request), PromptTask::Impact);
        assert_eq!(PromptTask::of(&LlmRequest::new(vec![])), PromptTask::Unknown);
    }
}
