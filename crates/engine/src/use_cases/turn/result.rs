use dollhouse_domain::{
    DomainError, EndingId, EndingMatch, ItemId, LockId, NpcId, RuleId, ScenarioId, StateDelta,
    StatusEffectId, WorldState,
};
use serde::Serialize;

use crate::infrastructure::ports::RepoError;
use crate::use_cases::day::DayPhase;
use crate::use_cases::intent::ToolName;
use crate::use_cases::items::ItemRejection;
use crate::use_cases::night::Utterance;
use crate::use_cases::world_state::StateError;

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Scenario not registered: {0}")]
    UnknownScenario(ScenarioId),
    #[error("Session has ended ({ending_id})")]
    SessionEnded { ending_id: EndingId },
    #[error(transparent)]
    State(#[from] StateError),
}

impl From<RepoError> for TurnError {
    fn from(e: RepoError) -> Self {
        Self::State(StateError::Repo(e))
    }
}

impl From<DomainError> for TurnError {
    fn from(e: DomainError) -> Self {
        Self::State(StateError::Domain(e))
    }
}

impl TurnError {
    pub fn is_session_ended(&self) -> bool {
        matches!(self, Self::SessionEnded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StateResult {
    /// Every stage delta that was applied this turn, merged.
    pub delta: StateDelta,
    pub world: WorldState,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TurnDebug {
    pub turn_before: u32,
    pub turn_after: u32,
    /// One record per pipeline stage, in order.
    pub steps: Vec<serde_json::Value>,
    pub dropped: Vec<String>,
    pub day_trace: Vec<DayPhase>,
    pub tool: Option<ToolName>,
    pub classified: bool,
    pub fired_rules: Vec<RuleId>,
    pub unlocked: Vec<LockId>,
    pub acquired: Vec<ItemId>,
    pub expired_effects: Vec<StatusEffectId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResult {
    pub narrative: String,
    pub ending_info: Option<EndingMatch>,
    pub state_result: StateResult,
    pub rejection: Option<ItemRejection>,
    pub debug: TurnDebug,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NightDebug {
    pub turn: u32,
    pub pairs: Vec<(NpcId, NpcId)>,
    pub reflected: Vec<NpcId>,
    pub planned: Vec<NpcId>,
    pub descriptions: Vec<String>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NightResult {
    pub night_delta: StateDelta,
    pub conversation_log: Vec<Utterance>,
    pub narrative: String,
    pub ending_info: Option<EndingMatch>,
    pub world: WorldState,
    pub debug: NightDebug,
}
