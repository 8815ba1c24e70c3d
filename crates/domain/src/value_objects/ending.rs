use serde::{Deserialize, Serialize};

use crate::ids::EndingId;

/// A matched ending. Once stored on the world state the session is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndingMatch {
    pub ending_id: EndingId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epilogue_prompt: Option<String>,
    pub matched_turn: u32,
}
