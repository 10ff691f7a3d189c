//! JSON bodies exchanged with the web frontend

use campus_core::types::{ResponderId, ToolInvocation, Turn};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /api/message/` and `POST /api/chat/`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageRequest {
    /// Trimmed text, `None` when missing or blank
    pub fn text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub session_id: String,
    pub agent: ResponderId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocation>,
}

/// Body of `POST /api/clear/`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub sender: String,
    pub text: String,
    #[serde(default)]
    pub meta: Value,
    pub created_at: DateTime<Utc>,
}

impl From<Turn> for HistoryMessage {
    fn from(turn: Turn) -> Self {
        Self {
            sender: turn.sender,
            text: turn.text,
            meta: turn.meta,
            created_at: turn.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub sessions: usize,
    pub uptime_secs: u64,
}

/// Tool call persisted as a `tool` turn; the text is the invocation as JSON
pub fn tool_turn(invocation: &ToolInvocation) -> Turn {
    let mut turn = Turn::new(
        campus_core::types::TOOL_SENDER,
        serde_json::to_string(invocation).unwrap_or_default(),
    );
    turn.meta = serde_json::json!({ "tool": invocation.name });
    turn
}
