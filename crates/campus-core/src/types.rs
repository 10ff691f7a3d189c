//! Shared types for campus-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Sender label used for the human side of a conversation
pub const USER_SENDER: &str = "user";

/// Sender label used for persisted tool invocations
pub const TOOL_SENDER: &str = "tool";

/// Label the web frontend uses for the user's own messages
const USER_ALIAS: &str = "You";

/// The closed set of responders a query can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponderId {
    #[serde(rename = "Course Advisor")]
    CourseAdvisor,
    #[serde(rename = "University Poet")]
    UniversityPoet,
    #[serde(rename = "Scheduling Assistant")]
    SchedulingAssistant,
    #[serde(rename = "Triage Agent")]
    TriageAgent,
}

impl ResponderId {
    /// Every responder, in routing priority order with the fallback last
    pub const ALL: [ResponderId; 4] = [
        ResponderId::UniversityPoet,
        ResponderId::CourseAdvisor,
        ResponderId::SchedulingAssistant,
        ResponderId::TriageAgent,
    ];

    /// Display name, also used as the persisted sender label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CourseAdvisor => "Course Advisor",
            Self::UniversityPoet => "University Poet",
            Self::SchedulingAssistant => "Scheduling Assistant",
            Self::TriageAgent => "Triage Agent",
        }
    }

    /// Parse an exact responder name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == name)
    }

    /// Config-friendly key (`course_advisor`, `triage_agent`, ...)
    pub fn key(&self) -> &'static str {
        match self {
            Self::CourseAdvisor => "course_advisor",
            Self::UniversityPoet => "university_poet",
            Self::SchedulingAssistant => "scheduling_assistant",
            Self::TriageAgent => "triage_agent",
        }
    }

    pub fn is_triage(&self) -> bool {
        matches!(self, Self::TriageAgent)
    }
}

impl std::fmt::Display for ResponderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponderId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::from_name(trimmed)
            .or_else(|| Self::ALL.into_iter().find(|id| id.key() == trimmed))
            .ok_or_else(|| anyhow::anyhow!("Unknown responder: {}", trimmed))
    }
}

/// Who authored a turn, as far as routing is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderKind {
    User,
    Tool,
    Responder(ResponderId),
    /// Empty or unrecognised sender label
    Unknown,
}

impl SenderKind {
    pub fn parse(sender: &str) -> Self {
        match sender.trim() {
            USER_SENDER | USER_ALIAS => Self::User,
            TOOL_SENDER => Self::Tool,
            other => ResponderId::from_name(other)
                .map(Self::Responder)
                .unwrap_or(Self::Unknown),
        }
    }
}

/// One message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sender: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub text: String,
    #[serde(default = "Utc::now", deserialize_with = "null_as_now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

impl Turn {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            created_at: Utc::now(),
            meta: serde_json::Value::Null,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(USER_SENDER, text)
    }

    pub fn responder(id: ResponderId, text: impl Into<String>) -> Self {
        Self::new(id.as_str(), text)
    }

    pub fn sender_kind(&self) -> SenderKind {
        SenderKind::parse(&self.sender)
    }

    /// Turns with no sender or no text carry no routing signal
    pub fn is_malformed(&self) -> bool {
        self.sender.trim().is_empty() || self.text.trim().is_empty()
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_now<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.unwrap_or_else(Utc::now))
}

/// A tool call made while generating a reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub input: serde_json::Value,
    pub output: String,
}

/// A finished reply, attributed to the responder chosen before generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub responder: ResponderId,
    pub text: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolInvocation>,
}
