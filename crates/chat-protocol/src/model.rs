//! Transcript, activity and session data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Sentinel node id for the reasoning phase of a response. Text emitted
/// under this node targets a message's `thinking` field instead of
/// `content`.
pub const THINKING_NODE_ID: &str = "thinking";

/// Session id used when no session has been selected yet, and the
/// fallback when the active session is removed.
pub const DEFAULT_SESSION_ID: &str = "default";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One transcript entry. At most one message in a transcript is
/// incomplete at any time; once `is_complete` is set the message is
/// never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub is_complete: bool,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            thinking: None,
            mode: None,
            agent_name: None,
            node_id: None,
            timestamp: Utc::now(),
            is_complete: true,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// A streaming assistant message, open for further appends.
    pub fn streaming_assistant() -> Self {
        let mut message = Self::new(Role::Assistant, "");
        message.is_complete = false;
        message
    }
}

/// A dangerous-tool approval request awaiting a user decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolConfirmationRequest {
    pub request_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// One row of the agent activity log. Keyed by agent name: a later
/// entry for the same agent replaces the prior one, keeping its
/// original step ordinal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub agent_name: String,
    pub status: ActivityStatus,
    pub details: String,
    pub step: usize,
}

/// One conversation thread in the session list cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message_count: usize,
}

/// Wire shape of a replayed history message. Timestamps arrive as
/// strings and are converted on replay; anything unparsable falls back
/// to the current time rather than dropping the message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMessage {
    #[serde(default)]
    pub id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HistoryMessage {
    /// Convert a wire history message into a completed transcript entry.
    pub fn into_message(self) -> ChatMessage {
        let timestamp = self
            .timestamp
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map_or_else(Utc::now, |parsed| parsed.with_timezone(&Utc));
        ChatMessage {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            role: self.role,
            content: self.content,
            thinking: self.thinking,
            mode: self.mode,
            agent_name: self.agent_name,
            node_id: self.node_id,
            timestamp,
            is_complete: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_assistant_starts_incomplete() {
        let message = ChatMessage::streaming_assistant();
        assert_eq!(message.role, Role::Assistant);
        assert!(!message.is_complete);
        assert!(message.content.is_empty());
        assert!(message.thinking.is_none());
    }

    #[test]
    fn history_message_converts_rfc3339_timestamp() {
        let wire = HistoryMessage {
            id: Some("m1".to_string()),
            role: Role::Assistant,
            content: "hello".to_string(),
            thinking: None,
            mode: Some("chat".to_string()),
            agent_name: None,
            node_id: None,
            timestamp: Some("2024-05-01T12:30:00Z".to_string()),
        };
        let message = wire.into_message();
        assert_eq!(message.id, "m1");
        assert_eq!(message.timestamp.to_rfc3339(), "2024-05-01T12:30:00+00:00");
        assert!(message.is_complete);
    }

    #[test]
    fn history_message_invalid_timestamp_falls_back_to_now() {
        let before = Utc::now();
        let wire = HistoryMessage {
            id: None,
            role: Role::User,
            content: "hi".to_string(),
            thinking: None,
            mode: None,
            agent_name: None,
            node_id: None,
            timestamp: Some("not a date".to_string()),
        };
        let message = wire.into_message();
        assert!(message.timestamp >= before);
        assert!(!message.id.is_empty());
        assert_eq!(message.content, "hi");
    }

    #[test]
    fn role_serializes_lowercase() {
        let rendered = serde_json::to_string(&Role::Assistant).unwrap_or_default();
        assert_eq!(rendered, "\"assistant\"");
    }
}
