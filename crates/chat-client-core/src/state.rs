//! Process-wide client state container.
//!
//! One `ClientState` exists per client process. It is mutated only by
//! the engine task and read by UI collaborators through snapshots, so
//! every mutation here is a self-contained synchronous action.

use std::collections::HashSet;

use chat_protocol::{
    ActivityEntry, ActivityStatus, ChatMessage, DEFAULT_SESSION_ID, Role, SessionInfo,
    ToolConfirmationRequest,
};
use serde_json::Value;

/// Connection lifecycle status surfaced to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Open,
}

/// Everything a UI collaborator can observe about the client.
#[derive(Debug, Clone)]
pub struct ClientState {
    pub connection_status: ConnectionStatus,
    pub reconnect_attempts: u32,
    pub messages: Vec<ChatMessage>,
    /// Buffered stream text not yet applied to the transcript.
    pub streaming_buffer: String,
    pub pending_tool_confirmation: Option<ToolConfirmationRequest>,
    /// Tools the user approved for the rest of this session. Scoped to
    /// the active session: switching sessions clears the list (and any
    /// pending confirmation) along with the transcript. Never
    /// persisted.
    pub approved_tools: HashSet<String>,
    pub activity_log: Vec<ActivityEntry>,
    pub search_results: Vec<Value>,
    pub memory_stats: Option<Value>,
    pub download_progress: Option<Value>,
    pub current_session_id: String,
    pub sessions: Vec<SessionInfo>,
    pub loading_history: bool,
    pub is_processing: bool,
    pub error: Option<String>,
}

impl Default for ClientState {
    fn default() -> Self {
        Self {
            connection_status: ConnectionStatus::Disconnected,
            reconnect_attempts: 0,
            messages: Vec::new(),
            streaming_buffer: String::new(),
            pending_tool_confirmation: None,
            approved_tools: HashSet::new(),
            activity_log: Vec::new(),
            search_results: Vec::new(),
            memory_stats: None,
            download_progress: None,
            current_session_id: DEFAULT_SESSION_ID.to_string(),
            sessions: Vec::new(),
            loading_history: false,
            is_processing: false,
            error: None,
        }
    }
}

impl ClientState {
    pub fn is_connected(&self) -> bool {
        self.connection_status == ConnectionStatus::Open
    }

    /// The active streaming message, if any. The transcript holds at
    /// most one incomplete message at a time.
    pub fn active_message_mut(&mut self) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().rev().find(|m| !m.is_complete)
    }

    /// The active streaming message only when it is an assistant turn.
    pub fn active_assistant_mut(&mut self) -> Option<&mut ChatMessage> {
        self.active_message_mut()
            .filter(|m| m.role == Role::Assistant)
    }

    /// Mark the active streaming message complete, if one exists.
    pub fn complete_active_message(&mut self) {
        if let Some(active) = self.active_message_mut() {
            active.is_complete = true;
        }
    }

    pub fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Replace or append an activity row keyed by agent name. A
    /// replacement keeps the original step ordinal; a new agent gets
    /// the next ordinal.
    pub fn upsert_activity(
        &mut self,
        agent_name: &str,
        status: ActivityStatus,
        details: String,
        step_hint: Option<usize>,
    ) {
        if let Some(existing) = self
            .activity_log
            .iter_mut()
            .find(|entry| entry.agent_name == agent_name)
        {
            existing.status = status;
            existing.details = details;
            return;
        }
        let step = step_hint.unwrap_or_else(|| {
            self.activity_log
                .iter()
                .map(|entry| entry.step)
                .max()
                .unwrap_or(0)
                + 1
        });
        self.activity_log.push(ActivityEntry {
            agent_name: agent_name.to_string(),
            status,
            details,
            step,
        });
    }

    /// Clear the transcript and per-stream state ahead of a session
    /// switch, so no content leaks across sessions.
    pub fn clear_transcript(&mut self) {
        self.messages.clear();
        self.streaming_buffer.clear();
        self.activity_log.clear();
        self.search_results.clear();
        self.is_processing = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_replacement_preserves_step_ordinal() {
        let mut state = ClientState::default();
        state.upsert_activity("planner", ActivityStatus::Pending, "queued".to_string(), None);
        state.upsert_activity(
            "researcher",
            ActivityStatus::Pending,
            "queued".to_string(),
            None,
        );
        state.upsert_activity(
            "planner",
            ActivityStatus::Completed,
            "done".to_string(),
            None,
        );

        assert_eq!(state.activity_log.len(), 2);
        assert_eq!(state.activity_log[0].agent_name, "planner");
        assert_eq!(state.activity_log[0].status, ActivityStatus::Completed);
        assert_eq!(state.activity_log[0].details, "done");
        assert_eq!(state.activity_log[0].step, 1);
        assert_eq!(state.activity_log[1].step, 2);
    }

    #[test]
    fn at_most_one_active_message() {
        let mut state = ClientState::default();
        state.push_message(ChatMessage::user("hi"));
        state.push_message(ChatMessage::streaming_assistant());
        assert!(state.active_message_mut().is_some());

        state.complete_active_message();
        assert!(state.active_message_mut().is_none());
        assert!(state.messages.iter().all(|m| m.is_complete));
    }

    #[test]
    fn active_assistant_ignores_user_messages() {
        let mut state = ClientState::default();
        let mut open_user = ChatMessage::user("typing");
        open_user.is_complete = false;
        state.push_message(open_user);
        assert!(state.active_assistant_mut().is_none());
        assert!(state.active_message_mut().is_some());
    }

    #[test]
    fn clear_transcript_resets_stream_state() {
        let mut state = ClientState::default();
        state.push_message(ChatMessage::user("hi"));
        state.streaming_buffer.push_str("partial");
        state.is_processing = true;
        state.upsert_activity("a", ActivityStatus::Processing, String::new(), None);

        state.clear_transcript();
        assert!(state.messages.is_empty());
        assert!(state.streaming_buffer.is_empty());
        assert!(state.activity_log.is_empty());
        assert!(!state.is_processing);
    }
}
