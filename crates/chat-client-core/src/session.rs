//! Session coordination: switching threads, replaying history, and the
//! default-session fallback.

use chat_protocol::{ControlFrame, DEFAULT_SESSION_ID, HistoryMessage, SessionInfo};
use tracing::{debug, info};

use crate::state::ClientState;

/// Stateless coordinator over the client state's session fields.
pub struct SessionCoordinator;

impl SessionCoordinator {
    /// Switch to a session. Clears everything scoped to the old thread
    /// (transcript, stream, pending tool decision, allow-list) before
    /// the switch so no content leaks across sessions, and returns the
    /// frame that asks the server to follow and replay history.
    pub fn set_session(state: &mut ClientState, session_id: impl Into<String>) -> ControlFrame {
        let session_id = session_id.into();
        info!(session = %session_id, "switching session");

        state.clear_transcript();
        state.pending_tool_confirmation = None;
        state.approved_tools.clear();
        state.loading_history = true;
        state.current_session_id.clone_from(&session_id);

        if !state.sessions.iter().any(|s| s.id == session_id) {
            state.sessions.push(SessionInfo {
                id: session_id.clone(),
                title: String::new(),
                created_at: None,
                updated_at: None,
                message_count: 0,
            });
        }

        ControlFrame::SetSession { session_id }
    }

    /// Remove a session from the local list. Removing the active
    /// session falls back to the default session; the returned frame,
    /// when present, must be sent to keep the server in step.
    pub fn remove_session(state: &mut ClientState, session_id: &str) -> Option<ControlFrame> {
        state.sessions.retain(|s| s.id != session_id);
        if state.current_session_id == session_id {
            return Some(Self::set_session(state, DEFAULT_SESSION_ID));
        }
        None
    }

    /// Replace the transcript with replayed history. Every replayed
    /// message arrives complete; replay ends the loading phase.
    pub fn apply_history(state: &mut ClientState, messages: Vec<HistoryMessage>) {
        debug!(count = messages.len(), "replacing transcript from history");
        state.messages = messages
            .into_iter()
            .map(HistoryMessage::into_message)
            .collect();
        state.streaming_buffer.clear();
        state.loading_history = false;
    }

    /// The server confirmed (or initiated) a session change.
    pub fn session_changed(state: &mut ClientState, session_id: Option<String>) {
        if let Some(session_id) = session_id {
            if state.current_session_id != session_id {
                debug!(session = %session_id, "server moved the active session");
                state.current_session_id = session_id;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_protocol::{ChatMessage, Role, ToolConfirmationRequest};
    use serde_json::Map;

    #[test]
    fn set_session_clears_thread_scoped_state() {
        let mut state = ClientState::default();
        state.push_message(ChatMessage::user("old thread"));
        state.streaming_buffer.push_str("partial");
        state.approved_tools.insert("shell".to_string());
        state.pending_tool_confirmation = Some(ToolConfirmationRequest {
            request_id: "r1".to_string(),
            tool_name: "shell".to_string(),
            tool_args: Map::new(),
            description: None,
        });

        let frame = SessionCoordinator::set_session(&mut state, "s2");

        assert_eq!(
            frame,
            ControlFrame::SetSession {
                session_id: "s2".to_string()
            }
        );
        assert!(state.messages.is_empty());
        assert!(state.streaming_buffer.is_empty());
        assert!(state.approved_tools.is_empty());
        assert!(state.pending_tool_confirmation.is_none());
        assert!(state.loading_history);
        assert_eq!(state.current_session_id, "s2");
        assert!(state.sessions.iter().any(|s| s.id == "s2"));
    }

    #[test]
    fn removing_the_active_session_falls_back_to_default() {
        let mut state = ClientState::default();
        SessionCoordinator::set_session(&mut state, "s2");

        let frame = SessionCoordinator::remove_session(&mut state, "s2");
        assert_eq!(
            frame,
            Some(ControlFrame::SetSession {
                session_id: DEFAULT_SESSION_ID.to_string()
            })
        );
        assert_eq!(state.current_session_id, DEFAULT_SESSION_ID);
        assert!(!state.sessions.iter().any(|s| s.id == "s2"));
    }

    #[test]
    fn removing_an_inactive_session_keeps_the_current_one() {
        let mut state = ClientState::default();
        SessionCoordinator::set_session(&mut state, "s2");
        SessionCoordinator::set_session(&mut state, "s3");

        let frame = SessionCoordinator::remove_session(&mut state, "s2");
        assert!(frame.is_none());
        assert_eq!(state.current_session_id, "s3");
    }

    #[test]
    fn history_replay_replaces_the_transcript() {
        let mut state = ClientState::default();
        state.push_message(ChatMessage::user("stale"));
        state.loading_history = true;

        SessionCoordinator::apply_history(
            &mut state,
            vec![
                HistoryMessage {
                    id: Some("m1".to_string()),
                    role: Role::User,
                    content: "Hi".to_string(),
                    thinking: None,
                    mode: None,
                    agent_name: None,
                    node_id: None,
                    timestamp: None,
                },
                HistoryMessage {
                    id: Some("m2".to_string()),
                    role: Role::Assistant,
                    content: "Hello".to_string(),
                    thinking: Some("greeting".to_string()),
                    mode: Some("chat".to_string()),
                    agent_name: None,
                    node_id: None,
                    timestamp: Some("2024-05-01T12:30:00Z".to_string()),
                },
            ],
        );

        assert_eq!(state.messages.len(), 2);
        assert!(state.messages.iter().all(|m| m.is_complete));
        assert_eq!(state.messages[1].thinking.as_deref(), Some("greeting"));
        assert!(!state.loading_history);
    }

    #[test]
    fn server_driven_session_change_updates_the_id() {
        let mut state = ClientState::default();
        SessionCoordinator::session_changed(&mut state, Some("s7".to_string()));
        assert_eq!(state.current_session_id, "s7");

        SessionCoordinator::session_changed(&mut state, None);
        assert_eq!(state.current_session_id, "s7");
    }
}
