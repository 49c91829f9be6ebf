//! Dangerous-tool approval broker.
//!
//! The backend pauses before running a dangerous tool and asks for a
//! decision. At most one request is pending at a time; a tool the user
//! approved "for this session" is auto-approved silently without
//! surfacing a prompt again. Approvals never outlive the session.

use chat_protocol::{ControlFrame, ToolConfirmationRequest};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};
use crate::state::ClientState;

/// Stateless broker over the client state's pending-request slot and
/// session allow-list.
pub struct ToolConfirmationBroker;

impl ToolConfirmationBroker {
    /// Handle an inbound approval request. Returns the auto-approval
    /// response to send when the tool is already on the session
    /// allow-list; otherwise parks the request for a user decision.
    pub fn handle_request(
        state: &mut ClientState,
        request: ToolConfirmationRequest,
    ) -> Option<ControlFrame> {
        if state.approved_tools.contains(&request.tool_name) {
            debug!(
                tool = %request.tool_name,
                request_id = %request.request_id,
                "auto-approving session-approved tool"
            );
            return Some(ControlFrame::ToolConfirmationResponse {
                request_id: request.request_id,
                approved: true,
            });
        }

        if let Some(previous) = state.pending_tool_confirmation.replace(request) {
            warn!(
                request_id = %previous.request_id,
                "new tool confirmation superseded an undecided request"
            );
        }
        None
    }

    /// Apply the user's decision. The decision must name the request
    /// that is actually pending; anything else is stale and rejected so
    /// a late click can never approve a different tool.
    pub fn resolve(
        state: &mut ClientState,
        request_id: &str,
        approved: bool,
        remember: bool,
    ) -> Result<ControlFrame> {
        let matches = state
            .pending_tool_confirmation
            .as_ref()
            .is_some_and(|pending| pending.request_id == request_id);
        if !matches {
            return Err(ClientError::StaleConfirmation(request_id.to_string()));
        }

        let pending = state
            .pending_tool_confirmation
            .take()
            .ok_or_else(|| ClientError::StaleConfirmation(request_id.to_string()))?;

        if approved && remember {
            state.approved_tools.insert(pending.tool_name);
        }

        Ok(ControlFrame::ToolConfirmationResponse {
            request_id: pending.request_id,
            approved,
        })
    }

    /// Put a tool on the session allow-list directly, without a pending
    /// request.
    pub fn approve_for_session(state: &mut ClientState, tool_name: impl Into<String>) {
        state.approved_tools.insert(tool_name.into());
    }
}
