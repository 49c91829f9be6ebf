//! Wire protocol and transcript data model for the chat client engine.
//!
//! This crate intentionally exposes a small surface:
//! - inbound server frames, discriminated by `type`, validated at the
//!   parse boundary
//! - outbound client frames (user turns and control frames)
//! - the transcript/session data model shared with UI collaborators

pub mod error;
pub mod frames;
pub mod model;

pub use error::{ProtocolError, Result};
pub use frames::{
    ActivityPayload, ClientFrame, ControlFrame, ServerFrame, UserTurn, encode_client_frame,
    parse_server_frame,
};
pub use model::{
    ActivityEntry, ActivityStatus, ChatMessage, DEFAULT_SESSION_ID, HistoryMessage, Role,
    SessionInfo, THINKING_NODE_ID, ToolConfirmationRequest,
};
