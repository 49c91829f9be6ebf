//! Client error types.

use thiserror::Error;

/// Client error type.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] chat_protocol::ProtocolError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timeout error: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("no pending tool confirmation matches request {0}")]
    StaleConfirmation(String),

    #[error("client engine is gone")]
    EngineGone,
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;
