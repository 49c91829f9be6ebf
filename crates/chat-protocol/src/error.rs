//! Protocol error types.

use thiserror::Error;

/// Protocol error type.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("failed to parse server message: {0}")]
    MalformedFrame(String),

    #[error("frame encode failed: {0}")]
    Encode(String),
}

/// Protocol result type.
pub type Result<T> = std::result::Result<T, ProtocolError>;
