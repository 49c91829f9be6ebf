//! Engine for a streaming chat client over a persistent WebSocket.
//!
//! The crate keeps one channel to the chat backend alive (reconnecting
//! with jittered exponential backoff), routes inbound frames, coalesces
//! token chunks into transcript messages with an adaptive debounce,
//! brokers dangerous-tool approvals, and coordinates session switches
//! with history replay. UI layers embed [`ChatClient`] and render
//! [`ClientState`] snapshots; the wire contract lives in
//! [`chat_protocol`].

pub mod auth;
pub mod backoff;
pub mod client;
pub mod coalescer;
pub mod config;
pub mod error;
pub mod router;
pub mod session;
pub mod state;
pub mod tools;
pub mod transport;

pub use auth::{BackendGateway, NullGateway};
pub use client::{ChatClient, OutgoingMessage};
pub use config::{ClientConfig, EffectiveConnectionType, NetworkHints};
pub use error::{ClientError, Result};
pub use state::{ClientState, ConnectionStatus};
pub use transport::{
    AUTH_CLOSE_CODE, Transport, TransportEvent, TransportFactory, WsConnector,
};

pub use chat_protocol;
