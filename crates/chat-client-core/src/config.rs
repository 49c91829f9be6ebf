//! Client configuration and best-effort network hints.

use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:8100/ws";
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_millis(1_000);
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_millis(30_000);
pub const DEFAULT_FLUSH_BASE: Duration = Duration::from_millis(50);
pub const DEFAULT_FLUSH_MIN: Duration = Duration::from_millis(20);
pub const DEFAULT_FLUSH_MAX: Duration = Duration::from_millis(140);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the chat backend.
    pub endpoint: String,
    /// Base reconnect delay (doubled per attempt).
    pub reconnect_base: Duration,
    /// Ceiling for the exponential reconnect delay.
    pub reconnect_cap: Duration,
    /// Starting point for the adaptive flush delay.
    pub flush_base: Duration,
    /// Lower clamp of the flush delay window.
    pub flush_min: Duration,
    /// Upper clamp of the flush delay window.
    pub flush_max: Duration,
    /// Transport connect timeout.
    pub connect_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
            flush_base: DEFAULT_FLUSH_BASE,
            flush_min: DEFAULT_FLUSH_MIN,
            flush_max: DEFAULT_FLUSH_MAX,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Effective connection class as reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveConnectionType {
    Slow2g,
    Cellular2g,
    Cellular3g,
    Cellular4g,
}

/// Best-effort network quality hints. Entirely optional; when absent
/// only the base delay and chunk-size adjustments apply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkHints {
    pub effective_type: Option<EffectiveConnectionType>,
    pub rtt_ms: Option<u32>,
    pub save_data: bool,
}
