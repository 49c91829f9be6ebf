//! Backend collaborator interface: readiness signal and auth tokens.

use async_trait::async_trait;

/// External collaborator supplying the backend-ready signal and auth
/// tokens. Implementations live outside this crate (desktop shell,
/// tests); the engine only consumes the contract.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    /// Resolves once the backend is reachable. Defaults to immediately
    /// ready.
    async fn wait_ready(&self) {}

    /// Current auth token, if the deployment requires one. The engine
    /// caches the first non-empty result.
    async fn token(&self) -> Option<String> {
        None
    }

    /// Obtain a fresh token after an auth failure.
    async fn refresh_token(&self) -> Option<String> {
        None
    }
}

/// Tokenless gateway that is always ready.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullGateway;

#[async_trait]
impl BackendGateway for NullGateway {}
