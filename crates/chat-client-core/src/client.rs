//! Client engine and its public handle.
//!
//! All connection, stream and session state is owned by one engine
//! task. [`ChatClient`] is a cheap cloneable handle that feeds the
//! engine commands over a channel and reads state through snapshots,
//! so callers never race the engine. The engine multiplexes four
//! sources: commands, transport events, the debounced flush deadline,
//! and the reconnect deadline.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chat_protocol::{ChatMessage, ClientFrame, ControlFrame, UserTurn, encode_client_frame};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::BackendGateway;
use crate::backoff::jittered_reconnect_delay;
use crate::config::{ClientConfig, NetworkHints};
use crate::error::{ClientError, Result};
use crate::router::MessageRouter;
use crate::session::SessionCoordinator;
use crate::state::{ClientState, ConnectionStatus};
use crate::tools::ToolConfirmationBroker;
use crate::transport::{AUTH_CLOSE_CODE, Transport, TransportEvent, TransportFactory, WsConnector};

/// One user turn to send, with per-turn options.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub message: String,
    pub mode: String,
    pub attachments: Vec<Value>,
    pub skip_web_search: bool,
    pub thinking_mode: bool,
}

impl OutgoingMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            mode: "chat".to_string(),
            attachments: Vec::new(),
            skip_web_search: false,
            thinking_mode: false,
        }
    }
}

enum Command {
    Connect,
    Disconnect,
    SendMessage(OutgoingMessage),
    StopGeneration,
    RequestStats,
    SetSession(String),
    RemoveSession(String),
    ResolveToolConfirmation {
        request_id: String,
        approved: bool,
        remember: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    ApproveToolForSession(String),
    UpdateNetworkHints(NetworkHints),
    ClearError,
    Shutdown,
}

enum InternalEvent {
    TokenRefreshed(Option<String>),
    ConnectFinished {
        epoch: u64,
        token: Option<String>,
        result: Result<(Box<dyn Transport>, mpsc::UnboundedReceiver<TransportEvent>)>,
    },
}

/// Handle to a running client engine.
#[derive(Clone)]
pub struct ChatClient {
    commands: mpsc::UnboundedSender<Command>,
    state: Arc<Mutex<ClientState>>,
}

impl ChatClient {
    /// Spawn an engine with an explicit transport factory. Must be
    /// called from within a tokio runtime.
    pub fn spawn(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
        gateway: Arc<dyn BackendGateway>,
    ) -> Self {
        let state = Arc::new(Mutex::new(ClientState::default()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let engine = Engine {
            router: MessageRouter::new(&config),
            config,
            factory,
            gateway,
            state: Arc::clone(&state),
            commands: command_rx,
            internal_tx,
            internal_rx,
            transport: None,
            events: None,
            should_reconnect: false,
            connecting: false,
            connect_epoch: 0,
            cached_token: None,
            reconnect_at: None,
        };
        tokio::spawn(engine.run());

        Self {
            commands: command_tx,
            state,
        }
    }

    /// Spawn an engine over the production WebSocket transport.
    pub fn with_websocket(config: ClientConfig, gateway: Arc<dyn BackendGateway>) -> Self {
        let connector = Arc::new(WsConnector::new(config.connect_timeout));
        Self::spawn(config, connector, gateway)
    }

    /// A point-in-time copy of the observable client state.
    pub fn snapshot(&self) -> ClientState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start connecting, and keep the channel alive with reconnects
    /// until [`disconnect`](Self::disconnect). Idempotent.
    pub fn connect(&self) -> Result<()> {
        self.send(Command::Connect)
    }

    /// Tear the channel down and stop reconnecting.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    pub fn send_message(&self, message: OutgoingMessage) -> Result<()> {
        self.send(Command::SendMessage(message))
    }

    /// Ask the backend to halt the in-flight generation.
    pub fn stop_generation(&self) -> Result<()> {
        self.send(Command::StopGeneration)
    }

    /// Request backend stats; the reply lands in the state snapshot.
    pub fn request_stats(&self) -> Result<()> {
        self.send(Command::RequestStats)
    }

    pub fn set_session(&self, session_id: impl Into<String>) -> Result<()> {
        self.send(Command::SetSession(session_id.into()))
    }

    pub fn remove_session(&self, session_id: impl Into<String>) -> Result<()> {
        self.send(Command::RemoveSession(session_id.into()))
    }

    /// Decide the pending tool confirmation. `remember` puts an
    /// approved tool on the session allow-list. Fails with
    /// [`ClientError::StaleConfirmation`] when `request_id` no longer
    /// names the pending request.
    pub async fn resolve_tool_confirmation(
        &self,
        request_id: impl Into<String>,
        approved: bool,
        remember: bool,
    ) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(Command::ResolveToolConfirmation {
            request_id: request_id.into(),
            approved,
            remember,
            reply,
        })?;
        response.await.map_err(|_| ClientError::EngineGone)?
    }

    pub fn approve_tool_for_session(&self, tool_name: impl Into<String>) -> Result<()> {
        self.send(Command::ApproveToolForSession(tool_name.into()))
    }

    pub fn update_network_hints(&self, hints: NetworkHints) -> Result<()> {
        self.send(Command::UpdateNetworkHints(hints))
    }

    pub fn clear_error(&self) -> Result<()> {
        self.send(Command::ClearError)
    }

    /// Stop the engine task. The handle is unusable afterwards.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::EngineGone)
    }
}

struct Engine {
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    gateway: Arc<dyn BackendGateway>,
    state: Arc<Mutex<ClientState>>,
    commands: mpsc::UnboundedReceiver<Command>,
    internal_tx: mpsc::UnboundedSender<InternalEvent>,
    internal_rx: mpsc::UnboundedReceiver<InternalEvent>,
    router: MessageRouter,
    transport: Option<Box<dyn Transport>>,
    events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    /// Reconnect-forever gate: set by connect, cleared by disconnect.
    should_reconnect: bool,
    /// A connect attempt is in flight on a side task.
    connecting: bool,
    /// Liveness stamp for connect attempts. A result carrying an older
    /// epoch, or arriving after disconnect, is discarded.
    connect_epoch: u64,
    cached_token: Option<String>,
    reconnect_at: Option<Instant>,
}

impl Engine {
    async fn run(mut self) {
        loop {
            if self.should_reconnect
                && !self.connecting
                && self.transport.is_none()
                && self.reconnect_at.is_none()
            {
                self.start_connect();
            }

            tokio::select! {
                command = self.commands.recv() => {
                    let Some(command) = command else { break };
                    if self.handle_command(command).await {
                        break;
                    }
                }
                event = next_transport_event(&mut self.events) => {
                    self.handle_transport_event(event).await;
                }
                event = self.internal_rx.recv() => {
                    if let Some(event) = event {
                        self.handle_internal_event(event).await;
                    }
                }
                () = sleep_until_opt(self.router.flush_deadline()) => {
                    let mut state = lock_state(&self.state);
                    self.router.flush(&mut state);
                }
                () = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                }
            }
        }

        if let Some(transport) = self.transport.as_mut() {
            transport.close().await;
        }
        debug!("client engine stopped");
    }

    /// Kick off a connect attempt on a side task so the engine keeps
    /// processing commands while the backend-ready wait, token fetch
    /// and handshake are pending. The result comes back as an internal
    /// event stamped with the current epoch.
    fn start_connect(&mut self) {
        self.connecting = true;
        self.connect_epoch = self.connect_epoch.wrapping_add(1);
        let epoch = self.connect_epoch;
        {
            let mut state = lock_state(&self.state);
            state.connection_status = ConnectionStatus::Connecting;
        }

        let gateway = Arc::clone(&self.gateway);
        let factory = Arc::clone(&self.factory);
        let endpoint = self.config.endpoint.clone();
        let cached_token = self.cached_token.clone();
        let internal_tx = self.internal_tx.clone();
        tokio::spawn(async move {
            gateway.wait_ready().await;
            let token = match cached_token {
                Some(token) => Some(token),
                None => gateway.token().await.filter(|token| !token.is_empty()),
            };
            let result = factory.open(&endpoint, token.as_deref()).await;
            let _ = internal_tx.send(InternalEvent::ConnectFinished {
                epoch,
                token,
                result,
            });
        });
    }

    fn schedule_reconnect(&mut self) {
        if !self.should_reconnect {
            return;
        }
        let attempts = {
            let mut state = lock_state(&self.state);
            let attempts = state.reconnect_attempts;
            state.reconnect_attempts = attempts.saturating_add(1);
            attempts
        };
        let delay = jittered_reconnect_delay(
            attempts,
            self.config.reconnect_base,
            self.config.reconnect_cap,
        );
        info!(attempt = attempts + 1, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        self.reconnect_at = Some(Instant::now() + delay);
    }

    async fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                info!("channel open");
                let session_id = {
                    let mut state = lock_state(&self.state);
                    state.connection_status = ConnectionStatus::Open;
                    state.reconnect_attempts = 0;
                    state.error = None;
                    state.loading_history = true;
                    state.current_session_id.clone()
                };
                // Ask the server to replay the active session's history.
                self.send_frame(ControlFrame::SetSession { session_id }.into())
                    .await;
            }
            TransportEvent::Frame(text) => {
                let outbound = {
                    let mut state = lock_state(&self.state);
                    self.router.handle_raw(&mut state, &text, Instant::now())
                };
                for frame in outbound {
                    self.send_frame(frame.into()).await;
                }
            }
            TransportEvent::TransportError(message) => {
                warn!("transport error: {}", message);
            }
            TransportEvent::Closed { code } => {
                info!(code = ?code, "channel closed");
                self.transport = None;
                self.events = None;
                {
                    let mut state = lock_state(&self.state);
                    // Keep any partial text; the stream will not resume.
                    self.router.flush(&mut state);
                    state.complete_active_message();
                    state.is_processing = false;
                    state.loading_history = false;
                    state.connection_status = ConnectionStatus::Disconnected;
                }
                self.router.reset_stream();

                if code == Some(AUTH_CLOSE_CODE) {
                    self.cached_token = None;
                    let gateway = Arc::clone(&self.gateway);
                    let internal_tx = self.internal_tx.clone();
                    tokio::spawn(async move {
                        let token = gateway.refresh_token().await;
                        let _ = internal_tx.send(InternalEvent::TokenRefreshed(token));
                    });
                }
                self.schedule_reconnect();
            }
        }
    }

    async fn handle_internal_event(&mut self, event: InternalEvent) {
        match event {
            InternalEvent::TokenRefreshed(token) => {
                if let Some(token) = token.filter(|token| !token.is_empty()) {
                    debug!("auth token refreshed");
                    self.cached_token = Some(token);
                    // Retry immediately instead of waiting out the backoff.
                    if self.should_reconnect && self.transport.is_none() {
                        self.reconnect_at = None;
                    }
                }
            }
            InternalEvent::ConnectFinished {
                epoch,
                token,
                result,
            } => {
                if epoch != self.connect_epoch || !self.should_reconnect {
                    debug!("discarding stale connect attempt");
                    if let Ok((mut transport, _events)) = result {
                        transport.close().await;
                    }
                    return;
                }
                self.connecting = false;
                match result {
                    Ok((transport, events)) => {
                        self.cached_token = token;
                        self.transport = Some(transport);
                        self.events = Some(events);
                    }
                    Err(error) => {
                        warn!("connection attempt failed: {}", error);
                        {
                            let mut state = lock_state(&self.state);
                            state.connection_status = ConnectionStatus::Disconnected;
                        }
                        self.schedule_reconnect();
                    }
                }
            }
        }
    }

    /// Returns true when the engine should stop.
    async fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Connect => {
                self.should_reconnect = true;
            }
            Command::Disconnect => {
                self.should_reconnect = false;
                // Detach any in-flight connect attempt; its late result
                // is discarded by the epoch check.
                self.connecting = false;
                self.reconnect_at = None;
                if let Some(transport) = self.transport.as_mut() {
                    transport.close().await;
                }
                self.transport = None;
                self.events = None;
                self.router.reset_stream();
                let mut state = lock_state(&self.state);
                state.connection_status = ConnectionStatus::Disconnected;
                state.reconnect_attempts = 0;
                state.is_processing = false;
            }
            Command::SendMessage(outgoing) => {
                if self.transport.is_none() {
                    let mut state = lock_state(&self.state);
                    state.error = Some("not connected".to_string());
                    return false;
                }
                let turn = {
                    let mut state = lock_state(&self.state);
                    state.push_message(ChatMessage::user(outgoing.message.clone()));
                    state.is_processing = true;
                    UserTurn {
                        message: outgoing.message,
                        mode: outgoing.mode,
                        attachments: outgoing.attachments,
                        skip_web_search: outgoing.skip_web_search,
                        thinking_mode: outgoing.thinking_mode,
                        session_id: Some(state.current_session_id.clone()),
                    }
                };
                self.send_frame(turn.into()).await;
            }
            Command::StopGeneration => {
                self.send_frame(ControlFrame::Stop.into()).await;
            }
            Command::RequestStats => {
                self.send_frame(ControlFrame::GetStats.into()).await;
            }
            Command::SetSession(session_id) => {
                self.router.reset_stream();
                let frame = {
                    let mut state = lock_state(&self.state);
                    SessionCoordinator::set_session(&mut state, session_id)
                };
                if self.transport.is_some() {
                    self.send_frame(frame.into()).await;
                }
            }
            Command::RemoveSession(session_id) => {
                let frame = {
                    let mut state = lock_state(&self.state);
                    SessionCoordinator::remove_session(&mut state, &session_id)
                };
                if let Some(frame) = frame {
                    self.router.reset_stream();
                    if self.transport.is_some() {
                        self.send_frame(frame.into()).await;
                    }
                }
            }
            Command::ResolveToolConfirmation {
                request_id,
                approved,
                remember,
                reply,
            } => {
                let resolved = {
                    let mut state = lock_state(&self.state);
                    ToolConfirmationBroker::resolve(&mut state, &request_id, approved, remember)
                };
                let result = match resolved {
                    Ok(frame) => {
                        self.send_frame(frame.into()).await;
                        Ok(())
                    }
                    Err(error) => Err(error),
                };
                let _ = reply.send(result);
            }
            Command::ApproveToolForSession(tool_name) => {
                let mut state = lock_state(&self.state);
                ToolConfirmationBroker::approve_for_session(&mut state, tool_name);
            }
            Command::UpdateNetworkHints(hints) => {
                self.router.set_hints(hints);
            }
            Command::ClearError => {
                let mut state = lock_state(&self.state);
                state.error = None;
            }
            Command::Shutdown => return true,
        }
        false
    }

    async fn send_frame(&mut self, frame: ClientFrame) {
        let Some(transport) = self.transport.as_mut() else {
            debug!("dropping outbound frame, channel is down");
            return;
        };
        let text = match encode_client_frame(&frame) {
            Ok(text) => text,
            Err(error) => {
                warn!("failed to encode outbound frame: {}", error);
                return;
            }
        };
        if let Err(error) = transport.send(text).await {
            warn!("outbound send failed: {}", error);
            let mut state = lock_state(&self.state);
            state.error = Some(error.to_string());
        }
    }
}

// Free function so a live guard only borrows the state field, leaving
// the engine's other fields free.
fn lock_state(state: &Mutex<ClientState>) -> MutexGuard<'_, ClientState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn next_transport_event(
    events: &mut Option<mpsc::UnboundedReceiver<TransportEvent>>,
) -> TransportEvent {
    match events {
        Some(receiver) => match receiver.recv().await {
            Some(event) => event,
            // Reader task ended without a close frame.
            None => TransportEvent::Closed { code: None },
        },
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
