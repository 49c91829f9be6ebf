//! Inbound frame routing.
//!
//! One router per engine. Frames are dispatched synchronously in
//! arrival order; each handler is a self-contained state mutation, and
//! any outbound frames a handler produces (tool auto-approvals) are
//! returned to the engine for sending. A malformed frame is logged and
//! skipped, never fatal.

use chat_protocol::{ChatMessage, ControlFrame, ServerFrame, parse_server_frame};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::coalescer::{ChunkMetadata, StreamCoalescer};
use crate::config::{ClientConfig, NetworkHints};
use crate::session::SessionCoordinator;
use crate::state::ClientState;
use crate::tools::ToolConfirmationBroker;

pub struct MessageRouter {
    coalescer: StreamCoalescer,
}

impl MessageRouter {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            coalescer: StreamCoalescer::new(config),
        }
    }

    pub fn set_hints(&mut self, hints: NetworkHints) {
        self.coalescer.set_hints(hints);
    }

    /// Deadline of the pending debounced flush, if text is buffered.
    pub fn flush_deadline(&self) -> Option<Instant> {
        self.coalescer.deadline()
    }

    /// Timer-driven flush of buffered stream text.
    pub fn flush(&mut self, state: &mut ClientState) {
        self.coalescer.flush(state);
    }

    /// Drop buffered stream state without touching the transcript, for
    /// session switches and disconnects.
    pub fn reset_stream(&mut self) {
        self.coalescer.clear();
    }

    /// Parse and dispatch one raw inbound frame. Returns any outbound
    /// frames the dispatch produced.
    pub fn handle_raw(
        &mut self,
        state: &mut ClientState,
        text: &str,
        now: Instant,
    ) -> Vec<ControlFrame> {
        match parse_server_frame(text) {
            Ok(frame) => self.handle_frame(state, frame, now),
            Err(error) => {
                warn!("dropping malformed server frame: {}", error);
                state.error = Some(error.to_string());
                Vec::new()
            }
        }
    }

    pub fn handle_frame(
        &mut self,
        state: &mut ClientState,
        frame: ServerFrame,
        now: Instant,
    ) -> Vec<ControlFrame> {
        let mut outbound = Vec::new();
        match frame {
            ServerFrame::Chunk {
                message,
                mode,
                agent_name,
                node_id,
            } => {
                state.is_processing = true;
                self.coalescer.handle_chunk(
                    state,
                    &message,
                    ChunkMetadata {
                        mode,
                        agent_name,
                        node_id,
                    },
                    now,
                );
            }
            ServerFrame::Done => {
                self.coalescer.finalize(state);
                state.is_processing = false;
            }
            ServerFrame::Stopped => {
                // Partial text stays in the transcript.
                self.coalescer.finalize(state);
                state.is_processing = false;
            }
            ServerFrame::Error { message } => {
                self.coalescer.finalize(state);
                state.is_processing = false;
                state.push_message(ChatMessage::system(message.clone()));
                state.error = Some(message);
            }
            ServerFrame::Stats { data } => {
                state.memory_stats = Some(data);
            }
            ServerFrame::SearchResults { data } => {
                state.search_results = data;
            }
            ServerFrame::Activity { data } => {
                state.upsert_activity(&data.id, data.status, data.message, data.step);
            }
            ServerFrame::ToolConfirmationRequest { data } => {
                if let Some(response) = ToolConfirmationBroker::handle_request(state, data) {
                    outbound.push(response);
                }
            }
            ServerFrame::History { messages } => {
                self.coalescer.clear();
                SessionCoordinator::apply_history(state, messages);
            }
            ServerFrame::SessionChanged { session_id } => {
                SessionCoordinator::session_changed(state, session_id);
            }
            ServerFrame::DownloadProgress { data } => {
                state.download_progress = Some(data);
            }
            ServerFrame::Status => {}
            ServerFrame::Unknown => {
                debug!("ignoring unrecognized server frame");
            }
        }
        outbound
    }
}
