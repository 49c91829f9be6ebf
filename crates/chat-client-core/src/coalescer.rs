//! Stream coalescing: batches token chunks into transcript messages.
//!
//! The backend emits response text as many small frames. Rendering on
//! every frame causes churn; waiting too long hurts perceived latency.
//! The coalescer debounces chunks per pipeline node behind a single
//! re-armable deadline, sized by network and payload hints, and folds
//! the two-phase thinking/answer response into one message with two
//! text channels. Buffered text is never dropped: when stream state
//! desynchronizes, a new message is created rather than losing content.

use std::time::Duration;

use chat_protocol::{ChatMessage, THINKING_NODE_ID};
use tokio::time::Instant;

use crate::config::{ClientConfig, EffectiveConnectionType, NetworkHints};
use crate::state::ClientState;

/// Per-chunk routing metadata from the backend pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub mode: Option<String>,
    pub agent_name: Option<String>,
    pub node_id: Option<String>,
}

fn is_thinking(node_id: Option<&str>) -> bool {
    node_id == Some(THINKING_NODE_ID)
}

/// Debounced stream buffer for the active response.
#[derive(Debug)]
pub struct StreamCoalescer {
    buffer: String,
    metadata: Option<ChunkMetadata>,
    deadline: Option<Instant>,
    hints: NetworkHints,
    flush_base: Duration,
    flush_min: Duration,
    flush_max: Duration,
}

impl StreamCoalescer {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            buffer: String::new(),
            metadata: None,
            deadline: None,
            hints: NetworkHints::default(),
            flush_base: config.flush_base,
            flush_min: config.flush_min,
            flush_max: config.flush_max,
        }
    }

    /// The pending flush deadline, if a chunk is buffered.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn set_hints(&mut self, hints: NetworkHints) {
        self.hints = hints;
    }

    /// Buffer one inbound chunk and (re)arm the flush deadline.
    pub fn handle_chunk(
        &mut self,
        state: &mut ClientState,
        content: &str,
        metadata: ChunkMetadata,
        now: Instant,
    ) {
        let transition = self
            .metadata
            .as_ref()
            .is_some_and(|current| current.node_id != metadata.node_id);

        if transition {
            let outgoing = self.metadata.as_ref().and_then(|m| m.node_id.clone());
            // Drain the old node's text first so nothing merges across
            // the boundary.
            self.flush(state);

            let crosses_thinking =
                is_thinking(outgoing.as_deref()) || is_thinking(metadata.node_id.as_deref());
            let continues = crosses_thinking && state.active_assistant_mut().is_some();
            if !continues {
                state.complete_active_message();
                let mut next = ChatMessage::streaming_assistant();
                next.mode = metadata.mode.clone();
                next.agent_name = metadata.agent_name.clone();
                next.node_id = metadata.node_id.clone();
                if is_thinking(metadata.node_id.as_deref()) {
                    next.thinking = Some(String::new());
                }
                state.push_message(next);
            }
        }

        self.buffer.push_str(content);
        self.metadata = Some(metadata);
        state.streaming_buffer.clone_from(&self.buffer);

        let delay = self.flush_delay(content.len());
        self.deadline = Some(now + delay);
    }

    /// Drain the whole buffer into the transcript's active message.
    /// Metadata is retained so the next chunk for the same node keeps
    /// targeting the same message.
    pub fn flush(&mut self, state: &mut ClientState) {
        if self.buffer.is_empty() && self.metadata.is_none() {
            return;
        }
        self.deadline = None;

        if !self.buffer.is_empty() {
            let metadata = self.metadata.clone().unwrap_or_default();
            let thinking = is_thinking(metadata.node_id.as_deref());
            if let Some(active) = state.active_assistant_mut() {
                if thinking {
                    active
                        .thinking
                        .get_or_insert_with(String::new)
                        .push_str(&self.buffer);
                } else {
                    active.content.push_str(&self.buffer);
                }
                active.mode = metadata.mode;
                active.agent_name = metadata.agent_name;
                active.node_id = metadata.node_id;
            } else {
                // Stream state desynchronized: never drop text.
                let mut message = ChatMessage::streaming_assistant();
                if thinking {
                    message.thinking = Some(self.buffer.clone());
                } else {
                    message.content = self.buffer.clone();
                }
                message.mode = metadata.mode;
                message.agent_name = metadata.agent_name;
                message.node_id = metadata.node_id;
                state.push_message(message);
            }
            self.buffer.clear();
        }
        state.streaming_buffer.clear();
    }

    /// Close out the stream: any unflushed tail goes to `content`,
    /// the active message completes, and all streaming state clears.
    pub fn finalize(&mut self, state: &mut ClientState) {
        self.deadline = None;

        if !self.buffer.is_empty() {
            if let Some(active) = state.active_assistant_mut() {
                active.content.push_str(&self.buffer);
            } else {
                let mut message = ChatMessage::streaming_assistant();
                message.content = self.buffer.clone();
                if let Some(metadata) = &self.metadata {
                    message.mode = metadata.mode.clone();
                    message.agent_name = metadata.agent_name.clone();
                    message.node_id = metadata.node_id.clone();
                }
                state.push_message(message);
            }
            self.buffer.clear();
        }

        state.complete_active_message();
        self.metadata = None;
        state.streaming_buffer.clear();
    }

    /// Drop all buffered state without touching the transcript, for
    /// session switches.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.metadata = None;
        self.deadline = None;
    }

    /// Adaptive flush delay: base, adjusted by connection class, RTT
    /// and chunk size, clamped to the configured window.
    fn flush_delay(&self, chunk_len: usize) -> Duration {
        let min = self.flush_min.as_millis() as i64;
        let max = self.flush_max.as_millis() as i64;
        let mut delay = (self.flush_base.as_millis() as i64).clamp(min, max);

        match self.hints.effective_type {
            Some(EffectiveConnectionType::Cellular4g) => delay -= 5,
            Some(EffectiveConnectionType::Cellular3g) => delay += 15,
            Some(EffectiveConnectionType::Cellular2g) => delay += 35,
            Some(EffectiveConnectionType::Slow2g) => delay += 50,
            None => {}
        }
        if self.hints.save_data {
            delay += 20;
        }
        if let Some(rtt) = self.hints.rtt_ms {
            if rtt >= 300 {
                delay += 20;
            } else if rtt >= 180 {
                delay += 10;
            } else if rtt <= 80 {
                delay -= 5;
            }
        }
        // Batch more for chatty small frames, flush sooner for large ones.
        if chunk_len <= 12 {
            delay += 10;
        } else if chunk_len >= 160 {
            delay -= 10;
        }

        Duration::from_millis(delay.clamp(min, max) as u64)
    }
}
