// crates/chatgate-core/src/runtime/protocol.rs
// ============================================================================
// Module: Chatgate Protocol Encoder
// Description: Ordered SSE framing of protocol events.
// Purpose: Guarantee status-first, sentinel-last event streams.
// Dependencies: crate::core, async-trait, tokio
// ============================================================================

//! ## Overview
//! [`ProtocolEncoder`] is a small state machine: the first event must be a
//! `proxy_status`; `queued` may precede `acquired`; a rejection, an error, or
//! an approval halt closes the stream to everything but the sentinel; the
//! sentinel is produced exactly once. [`StreamEmitter`] pairs the encoder
//! with the response channel.
//!
//! Frames use `event: <type>\ndata: <json>\n\n` and the stream ends with
//! `data: [DONE]\n\n`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::core::ProtocolEvent;
use crate::core::ProxyStatus;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Stream termination sentinel frame.
pub const SSE_DONE_FRAME: &str = "data: [DONE]\n\n";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Protocol emission errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The event is not allowed in the current stream state.
    #[error("event {event} not allowed while stream is {state}")]
    OutOfOrder {
        /// Rejected event type.
        event: &'static str,
        /// Encoder state label.
        state: &'static str,
    },
    /// The client went away.
    #[error("client disconnected")]
    Disconnected,
}

// ============================================================================
// SECTION: Encoder
// ============================================================================

/// Encoder state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    /// Nothing emitted yet.
    Opened,
    /// Waiting for a concurrency slot.
    Queued,
    /// Admitted; work events may flow.
    Admitted,
    /// Only the sentinel may follow.
    Closed,
    /// Sentinel emitted.
    Finished,
}

impl StreamState {
    /// Returns a stable label for error messages.
    const fn as_str(self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Queued => "queued",
            Self::Admitted => "admitted",
            Self::Closed => "closed",
            Self::Finished => "finished",
        }
    }
}

/// Ordering-enforcing SSE encoder.
#[derive(Debug)]
pub struct ProtocolEncoder {
    /// Current state.
    state: StreamState,
}

impl Default for ProtocolEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtocolEncoder {
    /// Creates an encoder for a fresh stream.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: StreamState::Opened,
        }
    }

    /// Validates `event` against the stream state and frames it.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::OutOfOrder`] when the event may not be
    /// emitted now; the state is left unchanged.
    pub fn encode(&mut self, event: &ProtocolEvent) -> Result<String, ProtocolError> {
        self.state = self.next_state(event)?;
        Ok(encode_frame(event))
    }

    /// Produces the sentinel the first time it is called.
    pub fn finish(&mut self) -> Option<&'static str> {
        if self.state == StreamState::Finished {
            return None;
        }
        self.state = StreamState::Finished;
        Some(SSE_DONE_FRAME)
    }

    /// Returns true once the sentinel was produced.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.state == StreamState::Finished
    }

    /// Computes the state after `event`.
    fn next_state(&self, event: &ProtocolEvent) -> Result<StreamState, ProtocolError> {
        let next = match (self.state, event) {
            (
                StreamState::Opened,
                ProtocolEvent::ProxyStatus {
                    status: ProxyStatus::Queued,
                    ..
                },
            ) => Some(StreamState::Queued),
            (
                StreamState::Opened | StreamState::Queued,
                ProtocolEvent::ProxyStatus {
                    status,
                    ..
                },
            ) => match status {
                ProxyStatus::Acquired => Some(StreamState::Admitted),
                ProxyStatus::Rejected | ProxyStatus::RateLimited => Some(StreamState::Closed),
                ProxyStatus::Queued => None,
            },
            (
                StreamState::Admitted,
                ProtocolEvent::ToolStatus {
                    ..
                }
                | ProtocolEvent::ContentDelta(_),
            ) => Some(StreamState::Admitted),
            (
                StreamState::Admitted,
                ProtocolEvent::ToolApprovalRequired {
                    ..
                }
                | ProtocolEvent::Error {
                    ..
                },
            )
            | (
                StreamState::Opened | StreamState::Queued,
                ProtocolEvent::Error {
                    ..
                },
            ) => Some(StreamState::Closed),
            _ => None,
        };
        next.ok_or(ProtocolError::OutOfOrder {
            event: event.event_type(),
            state: self.state.as_str(),
        })
    }
}

/// Frames one event.
#[must_use]
pub fn encode_frame(event: &ProtocolEvent) -> String {
    format!("event: {}\ndata: {}\n\n", event.event_type(), event.data())
}

// ============================================================================
// SECTION: Event Sinks
// ============================================================================

/// Destination for protocol events produced while serving a request.
#[async_trait]
pub trait EventSink: Send {
    /// Emits one event.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the event is out of order or the
    /// client is gone.
    async fn emit(&mut self, event: ProtocolEvent) -> Result<(), ProtocolError>;
}

/// Sink for aggregated responses; events are dropped.
pub struct DiscardEvents;

#[async_trait]
impl EventSink for DiscardEvents {
    async fn emit(&mut self, _event: ProtocolEvent) -> Result<(), ProtocolError> {
        Ok(())
    }
}

/// Streams encoded frames into the response channel.
pub struct StreamEmitter {
    /// Ordering state.
    encoder: ProtocolEncoder,
    /// Response body channel.
    frames: mpsc::Sender<String>,
}

impl StreamEmitter {
    /// Creates an emitter writing to `frames`.
    #[must_use]
    pub const fn new(frames: mpsc::Sender<String>) -> Self {
        Self {
            encoder: ProtocolEncoder::new(),
            frames,
        }
    }

    /// Sends the sentinel if it has not been sent. Safe to call repeatedly.
    pub async fn finish(&mut self) {
        if let Some(frame) = self.encoder.finish() {
            let _ = self.frames.send(frame.to_string()).await;
        }
    }
}

#[async_trait]
impl EventSink for StreamEmitter {
    async fn emit(&mut self, event: ProtocolEvent) -> Result<(), ProtocolError> {
        let frame = self.encoder.encode(&event)?;
        self.frames.send(frame).await.map_err(|_| ProtocolError::Disconnected)
    }
}

/// In-memory sink that validates ordering and keeps every event.
#[derive(Debug, Default)]
pub struct EventLog {
    /// Ordering state.
    encoder: ProtocolEncoder,
    /// Accepted events.
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Returns the accepted events.
    #[must_use]
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Returns the event types in order.
    #[must_use]
    pub fn event_types(&self) -> Vec<&'static str> {
        self.events.iter().map(ProtocolEvent::event_type).collect()
    }
}

#[async_trait]
impl EventSink for EventLog {
    async fn emit(&mut self, event: ProtocolEvent) -> Result<(), ProtocolError> {
        self.encoder.encode(&event)?;
        self.events.push(event);
        Ok(())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
