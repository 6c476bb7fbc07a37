// crates/chatgate-core/src/core/events.rs
// ============================================================================
// Module: Chatgate Events
// Description: Client-facing protocol events and audit records.
// Purpose: Name every status transition the proxy reports.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! [`ProtocolEvent`] values narrate a request to the client: admission
//! status, tool progress, approval halts, and relayed upstream content.
//! [`AuditEvent`] values record security-relevant decisions for operators.
//! Both are plain data; ordering is enforced by the protocol encoder.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::identifiers::ToolCallId;
use crate::core::identifiers::TraceId;
use crate::core::tooling::ToolCall;

// ============================================================================
// SECTION: Protocol Events
// ============================================================================

/// Admission status reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStatus {
    /// A concurrency slot is held; work begins.
    Acquired,
    /// Waiting for a concurrency slot.
    Queued,
    /// No slot became free in time.
    Rejected,
    /// The trace exceeded its request rate.
    RateLimited,
}

impl ProxyStatus {
    /// Returns the wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::Queued => "queued",
            Self::Rejected => "rejected",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Returns true for statuses that end the request.
    #[must_use]
    pub const fn is_rejection(self) -> bool {
        matches!(self, Self::Rejected | Self::RateLimited)
    }
}

/// Progress of one tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolPhase {
    /// Invocation started.
    Start,
    /// Invocation returned a successful result.
    Complete,
    /// Invocation failed; a failure result was fed back to the model.
    Failed,
}

/// Event emitted on the client channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Admission status.
    ProxyStatus {
        /// Status label.
        status: ProxyStatus,
        /// Trace the request belongs to.
        trace_id: TraceId,
    },
    /// Tool invocation progress.
    ToolStatus {
        /// Call being executed.
        call_id: ToolCallId,
        /// Tool name.
        name: String,
        /// Invocation phase.
        phase: ToolPhase,
    },
    /// A tool call needs an external decision; the stream halts.
    ToolApprovalRequired {
        /// Call awaiting approval.
        call: ToolCall,
        /// Trace the request belongs to.
        trace_id: TraceId,
    },
    /// Upstream chunk relayed verbatim.
    ContentDelta(Value),
    /// Fatal failure after admission.
    Error {
        /// Failure kind (`upstream_error`, `internal_error`, ...).
        kind: String,
        /// Human-readable description.
        message: String,
    },
}

impl ProtocolEvent {
    /// Returns the SSE event type.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::ProxyStatus {
                ..
            } => "proxy_status",
            Self::ToolStatus {
                ..
            } => "tool_status",
            Self::ToolApprovalRequired {
                ..
            } => "tool_approval_required",
            Self::ContentDelta(_) => "content_delta",
            Self::Error {
                ..
            } => "error",
        }
    }

    /// Returns the SSE data payload.
    #[must_use]
    pub fn data(&self) -> Value {
        match self {
            Self::ProxyStatus {
                status,
                trace_id,
            } => json!({
                "status": status.as_str(),
                "trace_id": trace_id,
            }),
            Self::ToolStatus {
                call_id,
                name,
                phase,
            } => json!({
                "tool_call_id": call_id,
                "name": name,
                "status": phase,
            }),
            Self::ToolApprovalRequired {
                call,
                trace_id,
            } => json!({
                "tool_call_id": call.id,
                "name": call.name,
                "arguments": call.arguments,
                "trace_id": trace_id,
            }),
            Self::ContentDelta(chunk) => chunk.clone(),
            Self::Error {
                kind,
                message,
            } => json!({
                "error": {
                    "type": kind,
                    "message": message,
                }
            }),
        }
    }
}

// ============================================================================
// SECTION: Audit Events
// ============================================================================

/// Audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    /// A request was refused by the rate limiter.
    RateLimited,
    /// A request gave up waiting for a concurrency slot.
    ConcurrencyRejected,
    /// A tool call was parked for approval.
    ToolApprovalRequired,
    /// A parked tool call received a decision.
    ToolApprovalResolved,
    /// A parked tool call could not be parked again after a refused resume.
    ToolApprovalDropped,
    /// The tool registry could not list its tool definitions.
    ToolDefinitionsUnavailable,
}

/// Audit record handed to an [`crate::interfaces::AuditSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event kind.
    pub event: AuditEventKind,
    /// Trace the event belongs to.
    pub trace_id: TraceId,
    /// Wall-clock time in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Event-specific details.
    pub metadata: Value,
}

impl AuditEvent {
    /// Creates an audit event stamped with the current time.
    #[must_use]
    pub fn new(event: AuditEventKind, trace_id: &TraceId, metadata: Value) -> Self {
        Self {
            event,
            trace_id: trace_id.clone(),
            timestamp_ms: unix_millis(),
            metadata,
        }
    }
}

/// Returns the current wall-clock time in milliseconds.
fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
