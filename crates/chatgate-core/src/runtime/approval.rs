// crates/chatgate-core/src/runtime/approval.rs
// ============================================================================
// Module: Chatgate Approval Gate
// Description: Approval predicate and parked tool-loop continuations.
// Purpose: Hold sensitive tool calls until an external decision arrives.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! [`requires_approval`] is a pure predicate over the tool name, the response
//! mode, and configuration. When it holds, the tool loop halts and parks its
//! continuation in [`PendingApprovals`], keyed by the tool call id. A later
//! [`ApprovalDecision`] takes the continuation out exactly once.
//!
//! The store is bounded; a full store refuses new entries rather than
//! evicting ones that a human may still answer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

use crate::core::ChatCompletionRequest;
use crate::core::ResponseMode;
use crate::core::ToolCall;
use crate::core::ToolCallId;
use crate::core::TraceId;

// ============================================================================
// SECTION: Predicate
// ============================================================================

/// Returns true when `tool_name` must wait for a human decision.
///
/// Listed tools need approval, except in non-streaming mode when
/// `auto_approve_nonstream` is set.
#[must_use]
pub fn requires_approval(
    tool_name: &str,
    is_streaming: bool,
    auto_approve_nonstream: bool,
    approval_tools: &BTreeSet<String>,
) -> bool {
    if !approval_tools.contains(tool_name) {
        return false;
    }
    is_streaming || !auto_approve_nonstream
}

/// Approval configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalPolicy {
    /// Tool names that need approval.
    pub approval_tools: BTreeSet<String>,
    /// Skip approval for non-streaming requests.
    pub auto_approve_nonstream: bool,
}

impl ApprovalPolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new<I, S>(approval_tools: I, auto_approve_nonstream: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            approval_tools: approval_tools.into_iter().map(Into::into).collect(),
            auto_approve_nonstream,
        }
    }

    /// Applies [`requires_approval`] for a response mode.
    #[must_use]
    pub fn requires_approval(&self, tool_name: &str, mode: ResponseMode) -> bool {
        requires_approval(
            tool_name,
            mode.is_streaming(),
            self.auto_approve_nonstream,
            &self.approval_tools,
        )
    }
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// External decision for a parked tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    /// Whether the call may run.
    pub approved: bool,
    /// Whether the resumed response should stream; defaults to aggregated.
    #[serde(default)]
    pub stream: bool,
}

// ============================================================================
// SECTION: Parked Continuations
// ============================================================================

/// Tool loop state parked while a call awaits approval.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingApproval {
    /// Trace that issued the call.
    pub trace_id: TraceId,
    /// Call awaiting the decision.
    pub call: ToolCall,
    /// Calls of the same round that have not run yet.
    pub remaining: Vec<ToolCall>,
    /// Conversation so far, including the assistant turn and earlier results.
    pub request: ChatCompletionRequest,
    /// Upstream calls already spent.
    pub upstream_calls: u32,
    /// Mode of the request that issued the call; the gate keeps using it
    /// after the resume.
    pub mode: ResponseMode,
}

impl PendingApproval {
    /// Returns the public description of this parked call.
    #[must_use]
    pub fn ticket(&self) -> ApprovalTicket {
        ApprovalTicket {
            trace_id: self.trace_id.clone(),
            call: self.call.clone(),
        }
    }
}

/// Public description of a parked call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalTicket {
    /// Trace that issued the call.
    pub trace_id: TraceId,
    /// Call awaiting the decision.
    pub call: ToolCall,
}

impl ApprovalTicket {
    /// Renders the aggregated pending-approval response body.
    #[must_use]
    pub fn body(&self) -> Value {
        json!({
            "object": "chat.completion.approval_required",
            "trace_id": self.trace_id,
            "tool_call": {
                "id": self.call.id,
                "name": self.call.name,
                "arguments": self.call.arguments,
            },
        })
    }
}

/// Approval store errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApprovalError {
    /// The store holds `capacity` entries already.
    #[error("pending approval store full ({capacity} entries)")]
    StoreFull {
        /// Configured capacity.
        capacity: usize,
    },
    /// A call with the same id is already parked.
    #[error("tool call already awaiting approval: {0}")]
    DuplicateCall(String),
}

/// Bounded store of parked continuations keyed by tool call id.
#[derive(Debug)]
pub struct PendingApprovals {
    /// Parked entries.
    entries: Mutex<HashMap<ToolCallId, PendingApproval>>,
    /// Maximum entries.
    capacity: usize,
}

impl PendingApprovals {
    /// Creates an empty store.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Parks a continuation.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when the store is full or the call id is
    /// already parked.
    pub fn park(&self, pending: PendingApproval) -> Result<ApprovalTicket, ApprovalError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&pending.call.id) {
            return Err(ApprovalError::DuplicateCall(pending.call.id.to_string()));
        }
        if entries.len() >= self.capacity {
            return Err(ApprovalError::StoreFull {
                capacity: self.capacity,
            });
        }
        let ticket = pending.ticket();
        entries.insert(pending.call.id.clone(), pending);
        Ok(ticket)
    }

    /// Removes and returns the continuation for `call_id`.
    #[must_use]
    pub fn take(&self, call_id: &ToolCallId) -> Option<PendingApproval> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).remove(call_id)
    }

    /// Returns the number of parked continuations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns true when nothing is parked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
