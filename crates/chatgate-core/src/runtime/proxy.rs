// crates/chatgate-core/src/runtime/proxy.rs
// ============================================================================
// Module: Chatgate Proxy
// Description: Admission, tool loop, and protocol wiring per request.
// Purpose: Serve one chat request end to end in streaming or aggregated mode.
// Dependencies: crate::runtime, tokio
// ============================================================================

//! ## Overview
//! [`ChatProxy`] is the transport-independent request handler. Streaming
//! requests narrate admission and tool progress on a frame channel and always
//! end with the sentinel; when the receiving side closes, the in-flight work
//! is dropped, which releases the concurrency slot. Aggregated requests
//! produce one [`AggregatedReply`].
//!
//! A resumed approval goes through admission again. If admission refuses
//! it, the continuation is parked again so the decision can be retried. When
//! the store cannot take it back, the request fails as an internal error
//! instead of reporting a retryable rejection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use tokio::sync::mpsc;

use crate::core::ChatCompletionRequest;
use crate::core::ProtocolEvent;
use crate::core::ProxyStatus;
use crate::core::ResponseMode;
use crate::core::ToolCallId;
use crate::core::TraceId;
use crate::runtime::admission::AdmissionController;
use crate::runtime::admission::AdmissionPermit;
use crate::runtime::admission::AdmissionRejection;
use crate::runtime::admission::AdmissionStep;
use crate::runtime::approval::ApprovalError;
use crate::runtime::approval::ApprovalTicket;
use crate::runtime::approval::PendingApproval;
use crate::runtime::approval::PendingApprovals;
use crate::runtime::orchestrator::LoopError;
use crate::runtime::orchestrator::LoopOutcome;
use crate::runtime::orchestrator::ToolLoop;
use crate::runtime::protocol::DiscardEvents;
use crate::runtime::protocol::EventSink;
use crate::runtime::protocol::ProtocolError;
use crate::runtime::protocol::StreamEmitter;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Final answer delivered.
    Completed,
    /// Call budget exhausted.
    Exhausted,
    /// Halted for approval.
    ApprovalRequired,
    /// Refused by admission.
    Rejected(AdmissionRejection),
    /// Upstream gateway failed.
    UpstreamFailed,
    /// Internal failure.
    Failed,
    /// Client disconnected.
    Cancelled,
}

impl RequestOutcome {
    /// Returns a stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Exhausted => "exhausted",
            Self::ApprovalRequired => "approval_required",
            Self::Rejected(rejection) => rejection.error_type(),
            Self::UpstreamFailed => "upstream_error",
            Self::Failed => "internal_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Classifies a loop result.
    fn from_loop(result: &Result<LoopOutcome, LoopError>) -> Self {
        match result {
            Ok(LoopOutcome::Completed(_)) => Self::Completed,
            Ok(LoopOutcome::Exhausted(_)) => Self::Exhausted,
            Ok(LoopOutcome::ApprovalRequired(_)) => Self::ApprovalRequired,
            Err(LoopError::Upstream(_)) => Self::UpstreamFailed,
            Err(LoopError::Cancelled | LoopError::Protocol(ProtocolError::Disconnected)) => {
                Self::Cancelled
            }
            Err(_) => Self::Failed,
        }
    }
}

/// Aggregated (non-streaming) reply.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedReply {
    /// Final upstream completion body.
    Completion {
        /// Completion body.
        body: Value,
        /// True when the call budget ran out.
        exhausted: bool,
    },
    /// A tool call awaits approval.
    ApprovalRequired(ApprovalTicket),
    /// Refused by admission.
    Rejected(AdmissionRejection),
    /// Upstream gateway failed.
    UpstreamFailed(String),
    /// Internal failure.
    Internal(String),
}

impl AggregatedReply {
    /// Returns the HTTP status code for the reply.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Completion {
                ..
            } => 200,
            Self::ApprovalRequired(_) => 202,
            Self::Rejected(_) => 429,
            Self::UpstreamFailed(_) => 502,
            Self::Internal(_) => 500,
        }
    }

    /// Returns the JSON body for the reply.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::Completion {
                body,
                ..
            } => body.clone(),
            Self::ApprovalRequired(ticket) => ticket.body(),
            Self::Rejected(rejection) => error_body(rejection.error_type(), &rejection.to_string()),
            Self::UpstreamFailed(message) => error_body("upstream_error", message),
            Self::Internal(message) => error_body("internal_error", message),
        }
    }

    /// Returns the outcome classification.
    #[must_use]
    pub const fn outcome(&self) -> RequestOutcome {
        match self {
            Self::Completion {
                exhausted: false,
                ..
            } => RequestOutcome::Completed,
            Self::Completion {
                exhausted: true,
                ..
            } => RequestOutcome::Exhausted,
            Self::ApprovalRequired(_) => RequestOutcome::ApprovalRequired,
            Self::Rejected(rejection) => RequestOutcome::Rejected(*rejection),
            Self::UpstreamFailed(_) => RequestOutcome::UpstreamFailed,
            Self::Internal(_) => RequestOutcome::Failed,
        }
    }

    /// Converts a loop result.
    fn from_loop(result: Result<LoopOutcome, LoopError>) -> Self {
        match result {
            Ok(LoopOutcome::Completed(response)) => Self::Completion {
                body: response.body,
                exhausted: false,
            },
            Ok(LoopOutcome::Exhausted(response)) => Self::Completion {
                body: response.body,
                exhausted: true,
            },
            Ok(LoopOutcome::ApprovalRequired(ticket)) => Self::ApprovalRequired(ticket),
            Err(LoopError::Upstream(err)) => Self::UpstreamFailed(err.to_string()),
            Err(err) => Self::Internal(err.to_string()),
        }
    }
}

/// Renders an OpenAI-style error body.
fn error_body(kind: &str, message: &str) -> Value {
    json!({
        "error": {
            "type": kind,
            "message": message,
        }
    })
}

// ============================================================================
// SECTION: Proxy
// ============================================================================

/// Work to run once admitted.
enum Work {
    /// A fresh request.
    Fresh(ChatCompletionRequest),
    /// A parked continuation with its decision.
    Resume {
        /// Parked continuation.
        pending: PendingApproval,
        /// Decision.
        approved: bool,
    },
}

/// Transport-independent chat proxy.
pub struct ChatProxy {
    /// Admission controller.
    admission: Arc<AdmissionController>,
    /// Tool loop.
    tool_loop: ToolLoop,
}

impl ChatProxy {
    /// Creates a proxy.
    #[must_use]
    pub const fn new(admission: Arc<AdmissionController>, tool_loop: ToolLoop) -> Self {
        Self {
            admission,
            tool_loop,
        }
    }

    /// Returns the admission controller.
    #[must_use]
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Returns the parked continuation store.
    #[must_use]
    pub fn pending(&self) -> &PendingApprovals {
        self.tool_loop.pending()
    }

    /// Takes the continuation parked under `call_id`.
    #[must_use]
    pub fn take_pending(&self, call_id: &ToolCallId) -> Option<PendingApproval> {
        self.pending().take(call_id)
    }

    /// Serves an aggregated request.
    pub async fn complete(
        &self,
        request: ChatCompletionRequest,
        trace_id: &TraceId,
    ) -> AggregatedReply {
        self.complete_work(Work::Fresh(request), trace_id).await
    }

    /// Resumes a parked continuation with an aggregated reply.
    pub async fn resume_aggregated(
        &self,
        pending: PendingApproval,
        approved: bool,
    ) -> AggregatedReply {
        let trace_id = pending.trace_id.clone();
        self.complete_work(
            Work::Resume {
                pending,
                approved,
            },
            &trace_id,
        )
        .await
    }

    /// Serves a streaming request, writing frames to `frames`.
    pub async fn stream(
        &self,
        request: ChatCompletionRequest,
        trace_id: &TraceId,
        frames: mpsc::Sender<String>,
    ) -> RequestOutcome {
        self.stream_work(Work::Fresh(request), trace_id, frames).await
    }

    /// Resumes a parked continuation, writing frames to `frames`.
    pub async fn resume_stream(
        &self,
        pending: PendingApproval,
        approved: bool,
        frames: mpsc::Sender<String>,
    ) -> RequestOutcome {
        let trace_id = pending.trace_id.clone();
        self.stream_work(
            Work::Resume {
                pending,
                approved,
            },
            &trace_id,
            frames,
        )
        .await
    }

    /// Admits and runs aggregated work.
    async fn complete_work(&self, work: Work, trace_id: &TraceId) -> AggregatedReply {
        let permit = match self.admission.admit(trace_id).await {
            Ok(permit) => permit,
            Err(rejection) => {
                if let Err(err) = self.repark(work) {
                    return AggregatedReply::Internal(lost_continuation(rejection, &err));
                }
                return AggregatedReply::Rejected(rejection);
            }
        };
        let result =
            self.run_work(work, trace_id, ResponseMode::Aggregated, &mut DiscardEvents).await;
        drop(permit);
        AggregatedReply::from_loop(result)
    }

    /// Runs streaming work until it settles or the client leaves, then
    /// sends the sentinel.
    async fn stream_work(
        &self,
        work: Work,
        trace_id: &TraceId,
        frames: mpsc::Sender<String>,
    ) -> RequestOutcome {
        let watch = frames.clone();
        let mut emitter = StreamEmitter::new(frames);
        let outcome = tokio::select! {
            outcome = self.stream_admitted(work, trace_id, &mut emitter) => outcome,
            () = watch.closed() => RequestOutcome::from_loop(&Err(LoopError::Cancelled)),
        };
        emitter.finish().await;
        outcome
    }

    /// Streams admission status, then runs the work.
    async fn stream_admitted(
        &self,
        work: Work,
        trace_id: &TraceId,
        emitter: &mut StreamEmitter,
    ) -> RequestOutcome {
        let permit = match self.stream_admission(trace_id, emitter).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(rejection)) => {
                return self.stream_rejection(work, rejection, trace_id, emitter).await;
            }
            Err(outcome) => {
                // The client is gone; a failed repark is already audited.
                let _ = self.repark(work);
                return outcome;
            }
        };
        let result = self.run_work(work, trace_id, ResponseMode::Streaming, emitter).await;
        drop(permit);
        let outcome = RequestOutcome::from_loop(&result);
        if let Err(err) = result
            && outcome != RequestOutcome::Cancelled
        {
            let _ = emitter
                .emit(ProtocolEvent::Error {
                    kind: err.error_type().to_string(),
                    message: err.to_string(),
                })
                .await;
        }
        outcome
    }

    /// Runs admission, reporting queueing and acquisition on the stream.
    ///
    /// A rejection is returned unreported so the caller can settle resumed
    /// work before choosing the closing event.
    async fn stream_admission(
        &self,
        trace_id: &TraceId,
        emitter: &mut StreamEmitter,
    ) -> Result<Result<AdmissionPermit, AdmissionRejection>, RequestOutcome> {
        let admitted = match self.admission.try_admit(trace_id) {
            AdmissionStep::Admitted(permit) => Ok(permit),
            AdmissionStep::Rejected(rejection) => Err(rejection),
            AdmissionStep::Queued(queued) => {
                emit_status(emitter, ProxyStatus::Queued, trace_id).await?;
                queued.wait().await
            }
        };
        if admitted.is_ok() {
            emit_status(emitter, ProxyStatus::Acquired, trace_id).await?;
        }
        Ok(admitted)
    }

    /// Closes a refused stream with its rejection status, or with an error
    /// when resumed work could not be parked again.
    async fn stream_rejection(
        &self,
        work: Work,
        rejection: AdmissionRejection,
        trace_id: &TraceId,
        emitter: &mut StreamEmitter,
    ) -> RequestOutcome {
        if let Err(err) = self.repark(work) {
            let _ = emitter
                .emit(ProtocolEvent::Error {
                    kind: RequestOutcome::Failed.as_str().to_string(),
                    message: lost_continuation(rejection, &err),
                })
                .await;
            return RequestOutcome::Failed;
        }
        match emit_status(emitter, rejection.proxy_status(), trace_id).await {
            Ok(()) => RequestOutcome::Rejected(rejection),
            Err(outcome) => outcome,
        }
    }

    /// Runs admitted work through the tool loop.
    async fn run_work(
        &self,
        work: Work,
        trace_id: &TraceId,
        mode: ResponseMode,
        sink: &mut dyn EventSink,
    ) -> Result<LoopOutcome, LoopError> {
        match work {
            Work::Fresh(request) => self.tool_loop.run(request, trace_id, sink).await,
            Work::Resume {
                pending,
                approved,
            } => self.tool_loop.resume(pending, approved, mode, sink).await,
        }
    }

    /// Parks a refused continuation again so its decision can be retried.
    fn repark(&self, work: Work) -> Result<(), ApprovalError> {
        match work {
            Work::Resume {
                pending,
                ..
            } => self.tool_loop.repark(pending),
            Work::Fresh(_) => Ok(()),
        }
    }
}

/// Describes a refusal whose continuation could not be parked again.
fn lost_continuation(rejection: AdmissionRejection, err: &ApprovalError) -> String {
    format!("{rejection}; parked continuation lost: {err}")
}

/// Emits a proxy status event.
async fn emit_status(
    emitter: &mut StreamEmitter,
    status: ProxyStatus,
    trace_id: &TraceId,
) -> Result<(), RequestOutcome> {
    emitter
        .emit(ProtocolEvent::ProxyStatus {
            status,
            trace_id: trace_id.clone(),
        })
        .await
        .map_err(|_| RequestOutcome::Cancelled)
}
