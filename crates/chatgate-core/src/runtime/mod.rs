// crates/chatgate-core/src/runtime/mod.rs
// ============================================================================
// Module: Chatgate Runtime
// Description: Admission, approval, tool loop, protocol, and proxy wiring.
// Purpose: Group the stateful request-serving components.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime components are leaf-first: admission and approval know nothing of
//! the tool loop; the tool loop knows nothing of admission; the proxy ties
//! them together for one request.

pub mod admission;
pub mod approval;
pub mod orchestrator;
pub mod protocol;
pub mod proxy;

pub use admission::AdmissionConfig;
pub use admission::AdmissionController;
pub use admission::AdmissionPermit;
pub use admission::AdmissionRejection;
pub use admission::AdmissionResult;
pub use admission::AdmissionStep;
pub use admission::QueuedAdmission;
pub use approval::ApprovalDecision;
pub use approval::ApprovalError;
pub use approval::ApprovalPolicy;
pub use approval::ApprovalTicket;
pub use approval::PendingApproval;
pub use approval::PendingApprovals;
pub use approval::requires_approval;
pub use orchestrator::FinalResponse;
pub use orchestrator::LoopConfig;
pub use orchestrator::LoopError;
pub use orchestrator::LoopOutcome;
pub use orchestrator::ToolLoop;
pub use protocol::DiscardEvents;
pub use protocol::EventLog;
pub use protocol::EventSink;
pub use protocol::ProtocolEncoder;
pub use protocol::ProtocolError;
pub use protocol::SSE_DONE_FRAME;
pub use protocol::StreamEmitter;
pub use protocol::encode_frame;
pub use proxy::AggregatedReply;
pub use proxy::ChatProxy;
pub use proxy::RequestOutcome;
