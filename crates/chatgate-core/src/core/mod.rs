// crates/chatgate-core/src/core/mod.rs
// ============================================================================
// Module: Chatgate Core Types
// Description: Identifiers, chat messages, tool calls, and events.
// Purpose: Group the plain data types shared by the runtime and adapters.
// Dependencies: serde, serde_json, sha2
// ============================================================================

//! ## Overview
//! Data-only building blocks. Nothing in this module performs I/O or holds
//! shared state.

pub mod events;
pub mod hashing;
pub mod identifiers;
pub mod messages;
pub mod tooling;

pub use events::AuditEvent;
pub use events::AuditEventKind;
pub use events::ProtocolEvent;
pub use events::ProxyStatus;
pub use events::ToolPhase;
pub use hashing::content_hash;
pub use identifiers::ToolCallId;
pub use identifiers::TraceId;
pub use messages::ChatCompletionRequest;
pub use messages::ChatMessage;
pub use messages::FinishReason;
pub use messages::ResponseMode;
pub use messages::StreamAssembly;
pub use messages::UpstreamChunk;
pub use messages::UpstreamResponse;
pub use tooling::ToolCall;
pub use tooling::ToolCallAccumulator;
pub use tooling::ToolCallDelta;
pub use tooling::ToolExecutionResult;
