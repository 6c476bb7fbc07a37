// crates/chatgate-core/src/lib.rs
// ============================================================================
// Module: Chatgate Core
// Description: Admission-controlled, tool-augmented chat proxy runtime.
// Purpose: Expose the transport-independent proxy and its collaborator traits.
// Dependencies: async-trait, dashmap, serde, sha2, tokio
// ============================================================================

//! ## Overview
//! Chatgate sits in front of an OpenAI-compatible chat gateway. Each request
//! is admitted per trace (rate window plus concurrency slots), then driven
//! through a tool-calling loop against an external tool registry. Sensitive
//! tools halt the loop until a human decides. Streaming callers see every
//! step as an ordered event stream.
//!
//! - [`core`]: plain data types.
//! - [`interfaces`]: upstream gateway, tool registry, and audit sink traits.
//! - [`runtime`]: admission, approval, tool loop, protocol, and proxy.

pub mod core;
pub mod interfaces;
pub mod runtime;

pub use crate::core::*;
pub use crate::interfaces::AuditSink;
pub use crate::interfaces::ChunkStream;
pub use crate::interfaces::NoopAuditSink;
pub use crate::interfaces::ToolRegistry;
pub use crate::interfaces::ToolRegistryError;
pub use crate::interfaces::UpstreamError;
pub use crate::interfaces::UpstreamGateway;
pub use crate::runtime::*;
