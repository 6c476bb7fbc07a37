// crates/chatgate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Chatgate Interfaces
// Description: Collaborator contracts for the upstream gateway, tool
//              registry, and audit sink.
// Purpose: Keep the runtime independent of transports and backends.
// Dependencies: crate::core, async-trait, tokio-stream
// ============================================================================

//! ## Overview
//! The proxy never owns its collaborators. The runtime talks to the upstream
//! model gateway, the tool registry, and the audit sink only through the
//! traits in this module; HTTP adapters live in the server crate and tests
//! supply in-memory fakes.
//!
//! Implementations receive untrusted model output (tool names and arguments)
//! and must treat it as such.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio_stream::Stream;

use crate::core::AuditEvent;
use crate::core::ToolExecutionResult;
use crate::core::TraceId;
use crate::core::UpstreamChunk;
use crate::core::UpstreamResponse;

// ============================================================================
// SECTION: Upstream Gateway
// ============================================================================

/// Upstream gateway errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The gateway could not be reached or the connection dropped.
    #[error("upstream transport error: {0}")]
    Transport(String),
    /// The gateway answered with a non-success status.
    #[error("upstream returned status {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response excerpt.
        message: String,
    },
    /// The gateway response could not be decoded.
    #[error("upstream decode error: {0}")]
    Decode(String),
}

/// Stream of decoded upstream chunks.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<UpstreamChunk, UpstreamError>> + Send>>;

/// Upstream chat-completion gateway.
#[async_trait]
pub trait UpstreamGateway: Send + Sync {
    /// Performs one non-streaming completion call.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] when the call fails or cannot be decoded.
    async fn call_once(
        &self,
        payload: Value,
        trace_id: &TraceId,
    ) -> Result<UpstreamResponse, UpstreamError>;

    /// Opens one streaming completion call.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError`] when the stream cannot be opened. Failures
    /// after the stream opened surface as stream items.
    async fn call_streaming(
        &self,
        payload: Value,
        trace_id: &TraceId,
    ) -> Result<ChunkStream, UpstreamError>;
}

// ============================================================================
// SECTION: Tool Registry
// ============================================================================

/// Tool registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ToolRegistryError {
    /// The registry could not be reached.
    #[error("tool registry unavailable: {0}")]
    Unavailable(String),
    /// The registry does not know the tool.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    /// The registry answered with something unusable.
    #[error("tool registry protocol error: {0}")]
    Protocol(String),
}

/// External tool registry and executor.
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// Executes a tool by name with the model's raw JSON arguments.
    ///
    /// A tool that ran and reported failure returns `Ok` with `ok = false`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError`] when the tool could not be executed.
    async fn call_tool(
        &self,
        name: &str,
        arguments: &str,
        trace_id: &TraceId,
    ) -> Result<ToolExecutionResult, ToolRegistryError>;

    /// Lists tool definitions (OpenAI `tools` entries) the registry offers.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError`] when the listing fails.
    async fn tool_definitions(&self, _trace_id: &TraceId) -> Result<Vec<Value>, ToolRegistryError> {
        Ok(Vec::new())
    }
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Fire-and-forget audit sink.
pub trait AuditSink: Send + Sync {
    /// Records an audit event. Failures are swallowed by the sink.
    fn record(&self, event: &AuditEvent);
}

/// Audit sink that discards events.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}
