// crates/chatgate-server/src/lib.rs
// ============================================================================
// Module: Chatgate Server
// Description: HTTP transport and network collaborators for the chat proxy.
// Purpose: Bind chatgate-core to axum, an upstream gateway, and a registry.
// Dependencies: chatgate-core, chatgate-config, axum, reqwest, tokio
// ============================================================================

//! ## Overview
//! Chatgate Server exposes [`chatgate_core::ChatProxy`] over HTTP. It owns the
//! network-facing implementations of the core traits: an OpenAI-compatible
//! upstream gateway client, a JSON tool registry client, and JSON-lines
//! audit sinks. Configuration comes from [`chatgate_config::ChatgateConfig`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod registry;
pub mod server;
pub mod telemetry;
pub mod upstream;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::StderrAuditSink;
pub use audit::audit_sink_from_config;
pub use registry::HttpToolRegistry;
pub use registry::NoToolRegistry;
pub use server::ProxyCollaborators;
pub use server::ProxyServer;
pub use server::ProxyServerError;
pub use server::TRACE_ID_HEADER;
pub use telemetry::LATENCY_BUCKETS_MS;
pub use telemetry::NoopMetrics;
pub use telemetry::ProxyMetricEvent;
pub use telemetry::ProxyMetrics;
pub use telemetry::ProxyRoute;
pub use upstream::HttpUpstreamGateway;
pub use upstream::SseDecoder;
