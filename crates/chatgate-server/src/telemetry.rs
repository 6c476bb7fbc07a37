// crates/chatgate-server/src/telemetry.rs
// ============================================================================
// Module: Chatgate Telemetry
// Description: Observability hooks for proxied chat requests.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: chatgate-core
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for request counters and
//! latency histograms. Deployments plug in their own exporter by
//! implementing [`ProxyMetrics`]; the server defaults to [`NoopMetrics`].
//! Labels carry no message content.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use chatgate_core::RequestOutcome;
use chatgate_core::TraceId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const LATENCY_BUCKETS_MS: &[u64] =
    &[5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000, 60_000, 120_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Route classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyRoute {
    /// `POST /v1/chat/completions`.
    ChatCompletions,
    /// `POST /v1/approvals/{call_id}`.
    Approvals,
}

impl ProxyRoute {
    /// Returns a stable label for the route.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat_completions",
            Self::Approvals => "approvals",
        }
    }
}

/// Request metric event payload.
#[derive(Debug, Clone)]
pub struct ProxyMetricEvent {
    /// Route that served the request.
    pub route: ProxyRoute,
    /// Whether the response was streamed.
    pub streaming: bool,
    /// Request outcome.
    pub outcome: RequestOutcome,
    /// Trace the request belonged to.
    pub trace_id: TraceId,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for proxied requests and latencies.
pub trait ProxyMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: ProxyMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: ProxyMetricEvent, latency: Duration);
}

/// No-op metrics sink.
pub struct NoopMetrics;

impl ProxyMetrics for NoopMetrics {
    fn record_request(&self, _event: ProxyMetricEvent) {}

    fn record_latency(&self, _event: ProxyMetricEvent, _latency: Duration) {}
}
