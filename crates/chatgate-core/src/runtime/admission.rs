// crates/chatgate-core/src/runtime/admission.rs
// ============================================================================
// Module: Chatgate Admission Controller
// Description: Per-trace rate limiting and concurrency gating.
// Purpose: Decide whether a request may start, queue, or must be refused.
// Dependencies: dashmap, tokio
// ============================================================================

//! ## Overview
//! Every request names a trace. Each trace owns a fixed rate window and a
//! FIFO counting semaphore. The rate check runs first and never touches the
//! semaphore; an admitted request then holds one slot for its lifetime.
//!
//! Per-trace state is created on first use and kept for the life of the
//! process. Unrelated traces only share the sharded map, never a lock.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;
use thiserror::Error;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::core::AuditEvent;
use crate::core::AuditEventKind;
use crate::core::ProxyStatus;
use crate::core::TraceId;
use crate::interfaces::AuditSink;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Admission limits applied to every trace.
///
/// # Invariants
/// - A zero `rate_limit_count` or zero `rate_limit_window` disables rate
///   limiting.
/// - A zero `max_concurrent` disables the concurrency gate.
/// - A zero `concurrency_wait` rejects immediately when no slot is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Requests allowed per window.
    pub rate_limit_count: u32,
    /// Window length.
    pub rate_limit_window: Duration,
    /// Concurrent requests allowed per trace.
    pub max_concurrent: usize,
    /// Longest time a request waits for a slot.
    pub concurrency_wait: Duration,
}

impl AdmissionConfig {
    /// Returns true when the rate check is active.
    #[must_use]
    pub const fn rate_limit_enabled(&self) -> bool {
        self.rate_limit_count > 0 && !self.rate_limit_window.is_zero()
    }

    /// Returns true when the concurrency gate is active.
    #[must_use]
    pub const fn concurrency_enabled(&self) -> bool {
        self.max_concurrent > 0
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Reason a request was refused.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionRejection {
    /// The trace used up its request budget for the current window.
    #[error("rate limit exceeded")]
    RateLimited,
    /// No concurrency slot became free within the wait bound.
    #[error("concurrency limit reached")]
    ConcurrencyRejected,
}

impl AdmissionRejection {
    /// Returns the stable error type label.
    #[must_use]
    pub const fn error_type(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::ConcurrencyRejected => "concurrency_rejected",
        }
    }

    /// Returns the status reported on the event stream.
    #[must_use]
    pub const fn proxy_status(self) -> ProxyStatus {
        match self {
            Self::RateLimited => ProxyStatus::RateLimited,
            Self::ConcurrencyRejected => ProxyStatus::Rejected,
        }
    }

    /// Returns the audit event kind.
    #[must_use]
    pub const fn audit_kind(self) -> AuditEventKind {
        match self {
            Self::RateLimited => AuditEventKind::RateLimited,
            Self::ConcurrencyRejected => AuditEventKind::ConcurrencyRejected,
        }
    }
}

/// Result of a full admission.
pub type AdmissionResult = Result<AdmissionPermit, AdmissionRejection>;

/// Proof of admission. Dropping it frees the concurrency slot.
#[derive(Debug)]
pub struct AdmissionPermit {
    /// Admitted trace.
    trace_id: TraceId,
    /// Whether the request waited for its slot.
    queued: bool,
    /// Held slot; `None` when the concurrency gate is disabled.
    _slot: Option<OwnedSemaphorePermit>,
}

impl AdmissionPermit {
    /// Returns the admitted trace.
    #[must_use]
    pub const fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Returns true when the request waited for its slot.
    #[must_use]
    pub const fn was_queued(&self) -> bool {
        self.queued
    }
}

/// First phase of admission.
pub enum AdmissionStep {
    /// Admitted without waiting.
    Admitted(AdmissionPermit),
    /// Rate check passed but every slot is taken.
    Queued(QueuedAdmission),
    /// Refused.
    Rejected(AdmissionRejection),
}

/// Admission waiting for a concurrency slot.
pub struct QueuedAdmission {
    /// Waiting trace.
    trace_id: TraceId,
    /// Trace semaphore.
    slots: Arc<Semaphore>,
    /// Wait bound.
    wait: Duration,
    /// Configured slot count, for audit metadata.
    max_concurrent: usize,
    /// Sink for the rejection record.
    audit: Arc<dyn AuditSink>,
}

impl QueuedAdmission {
    /// Waits for a slot, up to the configured bound.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionRejection::ConcurrencyRejected`] when the wait
    /// elapses.
    pub async fn wait(self) -> AdmissionResult {
        match tokio::time::timeout(self.wait, Arc::clone(&self.slots).acquire_owned()).await {
            Ok(Ok(slot)) => Ok(AdmissionPermit {
                trace_id: self.trace_id,
                queued: true,
                _slot: Some(slot),
            }),
            Ok(Err(_)) | Err(_) => {
                record_concurrency_rejection(
                    self.audit.as_ref(),
                    &self.trace_id,
                    self.max_concurrent,
                    self.wait,
                );
                Err(AdmissionRejection::ConcurrencyRejected)
            }
        }
    }
}

// ============================================================================
// SECTION: Controller
// ============================================================================

/// Fixed rate window for one trace.
#[derive(Debug, Default)]
struct RateWindow {
    /// Requests counted in the current window.
    count: u32,
    /// Arrival of the first request of the window.
    started_at: Option<Instant>,
}

/// Admission state owned by one trace.
struct TraceState {
    /// Rate window.
    window: Mutex<RateWindow>,
    /// Concurrency slots; `None` when the gate is disabled.
    slots: Option<Arc<Semaphore>>,
}

impl TraceState {
    /// Creates state sized for `config`.
    fn new(config: &AdmissionConfig) -> Self {
        let slots = config
            .concurrency_enabled()
            .then(|| Arc::new(Semaphore::new(config.max_concurrent)));
        Self {
            window: Mutex::new(RateWindow::default()),
            slots,
        }
    }
}

/// Per-trace admission controller.
pub struct AdmissionController {
    /// Limits applied to every trace.
    config: AdmissionConfig,
    /// Lazily created per-trace state.
    traces: DashMap<TraceId, Arc<TraceState>>,
    /// Sink for rejection records.
    audit: Arc<dyn AuditSink>,
}

impl AdmissionController {
    /// Creates a controller.
    #[must_use]
    pub fn new(config: AdmissionConfig, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            config,
            traces: DashMap::new(),
            audit,
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub const fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Returns how many traces have admission state.
    #[must_use]
    pub fn tracked_traces(&self) -> usize {
        self.traces.len()
    }

    /// Returns how many slots `trace_id` currently holds.
    #[must_use]
    pub fn in_flight(&self, trace_id: &TraceId) -> usize {
        self.traces.get(trace_id).and_then(|state| state.slots.clone()).map_or(0, |slots| {
            self.config.max_concurrent.saturating_sub(slots.available_permits())
        })
    }

    /// Admits a request, waiting for a slot when necessary.
    ///
    /// # Errors
    ///
    /// Returns [`AdmissionRejection`] when the request is refused.
    pub async fn admit(&self, trace_id: &TraceId) -> AdmissionResult {
        match self.try_admit(trace_id) {
            AdmissionStep::Admitted(permit) => Ok(permit),
            AdmissionStep::Queued(queued) => queued.wait().await,
            AdmissionStep::Rejected(rejection) => Err(rejection),
        }
    }

    /// Runs the rate check and tries to take a slot without waiting.
    #[must_use]
    pub fn try_admit(&self, trace_id: &TraceId) -> AdmissionStep {
        let state = self.trace_state(trace_id);
        if !self.consume_rate(&state) {
            self.audit.record(&AuditEvent::new(
                AuditEventKind::RateLimited,
                trace_id,
                json!({
                    "rate_limit_count": self.config.rate_limit_count,
                    "window_ms": duration_ms(self.config.rate_limit_window),
                }),
            ));
            return AdmissionStep::Rejected(AdmissionRejection::RateLimited);
        }
        let Some(slots) = &state.slots else {
            return AdmissionStep::Admitted(AdmissionPermit {
                trace_id: trace_id.clone(),
                queued: false,
                _slot: None,
            });
        };
        if let Ok(slot) = Arc::clone(slots).try_acquire_owned() {
            return AdmissionStep::Admitted(AdmissionPermit {
                trace_id: trace_id.clone(),
                queued: false,
                _slot: Some(slot),
            });
        }
        if self.config.concurrency_wait.is_zero() {
            record_concurrency_rejection(
                self.audit.as_ref(),
                trace_id,
                self.config.max_concurrent,
                self.config.concurrency_wait,
            );
            return AdmissionStep::Rejected(AdmissionRejection::ConcurrencyRejected);
        }
        AdmissionStep::Queued(QueuedAdmission {
            trace_id: trace_id.clone(),
            slots: Arc::clone(slots),
            wait: self.config.concurrency_wait,
            max_concurrent: self.config.max_concurrent,
            audit: Arc::clone(&self.audit),
        })
    }

    /// Returns the state for `trace_id`, creating it on first use.
    fn trace_state(&self, trace_id: &TraceId) -> Arc<TraceState> {
        if let Some(state) = self.traces.get(trace_id) {
            return Arc::clone(state.value());
        }
        let entry = self
            .traces
            .entry(trace_id.clone())
            .or_insert_with(|| Arc::new(TraceState::new(&self.config)));
        Arc::clone(entry.value())
    }

    /// Counts one request against the window; false when the budget is spent.
    fn consume_rate(&self, state: &TraceState) -> bool {
        if !self.config.rate_limit_enabled() {
            return true;
        }
        let mut window = state.window.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let expired = window
            .started_at
            .is_none_or(|started| now.duration_since(started) > self.config.rate_limit_window);
        if expired {
            window.started_at = Some(now);
            window.count = 0;
        }
        if window.count >= self.config.rate_limit_count {
            return false;
        }
        window.count += 1;
        true
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Records a concurrency rejection.
fn record_concurrency_rejection(
    audit: &dyn AuditSink,
    trace_id: &TraceId,
    max_concurrent: usize,
    wait: Duration,
) {
    audit.record(&AuditEvent::new(
        AuditEventKind::ConcurrencyRejected,
        trace_id,
        json!({
            "max_concurrent_per_trace": max_concurrent,
            "wait_ms": duration_ms(wait),
        }),
    ));
}

/// Converts a duration to whole milliseconds, saturating.
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
