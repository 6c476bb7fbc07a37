// crates/chatgate-core/tests/proxy.rs
// ============================================================================
// Module: Chat Proxy Tests
// Description: End-to-end request handling without a transport.
// Purpose: Pin event ordering, sentinel delivery, and slot release.
// Dependencies: chatgate-core, tokio
// ============================================================================

//! Chat proxy tests covering streaming frames and aggregated replies.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only assertions."
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chatgate_core::AdmissionConfig;
use chatgate_core::AdmissionController;
use chatgate_core::AdmissionRejection;
use chatgate_core::AggregatedReply;
use chatgate_core::ApprovalPolicy;
use chatgate_core::AuditEventKind;
use chatgate_core::AuditSink;
use chatgate_core::ChatProxy;
use chatgate_core::LoopConfig;
use chatgate_core::PendingApproval;
use chatgate_core::PendingApprovals;
use chatgate_core::RequestOutcome;
use chatgate_core::SSE_DONE_FRAME;
use chatgate_core::ToolCallId;
use chatgate_core::ToolLoop;
use chatgate_core::ToolRegistry;
use chatgate_core::TraceId;
use chatgate_core::UpstreamChunk;
use chatgate_core::UpstreamError;
use chatgate_core::UpstreamGateway;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::common::FakeRegistry;
use crate::common::RecordingAudit;
use crate::common::ScriptedUpstream;
use crate::common::StallingRegistry;
use crate::common::text_completion;
use crate::common::tool_completion;
use crate::common::tool_loop;
use crate::common::user_request;

fn proxy(
    upstream: Arc<dyn UpstreamGateway>,
    registry: Arc<dyn ToolRegistry>,
    admission: AdmissionConfig,
    policy: ApprovalPolicy,
) -> ChatProxy {
    let audit: Arc<dyn AuditSink> = Arc::new(RecordingAudit::default());
    let admission = Arc::new(AdmissionController::new(admission, Arc::clone(&audit)));
    ChatProxy::new(admission, tool_loop(upstream, registry, policy, 5, audit))
}

/// Proxy whose continuation store holds a single entry.
fn single_slot_proxy(
    upstream: Arc<dyn UpstreamGateway>,
    admission: AdmissionConfig,
    audit: Arc<RecordingAudit>,
) -> ChatProxy {
    let sink: Arc<dyn AuditSink> = audit;
    let admission = Arc::new(AdmissionController::new(admission, Arc::clone(&sink)));
    let tool_loop = ToolLoop::new(
        upstream,
        Arc::new(FakeRegistry::new().with_tool("deploy", "ok")),
        ApprovalPolicy::new(["deploy"], false),
        LoopConfig {
            auto_tools: true,
            max_tool_iterations: 5,
        },
        Arc::new(PendingApprovals::new(1)),
        sink,
    );
    ChatProxy::new(admission, tool_loop)
}

/// Parks `call_1` for trace `first`, takes it back out, then fills the store
/// with `call_2` from trace `second`.
async fn displaced_continuation(
    proxy: &ChatProxy,
    first: &TraceId,
    second: &TraceId,
) -> PendingApproval {
    assert_eq!(proxy.complete(user_request(false), first).await.status_code(), 202);
    let pending = proxy.take_pending(&ToolCallId::new("call_1")).expect("parked");
    assert_eq!(proxy.complete(user_request(false), second).await.status_code(), 202);
    assert_eq!(proxy.pending().len(), 1);
    pending
}

fn open_admission() -> AdmissionConfig {
    AdmissionConfig {
        rate_limit_count: 0,
        rate_limit_window: Duration::from_secs(60),
        max_concurrent: 1,
        concurrency_wait: Duration::ZERO,
    }
}

async fn collect(mut frames: mpsc::Receiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(frame) = frames.recv().await {
        out.push(frame);
    }
    out
}

fn event_type(frame: &str) -> &str {
    frame.lines().next().and_then(|line| line.strip_prefix("event: ")).unwrap_or("sentinel")
}

fn event_data(frame: &str) -> Value {
    let data = frame.lines().nth(1).and_then(|line| line.strip_prefix("data: ")).unwrap();
    serde_json::from_str(data).unwrap()
}

#[tokio::test]
async fn stream_starts_with_status_and_ends_with_one_sentinel() {
    let upstream = Arc::new(
        ScriptedUpstream::new()
            .with_stream(vec![UpstreamChunk::text("Hello"), UpstreamChunk::finish("stop")]),
    );
    let proxy =
        proxy(upstream, Arc::new(FakeRegistry::new()), open_admission(), ApprovalPolicy::default());
    let (tx, rx) = mpsc::channel(64);
    let outcome = proxy.stream(user_request(true), &TraceId::new("s1"), tx).await;
    assert_eq!(outcome, RequestOutcome::Completed);
    let frames = collect(rx).await;
    assert_eq!(event_type(&frames[0]), "proxy_status");
    assert_eq!(event_data(&frames[0])["status"], "acquired");
    assert_eq!(event_data(&frames[1])["choices"][0]["delta"]["content"], "Hello");
    assert_eq!(frames.last().map(String::as_str), Some(SSE_DONE_FRAME));
    assert_eq!(frames.iter().filter(|frame| frame.as_str() == SSE_DONE_FRAME).count(), 1);
}

#[tokio::test]
async fn rejected_stream_carries_only_status_and_sentinel() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let mut admission = open_admission();
    admission.rate_limit_count = 1;
    let proxy = proxy(
        upstream.clone(),
        Arc::new(FakeRegistry::new()),
        admission,
        ApprovalPolicy::default(),
    );
    let trace = TraceId::new("s2");
    let _ = proxy.admission().admit(&trace).await.expect("spend budget");
    let (tx, rx) = mpsc::channel(64);
    let outcome = proxy.stream(user_request(true), &trace, tx).await;
    assert_eq!(outcome, RequestOutcome::Rejected(AdmissionRejection::RateLimited));
    let frames = collect(rx).await;
    assert_eq!(frames.len(), 2);
    assert_eq!(event_data(&frames[0])["status"], "rate_limited");
    assert_eq!(frames[1], SSE_DONE_FRAME);
    assert_eq!(upstream.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn queued_stream_reports_queueing_then_acquisition() {
    let upstream = Arc::new(
        ScriptedUpstream::new()
            .with_stream(vec![UpstreamChunk::text("later"), UpstreamChunk::finish("stop")]),
    );
    let mut admission = open_admission();
    admission.concurrency_wait = Duration::from_secs(5);
    let proxy = Arc::new(proxy(
        upstream,
        Arc::new(FakeRegistry::new()),
        admission,
        ApprovalPolicy::default(),
    ));
    let trace = TraceId::new("s5");
    let held = proxy.admission().admit(&trace).await.expect("first slot");
    let (tx, mut rx) = mpsc::channel(64);
    let task = {
        let proxy = Arc::clone(&proxy);
        let trace = trace.clone();
        tokio::spawn(async move { proxy.stream(user_request(true), &trace, tx).await })
    };
    let queued = rx.recv().await.expect("queued frame");
    assert_eq!(event_data(&queued)["status"], "queued");
    tokio::time::sleep(Duration::from_secs(1)).await;
    drop(held);

    let outcome = task.await.expect("join");
    assert_eq!(outcome, RequestOutcome::Completed);
    let mut frames = vec![queued];
    frames.extend(collect(rx).await);
    let types: Vec<&str> = frames.iter().map(|frame| event_type(frame)).collect();
    assert_eq!(
        types,
        vec!["proxy_status", "proxy_status", "content_delta", "content_delta", "sentinel"]
    );
    assert_eq!(event_data(&frames[1])["status"], "acquired");
    assert_eq!(event_data(&frames[2])["choices"][0]["delta"]["content"], "later");
    assert_eq!(proxy.admission().in_flight(&trace), 0);
}

#[tokio::test]
async fn upstream_failure_streams_error_then_sentinel() {
    let upstream = Arc::new(ScriptedUpstream::new());
    let proxy =
        proxy(upstream, Arc::new(FakeRegistry::new()), open_admission(), ApprovalPolicy::default());
    let (tx, rx) = mpsc::channel(64);
    let outcome = proxy.stream(user_request(true), &TraceId::new("s3"), tx).await;
    assert_eq!(outcome, RequestOutcome::UpstreamFailed);
    let frames = collect(rx).await;
    let types: Vec<&str> = frames.iter().map(|frame| event_type(frame)).collect();
    assert_eq!(types, vec!["proxy_status", "error", "sentinel"]);
    assert_eq!(event_data(&frames[1])["error"]["type"], "upstream_error");
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_work_and_frees_the_slot() {
    let upstream = Arc::new(ScriptedUpstream::new().with_stream(vec![
        UpstreamChunk::tool_call(0, "call_1", "slow", "{}"),
        UpstreamChunk::finish("tool_calls"),
    ]));
    let proxy = Arc::new(proxy(
        upstream,
        Arc::new(StallingRegistry),
        open_admission(),
        ApprovalPolicy::default(),
    ));
    let trace = TraceId::new("s4");
    let (tx, mut rx) = mpsc::channel(64);
    let task = {
        let proxy = Arc::clone(&proxy);
        let trace = trace.clone();
        tokio::spawn(async move { proxy.stream(user_request(true), &trace, tx).await })
    };
    let first = rx.recv().await.expect("status frame");
    assert_eq!(event_type(&first), "proxy_status");
    let _ = rx.recv().await.expect("tool start frame");
    assert_eq!(proxy.admission().in_flight(&trace), 1);
    drop(rx);
    let outcome = task.await.expect("join");
    assert_eq!(outcome, RequestOutcome::Cancelled);
    assert_eq!(proxy.admission().in_flight(&trace), 0);
}

#[tokio::test]
async fn aggregated_replies_map_to_status_codes() {
    let upstream = Arc::new(
        ScriptedUpstream::new()
            .with_response(text_completion("fine"))
            .with_failure(UpstreamError::Transport("down".to_string())),
    );
    let mut admission = open_admission();
    admission.rate_limit_count = 2;
    let proxy =
        proxy(upstream, Arc::new(FakeRegistry::new()), admission, ApprovalPolicy::default());
    let trace = TraceId::new("a1");

    let ok = proxy.complete(user_request(false), &trace).await;
    assert_eq!(ok.status_code(), 200);
    assert_eq!(ok.body()["choices"][0]["message"]["content"], "fine");

    let failed = proxy.complete(user_request(false), &trace).await;
    assert_eq!(failed.status_code(), 502);
    assert_eq!(failed.body()["error"]["type"], "upstream_error");

    let limited = proxy.complete(user_request(false), &trace).await;
    assert_eq!(limited.status_code(), 429);
    assert_eq!(limited.body()["error"]["type"], "rate_limited");
}

#[tokio::test]
async fn approval_round_trip_through_the_proxy() {
    let upstream = Arc::new(
        ScriptedUpstream::new()
            .with_response(tool_completion(&[("call_1", "deploy", "{}")]))
            .with_response(text_completion("deployed")),
    );
    let registry = Arc::new(FakeRegistry::new().with_tool("deploy", "ok"));
    let proxy = proxy(
        upstream,
        registry.clone(),
        open_admission(),
        ApprovalPolicy::new(["deploy"], false),
    );
    let trace = TraceId::new("a2");

    let halted = proxy.complete(user_request(false), &trace).await;
    assert_eq!(halted.status_code(), 202);
    assert_eq!(halted.body()["object"], "chat.completion.approval_required");
    assert!(matches!(halted, AggregatedReply::ApprovalRequired(_)));

    let pending = proxy.take_pending(&ToolCallId::new("call_1")).expect("parked");
    assert_eq!(pending.trace_id, trace);
    let resumed = proxy.resume_aggregated(pending, true).await;
    assert_eq!(resumed.status_code(), 200);
    assert_eq!(resumed.body()["choices"][0]["message"]["content"], "deployed");
    assert_eq!(registry.calls().len(), 1);
    assert!(proxy.take_pending(&ToolCallId::new("call_1")).is_none());
}

#[tokio::test]
async fn refused_resume_stays_parked() {
    let upstream = Arc::new(
        ScriptedUpstream::new().with_response(tool_completion(&[("call_1", "deploy", "{}")])),
    );
    let mut admission = open_admission();
    admission.rate_limit_count = 1;
    let proxy = proxy(
        upstream,
        Arc::new(FakeRegistry::new()),
        admission,
        ApprovalPolicy::new(["deploy"], false),
    );
    let halted = proxy.complete(user_request(false), &TraceId::new("a3")).await;
    assert_eq!(halted.status_code(), 202);
    let pending = proxy.take_pending(&ToolCallId::new("call_1")).expect("parked");
    let refused = proxy.resume_aggregated(pending, true).await;
    assert_eq!(refused.outcome(), RequestOutcome::Rejected(AdmissionRejection::RateLimited));
    assert_eq!(proxy.pending().len(), 1);
}

#[tokio::test]
async fn refused_resume_that_cannot_be_parked_again_is_an_internal_error() {
    let upstream = Arc::new(
        ScriptedUpstream::new()
            .with_response(tool_completion(&[("call_1", "deploy", "{}")]))
            .with_response(tool_completion(&[("call_2", "deploy", "{}")])),
    );
    let mut admission = open_admission();
    admission.rate_limit_count = 1;
    let audit = Arc::new(RecordingAudit::default());
    let proxy = single_slot_proxy(upstream, admission, Arc::clone(&audit));
    let first = TraceId::new("a4");
    let pending = displaced_continuation(&proxy, &first, &TraceId::new("a5")).await;

    let refused = proxy.resume_aggregated(pending, true).await;
    assert_eq!(refused.status_code(), 500);
    assert_eq!(refused.body()["error"]["type"], "internal_error");
    assert!(refused.body()["error"]["message"].as_str().unwrap().contains("rate limit"));
    assert!(proxy.take_pending(&ToolCallId::new("call_1")).is_none());
    let dropped = audit.events().into_iter().last().expect("audit event");
    assert_eq!(dropped.event, AuditEventKind::ToolApprovalDropped);
    assert_eq!(dropped.trace_id, first);
    assert_eq!(dropped.metadata["tool_call_id"], "call_1");
}

#[tokio::test]
async fn refused_stream_resume_that_cannot_be_parked_again_ends_with_an_error() {
    let upstream = Arc::new(
        ScriptedUpstream::new()
            .with_response(tool_completion(&[("call_1", "deploy", "{}")]))
            .with_response(tool_completion(&[("call_2", "deploy", "{}")])),
    );
    let mut admission = open_admission();
    admission.rate_limit_count = 1;
    let audit = Arc::new(RecordingAudit::default());
    let proxy = single_slot_proxy(upstream, admission, Arc::clone(&audit));
    let pending =
        displaced_continuation(&proxy, &TraceId::new("s6"), &TraceId::new("s7")).await;

    let (tx, rx) = mpsc::channel(64);
    let outcome = proxy.resume_stream(pending, true, tx).await;
    assert_eq!(outcome, RequestOutcome::Failed);
    let frames = collect(rx).await;
    let types: Vec<&str> = frames.iter().map(|frame| event_type(frame)).collect();
    assert_eq!(types, vec!["error", "sentinel"]);
    assert_eq!(event_data(&frames[0])["error"]["type"], "internal_error");
    assert_eq!(audit.kinds().last(), Some(&AuditEventKind::ToolApprovalDropped));
}
