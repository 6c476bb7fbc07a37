// crates/chatgate-server/src/server.rs
// ============================================================================
// Module: Chatgate HTTP Server
// Description: axum transport for chat completions, approvals, and health.
// Purpose: Expose the chat proxy over HTTP with streaming and JSON replies.
// Dependencies: chatgate-core, chatgate-config, axum, tokio
// ============================================================================

//! ## Overview
//! Routes:
//! - `POST /v1/chat/completions`: event stream when `stream` is true, one
//!   JSON body otherwise.
//! - `POST /v1/approvals/{call_id}`: resumes a parked tool call with
//!   `{"approved": bool, "stream": bool}`.
//! - `GET /healthz`: liveness plus tracked trace and pending approval counts.
//!
//! The trace id comes from the `x-trace-id` header, then the body
//! `trace_id` field, and is generated otherwise; every response echoes it.
//! Streaming work runs on its own task and writes frames to a channel that
//! backs the response body, so a client disconnect drops the receiver and
//! cancels the work. With `localhost_only` set, non-loopback peers get 403.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::convert::Infallible;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::extract::DefaultBodyLimit;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderValue;
use axum::http::StatusCode;
use axum::http::header::CACHE_CONTROL;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chatgate_config::ChatgateConfig;
use chatgate_core::AdmissionController;
use chatgate_core::ApprovalDecision;
use chatgate_core::AuditSink;
use chatgate_core::ChatCompletionRequest;
use chatgate_core::ChatProxy;
use chatgate_core::PendingApproval;
use chatgate_core::PendingApprovals;
use chatgate_core::RequestOutcome;
use chatgate_core::ToolCallId;
use chatgate_core::ToolLoop;
use chatgate_core::ToolRegistry;
use chatgate_core::TraceId;
use chatgate_core::UpstreamGateway;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::audit::audit_sink_from_config;
use crate::registry::HttpToolRegistry;
use crate::registry::NoToolRegistry;
use crate::telemetry::NoopMetrics;
use crate::telemetry::ProxyMetricEvent;
use crate::telemetry::ProxyMetrics;
use crate::telemetry::ProxyRoute;
use crate::upstream::HttpUpstreamGateway;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the trace id on requests and responses.
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Longest accepted trace id.
const MAX_TRACE_ID_LENGTH: usize = 128;
/// Buffered frames between a streaming task and the response body.
const FRAME_CHANNEL_CAPACITY: usize = 64;

// ============================================================================
// SECTION: Proxy Server
// ============================================================================

/// Collaborators injected into the server.
pub struct ProxyCollaborators {
    /// Upstream chat gateway.
    pub upstream: Arc<dyn UpstreamGateway>,
    /// Tool registry.
    pub registry: Arc<dyn ToolRegistry>,
    /// Audit sink.
    pub audit: Arc<dyn AuditSink>,
    /// Metrics sink.
    pub metrics: Arc<dyn ProxyMetrics>,
}

/// Chatgate HTTP server instance.
pub struct ProxyServer {
    /// Configured bind address.
    bind: SocketAddr,
    /// Shared handler state.
    state: Arc<ServerState>,
}

impl ProxyServer {
    /// Builds a server and its network collaborators from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyServerError`] when the configuration is invalid or a
    /// collaborator cannot be initialized.
    pub fn from_config(config: &ChatgateConfig) -> Result<Self, ProxyServerError> {
        config.validate().map_err(|err| ProxyServerError::Config(err.to_string()))?;
        let api_key = match &config.upstream.api_key_env {
            Some(name) => Some(env::var(name).map_err(|_| {
                ProxyServerError::Config(format!("upstream api key variable {name} is not set"))
            })?),
            None => None,
        };
        let upstream = HttpUpstreamGateway::from_config(&config.upstream, api_key)
            .map_err(|err| ProxyServerError::Init(err.to_string()))?;
        let registry = HttpToolRegistry::from_config(&config.registry)
            .map_err(|err| ProxyServerError::Init(err.to_string()))?;
        let registry: Arc<dyn ToolRegistry> = match registry {
            Some(registry) => Arc::new(registry),
            None => Arc::new(NoToolRegistry),
        };
        let audit = audit_sink_from_config(&config.audit)
            .map_err(|err| ProxyServerError::Init(err.to_string()))?;
        Self::with_collaborators(
            config,
            ProxyCollaborators {
                upstream: Arc::new(upstream),
                registry,
                audit,
                metrics: Arc::new(NoopMetrics),
            },
        )
    }

    /// Builds a server around caller-provided collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyServerError::Config`] when the bind address is invalid.
    pub fn with_collaborators(
        config: &ChatgateConfig,
        collaborators: ProxyCollaborators,
    ) -> Result<Self, ProxyServerError> {
        let bind =
            config.server.bind_addr().map_err(|err| ProxyServerError::Config(err.to_string()))?;
        let admission = Arc::new(AdmissionController::new(
            config.admission_config(),
            Arc::clone(&collaborators.audit),
        ));
        let pending = Arc::new(PendingApprovals::new(config.tools.max_pending_approvals));
        let tool_loop = ToolLoop::new(
            collaborators.upstream,
            collaborators.registry,
            config.approval_policy(),
            config.loop_config(),
            pending,
            collaborators.audit,
        );
        let state = Arc::new(ServerState {
            proxy: ChatProxy::new(admission, tool_loop),
            metrics: collaborators.metrics,
            localhost_only: config.server.localhost_only,
            max_body_bytes: config.server.max_body_bytes,
        });
        Ok(Self {
            bind,
            state,
        })
    }

    /// Returns the configured bind address.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        self.bind
    }

    /// Builds the axum router.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/v1/chat/completions", post(handle_chat_completions))
            .route("/v1/approvals/{call_id}", post(handle_approval))
            .route("/healthz", get(handle_health))
            .layer(DefaultBodyLimit::max(self.state.max_body_bytes))
            .with_state(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until the server fails.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ProxyServerError> {
        let listener = TcpListener::bind(self.bind)
            .await
            .map_err(|err| ProxyServerError::Transport(format!("http bind failed: {err}")))?;
        self.serve_with_listener(listener).await
    }

    /// Serves on an already bound listener.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyServerError::Transport`] when serving fails.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<(), ProxyServerError> {
        let app = self.router();
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .map_err(|_| ProxyServerError::Transport("http server failed".to_string()))
    }
}

/// Shared state for HTTP handlers.
struct ServerState {
    /// Transport-independent chat proxy.
    proxy: ChatProxy,
    /// Metrics sink.
    metrics: Arc<dyn ProxyMetrics>,
    /// Refuse non-loopback peers.
    localhost_only: bool,
    /// Maximum request body size.
    max_body_bytes: usize,
}

impl ServerState {
    /// Returns true when the peer may use the proxy.
    fn peer_allowed(&self, peer: SocketAddr) -> bool {
        !self.localhost_only || peer.ip().is_loopback()
    }

    /// Records request metrics.
    fn record(
        &self,
        route: ProxyRoute,
        streaming: bool,
        outcome: RequestOutcome,
        trace_id: TraceId,
        latency: Duration,
    ) {
        let event = ProxyMetricEvent {
            route,
            streaming,
            outcome,
            trace_id,
        };
        self.metrics.record_request(event.clone());
        self.metrics.record_latency(event, latency);
    }
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Handles `POST /v1/chat/completions`.
async fn handle_chat_completions(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Response {
    if !state.peer_allowed(peer) {
        return forbidden();
    }
    let request: ChatCompletionRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", &err.to_string());
        }
    };
    let trace_id = match resolve_trace_id(&headers, request.trace_id.as_deref()) {
        Ok(trace_id) => trace_id,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, "invalid_request", message),
    };
    if request.stream {
        return stream_response(
            state,
            StreamJob::Fresh(request),
            trace_id,
            ProxyRoute::ChatCompletions,
        );
    }
    let started = Instant::now();
    let reply = state.proxy.complete(request, &trace_id).await;
    state.record(
        ProxyRoute::ChatCompletions,
        false,
        reply.outcome(),
        trace_id.clone(),
        started.elapsed(),
    );
    json_response(reply.status_code(), &reply.body(), Some(&trace_id))
}

/// Handles `POST /v1/approvals/{call_id}`.
async fn handle_approval(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Path(call_id): Path<String>,
    bytes: Bytes,
) -> Response {
    if !state.peer_allowed(peer) {
        return forbidden();
    }
    let decision: ApprovalDecision = match serde_json::from_slice(&bytes) {
        Ok(decision) => decision,
        Err(err) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", &err.to_string());
        }
    };
    let Some(pending) = state.proxy.take_pending(&ToolCallId::new(call_id)) else {
        return error_response(StatusCode::NOT_FOUND, "not_found", "no pending approval");
    };
    let trace_id = pending.trace_id.clone();
    if decision.stream {
        return stream_response(
            state,
            StreamJob::Resume {
                pending,
                approved: decision.approved,
            },
            trace_id,
            ProxyRoute::Approvals,
        );
    }
    let started = Instant::now();
    let reply = state.proxy.resume_aggregated(pending, decision.approved).await;
    state.record(
        ProxyRoute::Approvals,
        false,
        reply.outcome(),
        trace_id.clone(),
        started.elapsed(),
    );
    json_response(reply.status_code(), &reply.body(), Some(&trace_id))
}

/// Handles `GET /healthz`.
async fn handle_health(
    State(state): State<Arc<ServerState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    if !state.peer_allowed(peer) {
        return forbidden();
    }
    let body = json!({
        "status": "ok",
        "tracked_traces": state.proxy.admission().tracked_traces(),
        "pending_approvals": state.proxy.pending().len(),
    });
    (StatusCode::OK, Json(body)).into_response()
}

// ============================================================================
// SECTION: Streaming
// ============================================================================

/// Work served on an event stream.
enum StreamJob {
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

/// Spawns streaming work and returns the event-stream response.
fn stream_response(
    state: Arc<ServerState>,
    job: StreamJob,
    trace_id: TraceId,
    route: ProxyRoute,
) -> Response {
    let (tx, rx) = mpsc::channel::<String>(FRAME_CHANNEL_CAPACITY);
    let task_trace = trace_id.clone();
    tokio::spawn(async move {
        let started = Instant::now();
        let outcome = match job {
            StreamJob::Fresh(request) => state.proxy.stream(request, &task_trace, tx).await,
            StreamJob::Resume {
                pending,
                approved,
            } => state.proxy.resume_stream(pending, approved, tx).await,
        };
        state.record(route, true, outcome, task_trace, started.elapsed());
    });
    let frames = ReceiverStream::new(rx).map(|frame| Ok::<Bytes, Infallible>(Bytes::from(frame)));
    let mut response = Response::new(Body::from_stream(frames));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    insert_trace_header(headers, &trace_id);
    response
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the request trace id: header first, then body, else generated.
fn resolve_trace_id(
    headers: &HeaderMap,
    body_trace: Option<&str>,
) -> Result<TraceId, &'static str> {
    if let Some(value) = headers.get(TRACE_ID_HEADER) {
        let value = value.to_str().map_err(|_| "invalid trace id header")?.trim();
        if !valid_trace_id(value) {
            return Err("invalid trace id header");
        }
        return Ok(TraceId::new(value));
    }
    if let Some(value) = body_trace {
        let value = value.trim();
        if !valid_trace_id(value) {
            return Err("invalid trace_id field");
        }
        return Ok(TraceId::new(value));
    }
    Ok(generate_trace_id())
}

/// Returns true for non-empty printable ASCII ids within the length limit.
fn valid_trace_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_TRACE_ID_LENGTH
        && value.bytes().all(|byte| byte.is_ascii_graphic())
}

/// Generates a fresh trace id.
fn generate_trace_id() -> TraceId {
    TraceId::new(format!("trace-{:032x}", rand::random::<u128>()))
}

/// Adds the trace header when the id is a valid header value.
fn insert_trace_header(headers: &mut HeaderMap, trace_id: &TraceId) {
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        headers.insert(TRACE_ID_HEADER, value);
    }
}

/// Builds a JSON response with an optional trace header.
fn json_response(status: u16, body: &Value, trace_id: Option<&TraceId>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = (status, Json(body.clone())).into_response();
    if let Some(trace_id) = trace_id {
        insert_trace_header(response.headers_mut(), trace_id);
    }
    response
}

/// Builds an OpenAI-style error response.
fn error_response(status: StatusCode, kind: &str, message: &str) -> Response {
    let body = json!({
        "error": {
            "type": kind,
            "message": message,
        }
    });
    (status, Json(body)).into_response()
}

/// Refuses a non-loopback peer.
fn forbidden() -> Response {
    error_response(StatusCode::FORBIDDEN, "forbidden", "proxy accepts loopback clients only")
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Chatgate server errors.
#[derive(Debug, thiserror::Error)]
pub enum ProxyServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================
