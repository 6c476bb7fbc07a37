// crates/chatgate-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Fixtures
// Description: In-process upstream gateway, tool registry, and proxy.
// Purpose: Drive the HTTP proxy end to end over loopback listeners.
// ============================================================================

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use chatgate_config::ChatgateConfig;
use chatgate_server::ProxyServer;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;

/// Scripted upstream gateway state.
#[derive(Clone, Default)]
pub struct UpstreamScript {
    /// Aggregated responses, served in order; the last one repeats.
    responses: Arc<Vec<Value>>,
    /// Raw SSE body served to streaming calls.
    stream_body: Arc<String>,
    /// Received payloads.
    payloads: Arc<Mutex<Vec<Value>>>,
    /// Number of calls served.
    calls: Arc<AtomicUsize>,
}

impl UpstreamScript {
    /// Creates a script serving `responses` and `stream_body`.
    pub fn new(responses: Vec<Value>, stream_body: &str) -> Self {
        Self {
            responses: Arc::new(responses),
            stream_body: Arc::new(stream_body.to_string()),
            ..Self::default()
        }
    }

    /// Returns how many upstream calls were served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the payloads received so far.
    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

/// Recorded tool registry invocations.
#[derive(Clone, Default)]
pub struct RegistryLog {
    /// Received call bodies.
    calls: Arc<Mutex<Vec<Value>>>,
}

impl RegistryLog {
    /// Returns the received call bodies.
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }
}

/// Builds a non-streaming completion body with text content.
pub fn text_completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

/// Builds a non-streaming completion body requesting one tool call.
pub fn tool_completion(call_id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "model": "test-model",
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": call_id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

/// Builds an SSE body streaming `content` and a stop chunk.
pub fn text_stream(content: &str) -> String {
    let delta = json!({"choices": [{"index": 0, "delta": {"content": content}}]});
    let stop = json!({"choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]});
    format!("data: {delta}\n\ndata: {stop}\n\ndata: [DONE]\n\n")
}

/// Serves the scripted upstream on a loopback port.
pub async fn spawn_upstream(script: UpstreamScript) -> String {
    let app =
        Router::new().route("/v1/chat/completions", post(upstream_handler)).with_state(script);
    spawn_router(app).await
}

/// Serves a tool registry that answers every call with `ok`.
pub async fn spawn_registry(log: RegistryLog) -> String {
    let app = Router::new()
        .route("/tools/call", post(registry_call))
        .route("/tools/list", get(registry_list))
        .with_state(log);
    spawn_router(app).await
}

/// Serves the proxy for `config` on a loopback port.
pub async fn spawn_proxy(config: &ChatgateConfig) -> String {
    let server = ProxyServer::from_config(config).expect("proxy server");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind proxy");
    let addr = listener.local_addr().expect("proxy addr");
    tokio::spawn(server.serve_with_listener(listener));
    format!("http://{addr}")
}

/// Returns a config pointing at the given upstream and registry.
pub fn proxy_config(upstream: &str, registry: Option<&str>) -> ChatgateConfig {
    let mut config = ChatgateConfig::default();
    config.server.bind = "127.0.0.1:0".to_string();
    config.upstream.base_url = upstream.to_string();
    config.registry.base_url = registry.map(str::to_string);
    config.audit.enabled = false;
    config.admission.rate_limit_count = 0;
    config.admission.concurrency_wait_seconds = 1.0;
    config
}

/// Returns a user chat request body.
pub fn chat_body(stream: bool) -> Value {
    json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": stream
    })
}

/// Splits an SSE body into `(event, data)` pairs; the sentinel has event "".
pub fn parse_frames(body: &str) -> Vec<(String, String)> {
    body.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            let mut event = String::new();
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(rest) = line.strip_prefix("event: ") {
                    event = rest.to_string();
                } else if let Some(rest) = line.strip_prefix("data: ") {
                    data = rest.to_string();
                }
            }
            (event, data)
        })
        .collect()
}

async fn spawn_router(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fixture");
    let addr: SocketAddr = listener.local_addr().expect("fixture addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

async fn upstream_handler(
    State(script): State<UpstreamScript>,
    Json(payload): Json<Value>,
) -> Response {
    let index = script.calls.fetch_add(1, Ordering::SeqCst);
    let streaming = payload.get("stream").and_then(Value::as_bool).unwrap_or(false);
    script.payloads.lock().unwrap().push(payload);
    if streaming {
        return ([(CONTENT_TYPE, "text/event-stream")], script.stream_body.to_string())
            .into_response();
    }
    let last = script.responses.len().saturating_sub(1);
    let body = script.responses.get(index.min(last)).cloned().unwrap_or(Value::Null);
    Json(body).into_response()
}

async fn registry_call(State(log): State<RegistryLog>, Json(body): Json<Value>) -> Json<Value> {
    let name = body.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
    log.calls.lock().unwrap().push(body);
    Json(json!({"ok": true, "output": format!("{name} done")}))
}

async fn registry_list() -> Json<Value> {
    Json(json!({"tools": []}))
}
