// crates/chatgate-core/tests/common/mod.rs
// ============================================================================
// Module: Chatgate Core Test Fixtures
// Description: In-memory upstream, registry, and audit fakes.
// Purpose: Drive the runtime without network collaborators.
// Dependencies: chatgate-core
// ============================================================================

//! ## Overview
//! Shared fakes for core integration tests: a scripted upstream gateway, a
//! fixed-result tool registry, a registry that never returns, and an audit
//! sink that keeps every event.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::unwrap_in_result,
    reason = "Test fixtures favor direct unwraps for setup clarity."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use chatgate_core::ApprovalPolicy;
use chatgate_core::AuditEvent;
use chatgate_core::AuditEventKind;
use chatgate_core::AuditSink;
use chatgate_core::ChatCompletionRequest;
use chatgate_core::ChatMessage;
use chatgate_core::ChunkStream;
use chatgate_core::LoopConfig;
use chatgate_core::PendingApprovals;
use chatgate_core::ToolExecutionResult;
use chatgate_core::ToolLoop;
use chatgate_core::ToolRegistry;
use chatgate_core::ToolRegistryError;
use chatgate_core::TraceId;
use chatgate_core::UpstreamChunk;
use chatgate_core::UpstreamError;
use chatgate_core::UpstreamGateway;
use chatgate_core::UpstreamResponse;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Upstream
// ============================================================================

/// Upstream fake that replays scripted bodies and chunk streams.
#[derive(Default)]
pub struct ScriptedUpstream {
    responses: Mutex<VecDeque<Result<Value, UpstreamError>>>,
    streams: Mutex<VecDeque<Vec<UpstreamChunk>>>,
    repeat: Option<Value>,
    payloads: Mutex<Vec<Value>>,
}

impl ScriptedUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every non-streaming call with `body`.
    pub fn repeating(body: Value) -> Self {
        Self {
            repeat: Some(body),
            ..Self::default()
        }
    }

    pub fn with_response(self, body: Value) -> Self {
        self.responses.lock().unwrap().push_back(Ok(body));
        self
    }

    pub fn with_failure(self, err: UpstreamError) -> Self {
        self.responses.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn with_stream(self, chunks: Vec<UpstreamChunk>) -> Self {
        self.streams.lock().unwrap().push_back(chunks);
        self
    }

    pub fn calls(&self) -> usize {
        self.payloads.lock().unwrap().len()
    }

    pub fn payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }

    fn next_body(&self) -> Result<Value, UpstreamError> {
        if let Some(next) = self.responses.lock().unwrap().pop_front() {
            return next;
        }
        self.repeat
            .clone()
            .ok_or_else(|| UpstreamError::Transport("script exhausted".to_string()))
    }
}

#[async_trait]
impl UpstreamGateway for ScriptedUpstream {
    async fn call_once(
        &self,
        payload: Value,
        _trace_id: &TraceId,
    ) -> Result<UpstreamResponse, UpstreamError> {
        self.payloads.lock().unwrap().push(payload);
        UpstreamResponse::from_body(self.next_body()?)
    }

    async fn call_streaming(
        &self,
        payload: Value,
        _trace_id: &TraceId,
    ) -> Result<ChunkStream, UpstreamError> {
        self.payloads.lock().unwrap().push(payload);
        let chunks = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| UpstreamError::Transport("script exhausted".to_string()))?;
        Ok(Box::pin(tokio_stream::iter(chunks.into_iter().map(Ok))))
    }
}

// ============================================================================
// SECTION: Tool Registry
// ============================================================================

/// Registry fake with fixed per-tool results.
#[derive(Default)]
pub struct FakeRegistry {
    results: BTreeMap<String, ToolExecutionResult>,
    definitions: Vec<Value>,
    definitions_error: Option<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, name: &str, output: &str) -> Self {
        self.results.insert(name.to_string(), ToolExecutionResult::success(output));
        self
    }

    pub fn with_definitions(mut self, definitions: Vec<Value>) -> Self {
        self.definitions = definitions;
        self
    }

    pub fn with_definitions_failure(mut self, message: &str) -> Self {
        self.definitions_error = Some(message.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRegistry for FakeRegistry {
    async fn call_tool(
        &self,
        name: &str,
        arguments: &str,
        _trace_id: &TraceId,
    ) -> Result<ToolExecutionResult, ToolRegistryError> {
        self.calls.lock().unwrap().push((name.to_string(), arguments.to_string()));
        self.results
            .get(name)
            .cloned()
            .ok_or_else(|| ToolRegistryError::UnknownTool(name.to_string()))
    }

    async fn tool_definitions(&self, _trace_id: &TraceId) -> Result<Vec<Value>, ToolRegistryError> {
        match &self.definitions_error {
            Some(message) => Err(ToolRegistryError::Unavailable(message.clone())),
            None => Ok(self.definitions.clone()),
        }
    }
}

/// Registry whose tools never return.
pub struct StallingRegistry;

#[async_trait]
impl ToolRegistry for StallingRegistry {
    async fn call_tool(
        &self,
        _name: &str,
        _arguments: &str,
        _trace_id: &TraceId,
    ) -> Result<ToolExecutionResult, ToolRegistryError> {
        std::future::pending().await
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event.
#[derive(Default)]
pub struct RecordingAudit {
    events: Mutex<Vec<AuditEvent>>,
}

impl RecordingAudit {
    pub fn kinds(&self) -> Vec<AuditEventKind> {
        self.events.lock().unwrap().iter().map(|event| event.event).collect()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Completion body with a final text answer.
pub fn text_completion(content: &str) -> Value {
    json!({
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

/// Completion body requesting the given `(id, name, arguments)` tool calls.
pub fn tool_completion(calls: &[(&str, &str, &str)]) -> Value {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, arguments)| {
            json!({
                "id": id,
                "type": "function",
                "function": {"name": name, "arguments": arguments}
            })
        })
        .collect();
    json!({
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": null, "tool_calls": tool_calls},
            "finish_reason": "tool_calls"
        }]
    })
}

/// Single-message user request.
pub fn user_request(stream: bool) -> ChatCompletionRequest {
    let mut request = ChatCompletionRequest::new("test-model", vec![ChatMessage::user("hello")]);
    request.stream = stream;
    request
}

/// Tool loop with a 16-entry approval store.
pub fn tool_loop(
    upstream: Arc<dyn UpstreamGateway>,
    registry: Arc<dyn ToolRegistry>,
    policy: ApprovalPolicy,
    max_tool_iterations: u32,
    audit: Arc<dyn AuditSink>,
) -> ToolLoop {
    ToolLoop::new(
        upstream,
        registry,
        policy,
        LoopConfig {
            auto_tools: true,
            max_tool_iterations,
        },
        Arc::new(PendingApprovals::new(16)),
        audit,
    )
}
