// crates/chatgate-core/src/core/messages.rs
// ============================================================================
// Module: Chatgate Chat Messages
// Description: OpenAI-compatible chat request, response, and chunk models.
// Purpose: Parse just enough of the chat-completion wire format to drive the
//          tool loop while passing unknown fields through untouched.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! The proxy is not the owner of the chat-completion schema; it only needs
//! roles, content, tool calls, and finish reasons. Every other field is kept
//! in a flattened `extra` map and forwarded verbatim to the upstream gateway.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::core::identifiers::ToolCallId;
use crate::core::tooling::ToolCall;
use crate::core::tooling::ToolCallAccumulator;
use crate::core::tooling::ToolCallDelta;
use crate::core::tooling::ToolExecutionResult;
use crate::interfaces::UpstreamError;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// System role label.
pub const ROLE_SYSTEM: &str = "system";
/// User role label.
pub const ROLE_USER: &str = "user";
/// Assistant role label.
pub const ROLE_ASSISTANT: &str = "assistant";
/// Tool result role label.
pub const ROLE_TOOL: &str = "tool";

// ============================================================================
// SECTION: Messages
// ============================================================================

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message role (`system`, `user`, `assistant`, `tool`, ...).
    pub role: String,
    /// Message content; a string or an array of content parts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    /// Tool calls requested by an assistant message.
    #[serde(
        default,
        deserialize_with = "deserialize_tool_calls",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,
    /// Call answered by a tool message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<ToolCallId>,
    /// Fields the proxy does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatMessage {
    /// Creates a text message with the given role.
    #[must_use]
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(Value::String(content.into())),
            tool_calls: Vec::new(),
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ROLE_USER, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ROLE_ASSISTANT, content)
    }

    /// Creates an assistant message that requests tool calls.
    #[must_use]
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: ROLE_ASSISTANT.to_string(),
            content: content.map(Value::String),
            tool_calls,
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    /// Creates the tool message answering `call_id`.
    #[must_use]
    pub fn tool_result(call_id: &ToolCallId, result: &ToolExecutionResult) -> Self {
        Self {
            role: ROLE_TOOL.to_string(),
            content: Some(Value::String(result.message_content())),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.clone()),
            extra: Map::new(),
        }
    }

    /// Returns the content when it is plain text.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_ref().and_then(Value::as_str)
    }
}

/// Reads `tool_calls`, treating an explicit `null` as empty.
fn deserialize_tool_calls<'de, D>(deserializer: D) -> Result<Vec<ToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Inbound chat-completion request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    /// Model identifier, forwarded as-is.
    pub model: String,
    /// Conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Whether the caller wants an event stream.
    #[serde(default)]
    pub stream: bool,
    /// Trace identifier supplied in the body (the header takes precedence).
    #[serde(default, skip_serializing)]
    pub trace_id: Option<String>,
    /// Fields the proxy does not interpret (`temperature`, `tools`, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletionRequest {
    /// Creates a request with the given model and messages.
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Self::default()
        }
    }

    /// Returns the response mode requested by the caller.
    #[must_use]
    pub const fn mode(&self) -> ResponseMode {
        ResponseMode::from_stream_flag(self.stream)
    }

    /// Returns true when the request already declares tools.
    #[must_use]
    pub fn declares_tools(&self) -> bool {
        self.extra.get("tools").is_some_and(|tools| !tools.is_null())
    }

    /// Builds the JSON payload sent to the upstream gateway.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] when the request cannot be serialized.
    pub fn upstream_payload(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// How the caller receives the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Ordered event stream terminated by a sentinel.
    Streaming,
    /// One aggregated JSON response.
    Aggregated,
}

impl ResponseMode {
    /// Maps the request `stream` flag to a mode.
    #[must_use]
    pub const fn from_stream_flag(stream: bool) -> Self {
        if stream { Self::Streaming } else { Self::Aggregated }
    }

    /// Returns true for [`ResponseMode::Streaming`].
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        matches!(self, Self::Streaming)
    }
}

// ============================================================================
// SECTION: Finish Reasons
// ============================================================================

/// Why the upstream model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    /// Natural end of the answer.
    Stop,
    /// Token limit reached.
    Length,
    /// The model wants tools invoked.
    ToolCalls,
    /// Output withheld by a content filter.
    ContentFilter,
    /// Any other gateway-specific reason.
    Other(String),
    /// No reason reported.
    Unknown,
}

impl FinishReason {
    /// Parses the wire label.
    #[must_use]
    pub fn parse(label: Option<&str>) -> Self {
        match label {
            None => Self::Unknown,
            Some("stop") => Self::Stop,
            Some("length") => Self::Length,
            Some("tool_calls" | "function_call") => Self::ToolCalls,
            Some("content_filter") => Self::ContentFilter,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    /// Returns true when the model asked for tool invocation.
    #[must_use]
    pub const fn is_tool_calls(&self) -> bool {
        matches!(self, Self::ToolCalls)
    }

    /// Returns the wire label.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
            Self::Other(label) => label,
            Self::Unknown => "unknown",
        }
    }
}

// ============================================================================
// SECTION: Upstream Responses
// ============================================================================

/// Parsed non-streaming upstream completion.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    /// First choice message.
    pub message: ChatMessage,
    /// First choice finish reason.
    pub finish_reason: FinishReason,
    /// Raw completion body, returned to aggregated callers.
    pub body: Value,
}

impl UpstreamResponse {
    /// Parses a completion body.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Decode`] when the body has no usable choice.
    pub fn from_body(body: Value) -> Result<Self, UpstreamError> {
        let choice = first_choice(&body)
            .ok_or_else(|| UpstreamError::Decode("completion missing choices".to_string()))?;
        let message = choice
            .get("message")
            .cloned()
            .ok_or_else(|| UpstreamError::Decode("completion choice missing message".to_string()))?;
        let message: ChatMessage =
            serde_json::from_value(message).map_err(|err| UpstreamError::Decode(err.to_string()))?;
        let finish_reason =
            FinishReason::parse(choice.get("finish_reason").and_then(Value::as_str));
        Ok(Self {
            message,
            finish_reason,
            body,
        })
    }

    /// Builds a completion body around one assistant message.
    #[must_use]
    pub fn completion_body(model: &str, message: &ChatMessage, finish_reason: &str) -> Value {
        json!({
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": message,
                "finish_reason": finish_reason,
            }],
        })
    }
}

/// One decoded upstream stream chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamChunk {
    /// Content text carried by the delta.
    pub content: Option<String>,
    /// Tool call fragments carried by the delta.
    pub tool_calls: Vec<ToolCallDelta>,
    /// Finish reason when the chunk closes the choice.
    pub finish_reason: Option<FinishReason>,
    /// Raw chunk body, forwarded to streaming callers.
    pub body: Value,
}

impl UpstreamChunk {
    /// Decodes a chunk body. Chunks without choices (usage trailers) decode
    /// to an empty chunk.
    #[must_use]
    pub fn from_body(body: Value) -> Self {
        let mut content = None;
        let mut tool_calls = Vec::new();
        let mut finish_reason = None;
        if let Some(choice) = first_choice(&body) {
            if let Some(delta) = choice.get("delta") {
                content = delta.get("content").and_then(Value::as_str).map(str::to_string);
                if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
                    tool_calls = calls
                        .iter()
                        .enumerate()
                        .map(|(position, call)| parse_tool_call_delta(position, call))
                        .collect();
                }
            }
            finish_reason = choice
                .get("finish_reason")
                .and_then(Value::as_str)
                .map(|label| FinishReason::parse(Some(label)));
        }
        Self {
            content,
            tool_calls,
            finish_reason,
            body,
        }
    }

    /// Builds a chunk carrying content text.
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self::from_body(chunk_body(&json!({"content": content}), None))
    }

    /// Builds a chunk carrying one complete tool call fragment.
    #[must_use]
    pub fn tool_call(index: usize, id: &str, name: &str, arguments: &str) -> Self {
        Self::from_body(chunk_body(
            &json!({
                "tool_calls": [{
                    "index": index,
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments},
                }]
            }),
            None,
        ))
    }

    /// Builds a chunk that only closes the choice.
    #[must_use]
    pub fn finish(reason: &str) -> Self {
        Self::from_body(chunk_body(&json!({}), Some(reason)))
    }

    /// Returns true when the chunk can be relayed to a streaming caller
    /// before the loop knows whether it will run tools.
    ///
    /// Content and non-tool finish markers qualify; tool call fragments and
    /// the `tool_calls` finish marker do not.
    #[must_use]
    pub fn is_forwardable(&self) -> bool {
        let has_content = self.content.as_deref().is_some_and(|text| !text.is_empty());
        let closes_answer =
            self.finish_reason.as_ref().is_some_and(|reason| !reason.is_tool_calls());
        has_content || closes_answer
    }

    /// Returns true when the chunk carries content, tool call fragments, or
    /// a finish marker.
    #[must_use]
    pub fn carries_payload(&self) -> bool {
        self.content.as_deref().is_some_and(|text| !text.is_empty())
            || !self.tool_calls.is_empty()
            || self.finish_reason.is_some()
    }
}

/// Builds a `chat.completion.chunk` body.
fn chunk_body(delta: &Value, finish_reason: Option<&str>) -> Value {
    json!({
        "object": "chat.completion.chunk",
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason,
        }],
    })
}

/// Returns the first entry of `choices`.
fn first_choice(body: &Value) -> Option<&Value> {
    body.get("choices").and_then(Value::as_array).and_then(|choices| choices.first())
}

/// Parses one streamed tool call fragment.
fn parse_tool_call_delta(position: usize, call: &Value) -> ToolCallDelta {
    let index = call
        .get("index")
        .and_then(Value::as_u64)
        .and_then(|index| usize::try_from(index).ok())
        .unwrap_or(position);
    let function = call.get("function");
    let arguments = function.and_then(|function| function.get("arguments")).and_then(|value| {
        match value {
            Value::String(text) => Some(text.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    });
    ToolCallDelta {
        index,
        id: call.get("id").and_then(Value::as_str).map(str::to_string),
        name: function
            .and_then(|function| function.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string),
        arguments,
    }
}

// ============================================================================
// SECTION: Stream Assembly
// ============================================================================

/// Folds streamed chunks back into one assistant message.
#[derive(Debug, Default)]
pub struct StreamAssembly {
    /// Concatenated content text.
    content: String,
    /// Tool call fragments.
    tool_calls: ToolCallAccumulator,
    /// Last finish reason observed.
    finish_reason: Option<FinishReason>,
}

impl StreamAssembly {
    /// Folds one chunk.
    pub fn push(&mut self, chunk: &UpstreamChunk) {
        if let Some(text) = &chunk.content {
            self.content.push_str(text);
        }
        for delta in &chunk.tool_calls {
            self.tool_calls.apply(delta);
        }
        if let Some(reason) = &chunk.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
    }

    /// Returns the assembled assistant message and finish reason.
    ///
    /// A stream that never reported a finish reason is treated as a tool
    /// call turn when fragments were seen, and as a stop otherwise.
    #[must_use]
    pub fn finish(self) -> (ChatMessage, FinishReason) {
        let tool_calls = self.tool_calls.finish();
        let finish_reason = self.finish_reason.unwrap_or_else(|| {
            if tool_calls.is_empty() { FinishReason::Stop } else { FinishReason::ToolCalls }
        });
        let content = if self.content.is_empty() { None } else { Some(self.content) };
        (ChatMessage::assistant_tool_calls(content, tool_calls), finish_reason)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
