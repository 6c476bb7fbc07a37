// crates/chatgate-core/src/core/tooling.rs
// ============================================================================
// Module: Chatgate Tool Calls
// Description: Tool call records, streamed call assembly, and tool results.
// Purpose: Model the tool traffic exchanged with the upstream model.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`ToolCall`] is what the upstream model asks for; a
//! [`ToolExecutionResult`] is what the tool registry hands back. Tool calls
//! use the OpenAI wire shape (`{id, type, function: {name, arguments}}`) on
//! the wire and a flat shape in memory. Streamed calls arrive as indexed
//! fragments and are assembled by [`ToolCallAccumulator`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::core::hashing::content_hash;
use crate::core::identifiers::ToolCallId;

// ============================================================================
// SECTION: Tool Calls
// ============================================================================

/// Tool invocation requested by the upstream model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireToolCall", into = "WireToolCall")]
pub struct ToolCall {
    /// Model-issued call identifier.
    pub id: ToolCallId,
    /// Tool name.
    pub name: String,
    /// Raw JSON arguments as produced by the model.
    pub arguments: String,
}

impl ToolCall {
    /// Creates a new tool call.
    #[must_use]
    pub fn new(
        id: impl Into<ToolCallId>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// OpenAI wire representation of a tool call.
#[derive(Serialize, Deserialize)]
struct WireToolCall {
    /// Call identifier.
    id: String,
    /// Call type tag (always `function`).
    #[serde(rename = "type", default = "default_call_type")]
    kind: String,
    /// Function payload.
    function: WireFunction,
}

/// OpenAI wire representation of a function invocation.
#[derive(Serialize, Deserialize)]
struct WireFunction {
    /// Function name.
    name: String,
    /// Arguments; a JSON string on the wire, tolerated as an object.
    #[serde(default)]
    arguments: Value,
}

/// Default wire call type.
fn default_call_type() -> String {
    "function".to_string()
}

impl From<WireToolCall> for ToolCall {
    fn from(wire: WireToolCall) -> Self {
        let arguments = match wire.function.arguments {
            Value::String(text) => text,
            Value::Null => "{}".to_string(),
            other => other.to_string(),
        };
        Self {
            id: ToolCallId::new(wire.id),
            name: wire.function.name,
            arguments,
        }
    }
}

impl From<ToolCall> for WireToolCall {
    fn from(call: ToolCall) -> Self {
        Self {
            id: call.id.as_str().to_string(),
            kind: default_call_type(),
            function: WireFunction {
                name: call.name,
                arguments: Value::String(call.arguments),
            },
        }
    }
}

// ============================================================================
// SECTION: Streamed Tool Calls
// ============================================================================

/// Fragment of a tool call carried by one streamed chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolCallDelta {
    /// Position of the call within the assistant message.
    pub index: usize,
    /// Call identifier (usually only on the first fragment).
    pub id: Option<String>,
    /// Tool name (usually only on the first fragment).
    pub name: Option<String>,
    /// Argument text to append.
    pub arguments: Option<String>,
}

/// Partially assembled tool call.
#[derive(Debug, Default)]
struct ToolCallBuilder {
    /// Call identifier seen so far.
    id: Option<String>,
    /// Tool name seen so far.
    name: Option<String>,
    /// Concatenated argument fragments.
    arguments: String,
}

/// Assembles streamed tool call fragments into complete calls.
///
/// # Invariants
/// - Calls are emitted in index order.
/// - Fragments without a tool name never produce a call.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    /// Builders keyed by call index.
    builders: BTreeMap<usize, ToolCallBuilder>,
}

impl ToolCallAccumulator {
    /// Applies one streamed fragment.
    pub fn apply(&mut self, delta: &ToolCallDelta) {
        let builder = self.builders.entry(delta.index).or_default();
        if let Some(id) = &delta.id
            && !id.is_empty()
        {
            builder.id = Some(id.clone());
        }
        if let Some(name) = &delta.name
            && !name.is_empty()
        {
            builder.name = Some(name.clone());
        }
        if let Some(arguments) = &delta.arguments {
            builder.arguments.push_str(arguments);
        }
    }

    /// Returns true when no fragments were applied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }

    /// Finalizes the assembled calls.
    #[must_use]
    pub fn finish(self) -> Vec<ToolCall> {
        self.builders
            .into_iter()
            .filter_map(|(index, builder)| {
                let name = builder.name?;
                let id = builder.id.unwrap_or_else(|| format!("call_{index}"));
                let arguments =
                    if builder.arguments.is_empty() { "{}".to_string() } else { builder.arguments };
                Some(ToolCall::new(id, name, arguments))
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Tool Results
// ============================================================================

/// Output of a tool registry invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    /// Whether the tool reported success.
    pub ok: bool,
    /// Tool output, or the failure description when `ok` is false.
    pub output: String,
    /// Digest of `output` (`sha256:<hex>`).
    pub content_hash: String,
}

impl ToolExecutionResult {
    /// Creates a result and computes its content hash.
    #[must_use]
    pub fn new(ok: bool, output: impl Into<String>) -> Self {
        let output = output.into();
        let content_hash = content_hash(output.as_bytes());
        Self {
            ok,
            output,
            content_hash,
        }
    }

    /// Creates a successful result.
    #[must_use]
    pub fn success(output: impl Into<String>) -> Self {
        Self::new(true, output)
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(false, message)
    }

    /// Result injected when an approver rejects the call.
    #[must_use]
    pub fn denied() -> Self {
        Self::failure("tool call denied by approver")
    }

    /// Renders the result as tool message content for the next upstream call.
    ///
    /// Successful output is passed through verbatim; failures are wrapped so
    /// the model can tell them apart from real output.
    #[must_use]
    pub fn message_content(&self) -> String {
        if self.ok {
            self.output.clone()
        } else {
            json!({
                "ok": false,
                "error": self.output,
                "content_hash": self.content_hash,
            })
            .to_string()
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
