// crates/chatgate-server/src/registry.rs
// ============================================================================
// Module: Tool Registry Client
// Description: JSON-over-HTTP client for the external tool registry.
// Purpose: Implement the core tool registry trait over reqwest.
// Dependencies: chatgate-core, reqwest, serde
// ============================================================================

//! ## Overview
//! [`HttpToolRegistry`] invokes tools with `POST {base}{call_path}` carrying
//! `{"name", "arguments", "trace_id"}` and expects `{"ok", "output"}` back.
//! Tool definitions come from `GET {base}{list_path}` as `{"tools": [...]}`.
//! A `404` from the call endpoint means the registry does not know the tool.
//! [`NoToolRegistry`] stands in when no registry is configured; every call
//! fails and the tool loop records that as a failed tool result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use chatgate_config::RegistryConfig;
use chatgate_core::ToolExecutionResult;
use chatgate_core::ToolRegistry;
use chatgate_core::ToolRegistryError;
use chatgate_core::TraceId;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::server::TRACE_ID_HEADER;

// ============================================================================
// SECTION: Wire Types
// ============================================================================

/// Tool invocation request body.
#[derive(Serialize)]
struct ToolCallRequest<'a> {
    /// Tool name.
    name: &'a str,
    /// Raw JSON arguments produced by the model.
    arguments: &'a str,
    /// Trace identifier.
    trace_id: &'a str,
}

/// Tool invocation response body.
#[derive(Deserialize)]
struct ToolCallResponse {
    /// Whether the tool reported success.
    ok: bool,
    /// Tool output; non-string output is re-encoded as JSON text.
    #[serde(default)]
    output: Value,
    /// Failure description when `ok` is false.
    #[serde(default)]
    error: Option<String>,
}

/// Tool listing response body.
#[derive(Deserialize)]
struct ToolListResponse {
    /// OpenAI `tools` entries.
    #[serde(default)]
    tools: Vec<Value>,
}

// ============================================================================
// SECTION: HTTP Registry
// ============================================================================

/// HTTP tool registry client.
pub struct HttpToolRegistry {
    /// Tool invocation URL.
    call_url: String,
    /// Tool listing URL.
    list_url: String,
    /// HTTP client with configured timeouts.
    client: Client,
}

impl HttpToolRegistry {
    /// Creates a registry client.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Unavailable`] when the HTTP client cannot
    /// be built.
    pub fn new(
        base_url: &str,
        call_path: &str,
        list_path: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ToolRegistryError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|err| ToolRegistryError::Unavailable(err.to_string()))?;
        let base_url = base_url.trim_end_matches('/');
        Ok(Self {
            call_url: format!("{base_url}{call_path}"),
            list_url: format!("{base_url}{list_path}"),
            client,
        })
    }

    /// Creates a registry client from configuration, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ToolRegistryError::Unavailable`] when the HTTP client cannot
    /// be built.
    pub fn from_config(config: &RegistryConfig) -> Result<Option<Self>, ToolRegistryError> {
        config
            .base_url
            .as_deref()
            .map(|base_url| {
                Self::new(
                    base_url,
                    &config.call_path,
                    &config.list_path,
                    Duration::from_millis(config.connect_timeout_ms),
                    Duration::from_millis(config.request_timeout_ms),
                )
            })
            .transpose()
    }
}

/// Builds the trace header for registry requests.
fn trace_headers(trace_id: &TraceId) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        headers.insert(TRACE_ID_HEADER, value);
    }
    headers
}

#[async_trait]
impl ToolRegistry for HttpToolRegistry {
    async fn call_tool(
        &self,
        name: &str,
        arguments: &str,
        trace_id: &TraceId,
    ) -> Result<ToolExecutionResult, ToolRegistryError> {
        let request = ToolCallRequest {
            name,
            arguments,
            trace_id: trace_id.as_str(),
        };
        let response = self
            .client
            .post(&self.call_url)
            .headers(trace_headers(trace_id))
            .json(&request)
            .send()
            .await
            .map_err(|err| ToolRegistryError::Unavailable(err.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => return Err(ToolRegistryError::UnknownTool(name.to_string())),
            status if !status.is_success() => {
                return Err(ToolRegistryError::Unavailable(format!(
                    "registry returned status {}",
                    status.as_u16()
                )));
            }
            _ => {}
        }
        let body: ToolCallResponse =
            response.json().await.map_err(|err| ToolRegistryError::Protocol(err.to_string()))?;
        let output = match (body.output, body.error) {
            (Value::String(text), _) => text,
            (Value::Null, Some(error)) => error,
            (Value::Null, None) => String::new(),
            (other, _) => other.to_string(),
        };
        Ok(ToolExecutionResult::new(body.ok, output))
    }

    async fn tool_definitions(&self, trace_id: &TraceId) -> Result<Vec<Value>, ToolRegistryError> {
        let response = self
            .client
            .get(&self.list_url)
            .headers(trace_headers(trace_id))
            .send()
            .await
            .map_err(|err| ToolRegistryError::Unavailable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ToolRegistryError::Unavailable(format!(
                "registry returned status {}",
                response.status().as_u16()
            )));
        }
        let body: ToolListResponse =
            response.json().await.map_err(|err| ToolRegistryError::Protocol(err.to_string()))?;
        Ok(body.tools)
    }
}

// ============================================================================
// SECTION: Absent Registry
// ============================================================================

/// Registry used when none is configured.
pub struct NoToolRegistry;

#[async_trait]
impl ToolRegistry for NoToolRegistry {
    async fn call_tool(
        &self,
        _name: &str,
        _arguments: &str,
        _trace_id: &TraceId,
    ) -> Result<ToolExecutionResult, ToolRegistryError> {
        Err(ToolRegistryError::Unavailable("no tool registry configured".to_string()))
    }
}
