// crates/chatgate-server/src/upstream.rs
// ============================================================================
// Module: Upstream Gateway Client
// Description: OpenAI-compatible HTTP client for the upstream gateway.
// Purpose: Implement the core gateway trait over reqwest with SSE decoding.
// Dependencies: chatgate-core, reqwest, tokio, tokio-stream
// ============================================================================

//! ## Overview
//! [`HttpUpstreamGateway`] posts chat-completion payloads to the upstream
//! gateway. Aggregated calls decode one JSON body. Streaming calls decode the
//! gateway's server-sent events with [`SseDecoder`] on a background task and
//! hand chunks to the caller through a channel; the task stops as soon as the
//! caller drops the stream. Every call carries the trace id in `x-trace-id`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use chatgate_config::UpstreamConfig;
use chatgate_core::ChunkStream;
use chatgate_core::TraceId;
use chatgate_core::UpstreamChunk;
use chatgate_core::UpstreamError;
use chatgate_core::UpstreamGateway;
use chatgate_core::UpstreamResponse;
use reqwest::Client;
use reqwest::Response;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::server::TRACE_ID_HEADER;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Sentinel payload that ends an upstream event stream.
const UPSTREAM_DONE: &str = "[DONE]";
/// Longest error excerpt kept from a failed upstream response.
const MAX_ERROR_EXCERPT: usize = 512;
/// Buffered chunks between the decoder task and the consumer.
const CHUNK_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// SECTION: Gateway
// ============================================================================

/// HTTP upstream gateway client.
pub struct HttpUpstreamGateway {
    /// Full chat-completions endpoint URL.
    endpoint: String,
    /// Optional bearer token.
    api_key: Option<String>,
    /// HTTP client with configured timeouts.
    client: Client,
}

impl HttpUpstreamGateway {
    /// Creates a gateway client.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn new(
        base_url: &str,
        chat_path: &str,
        api_key: Option<String>,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;
        let endpoint = format!("{}{chat_path}", base_url.trim_end_matches('/'));
        Ok(Self {
            endpoint,
            api_key,
            client,
        })
    }

    /// Creates a gateway client from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] when the HTTP client cannot be
    /// built.
    pub fn from_config(
        config: &UpstreamConfig,
        api_key: Option<String>,
    ) -> Result<Self, UpstreamError> {
        Self::new(
            &config.base_url,
            &config.chat_path,
            api_key,
            Duration::from_millis(config.connect_timeout_ms),
            Duration::from_millis(config.request_timeout_ms),
        )
    }

    /// Returns the chat-completions endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Builds request headers.
    fn build_headers(&self, trace_id: &TraceId) -> Result<HeaderMap, UpstreamError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| UpstreamError::Transport("invalid upstream api key".to_string()))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }
        if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
            headers.insert(TRACE_ID_HEADER, value);
        }
        Ok(headers)
    }

    /// Posts a payload and checks the response status.
    async fn post(
        &self,
        mut payload: Value,
        stream: bool,
        trace_id: &TraceId,
    ) -> Result<Response, UpstreamError> {
        if let Some(object) = payload.as_object_mut() {
            object.insert("stream".to_string(), Value::Bool(stream));
        }
        let response = self
            .client
            .post(&self.endpoint)
            .headers(self.build_headers(trace_id)?)
            .json(&payload)
            .send()
            .await
            .map_err(|err| UpstreamError::Transport(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            message: text.chars().take(MAX_ERROR_EXCERPT).collect(),
        })
    }
}

#[async_trait]
impl UpstreamGateway for HttpUpstreamGateway {
    async fn call_once(
        &self,
        payload: Value,
        trace_id: &TraceId,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let response = self.post(payload, false, trace_id).await?;
        let body: Value =
            response.json().await.map_err(|err| UpstreamError::Decode(err.to_string()))?;
        UpstreamResponse::from_body(body)
    }

    async fn call_streaming(
        &self,
        payload: Value,
        trace_id: &TraceId,
    ) -> Result<ChunkStream, UpstreamError> {
        let response = self.post(payload, true, trace_id).await?;
        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(response, tx));
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}

/// Decodes the response body into chunks until the stream ends, the
/// sentinel arrives, or the consumer goes away.
async fn pump_events(
    mut response: Response,
    tx: mpsc::Sender<Result<UpstreamChunk, UpstreamError>>,
) {
    let mut decoder = SseDecoder::default();
    loop {
        let next = tokio::select! {
            next = response.chunk() => next,
            () = tx.closed() => return,
        };
        let body_ended = !matches!(next, Ok(Some(_)));
        let items = match next {
            Ok(Some(bytes)) => decoder.push(&bytes),
            Ok(None) => decoder.finish(),
            Err(err) => vec![Err(UpstreamError::Transport(err.to_string()))],
        };
        let ended = body_ended || decoder.is_done();
        for item in items {
            if tx.send(item).await.is_err() {
                return;
            }
        }
        if ended {
            return;
        }
    }
}

// ============================================================================
// SECTION: SSE Decoding
// ============================================================================

/// Incremental decoder for upstream server-sent events.
///
/// # Invariants
/// - Events are only decoded once their blank-line terminator arrived.
/// - Nothing is decoded after the `[DONE]` sentinel.
/// - Buffered bytes are searched for a terminator once; later reads resume
///   where the previous search stopped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes of the event still being received.
    buffer: Vec<u8>,
    /// Leading bytes of `buffer` already searched for a terminator.
    scanned: usize,
    /// True once the sentinel was seen.
    done: bool,
}

impl SseDecoder {
    /// Feeds bytes and returns every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<UpstreamChunk, UpstreamError>> {
        if self.done {
            return Vec::new();
        }
        self.buffer.extend(bytes.iter().copied().filter(|byte| *byte != b'\r'));
        let mut out = Vec::new();
        while !self.done {
            // Back up one byte: a terminator may straddle two reads.
            let start = self.scanned.saturating_sub(1);
            let Some(offset) =
                self.buffer[start ..].windows(2).position(|pair| pair == b"\n\n")
            else {
                self.scanned = self.buffer.len();
                break;
            };
            let end = start + offset;
            let event: Vec<u8> = self.buffer.drain(.. end + 2).take(end).collect();
            self.scanned = 0;
            if let Some(item) = self.decode_event(&event) {
                out.push(item);
            }
        }
        out
    }

    /// Decodes whatever remains once the body ended.
    pub fn finish(&mut self) -> Vec<Result<UpstreamChunk, UpstreamError>> {
        if self.done {
            return Vec::new();
        }
        let event = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.done = true;
        self.decode_event(&event).into_iter().collect()
    }

    /// Returns true once the sentinel was seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Decodes one event; comments and keep-alives yield nothing.
    fn decode_event(&mut self, event: &[u8]) -> Option<Result<UpstreamChunk, UpstreamError>> {
        let Ok(text) = std::str::from_utf8(event) else {
            return Some(Err(UpstreamError::Decode("event is not utf-8".to_string())));
        };
        let data: Vec<&str> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
            .collect();
        if data.is_empty() {
            return None;
        }
        let data = data.join("\n");
        if data.trim() == UPSTREAM_DONE {
            self.done = true;
            return None;
        }
        Some(
            serde_json::from_str::<Value>(&data)
                .map(UpstreamChunk::from_body)
                .map_err(|err| UpstreamError::Decode(err.to_string())),
        )
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
