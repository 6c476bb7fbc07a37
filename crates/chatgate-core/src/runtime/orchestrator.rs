// crates/chatgate-core/src/runtime/orchestrator.rs
// ============================================================================
// Module: Chatgate Tool Loop
// Description: Upstream/tool round-trips with approval halts.
// Purpose: Drive a request to a final answer, a bounded exhaustion, or an
//          approval halt.
// Dependencies: crate::core, crate::interfaces, tokio-stream
// ============================================================================

//! ## Overview
//! The loop calls the upstream gateway with the running conversation. When
//! the model asks for tools, each call is checked against the approval gate
//! and then executed through the tool registry; results are appended as
//! `tool` messages and the upstream gateway is called again.
//!
//! The loop spends at most `max(max_tool_iterations, 1)` upstream calls.
//! Tools only run while budget remains, so a model that always asks for
//! tools sees exactly that many calls. Registry failures become failed tool
//! results; upstream failures end the request.
//!
//! While streaming, tool call fragments are held back until the loop knows
//! whether it will run them. Fragments of a turn that ends the request are
//! relayed to the client, so a pass-through or exhausted stream still carries
//! the model's tool calls.
//!
//! Approval gating follows the mode of the request that issued the calls. A
//! resumed continuation keeps that mode for its remaining calls and later
//! rounds; the resuming caller only picks how the reply is delivered.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use serde_json::json;
use thiserror::Error;
use tokio_stream::StreamExt;

use crate::core::AuditEvent;
use crate::core::AuditEventKind;
use crate::core::ChatCompletionRequest;
use crate::core::ChatMessage;
use crate::core::FinishReason;
use crate::core::ProtocolEvent;
use crate::core::ResponseMode;
use crate::core::StreamAssembly;
use crate::core::ToolCall;
use crate::core::ToolExecutionResult;
use crate::core::ToolPhase;
use crate::core::TraceId;
use crate::core::UpstreamResponse;
use crate::core::content_hash;
use crate::interfaces::AuditSink;
use crate::interfaces::ToolRegistry;
use crate::interfaces::UpstreamError;
use crate::interfaces::UpstreamGateway;
use crate::runtime::approval::ApprovalError;
use crate::runtime::approval::ApprovalPolicy;
use crate::runtime::approval::ApprovalTicket;
use crate::runtime::approval::PendingApproval;
use crate::runtime::approval::PendingApprovals;
use crate::runtime::protocol::EventSink;
use crate::runtime::protocol::ProtocolError;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Tool loop limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Execute tools automatically; when false every request is a single
    /// pass-through call.
    pub auto_tools: bool,
    /// Upstream call budget per request.
    pub max_tool_iterations: u32,
}

impl LoopConfig {
    /// Returns the number of upstream calls a request may spend.
    #[must_use]
    pub const fn call_budget(&self) -> u32 {
        if !self.auto_tools || self.max_tool_iterations == 0 {
            return 1;
        }
        self.max_tool_iterations
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Final assistant turn of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalResponse {
    /// Completion body returned to aggregated callers.
    pub body: Value,
    /// Assistant message of the last upstream call.
    pub message: ChatMessage,
    /// Upstream calls spent.
    pub upstream_calls: u32,
}

/// How a loop run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopOutcome {
    /// The model produced a final answer.
    Completed(FinalResponse),
    /// The call budget ran out while the model still wanted tools.
    Exhausted(FinalResponse),
    /// A tool call is parked for approval.
    ApprovalRequired(ApprovalTicket),
}

/// Fatal tool loop errors.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The upstream gateway failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    /// The continuation could not be parked.
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    /// An event could not be delivered.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    /// The upstream payload could not be built.
    #[error("payload encoding failed: {0}")]
    Payload(String),
    /// The client went away before the loop finished.
    #[error("request cancelled")]
    Cancelled,
}

impl LoopError {
    /// Returns the stable error type label.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "upstream_error",
            Self::Cancelled | Self::Protocol(ProtocolError::Disconnected) => "cancelled",
            Self::Approval(_) | Self::Protocol(_) | Self::Payload(_) => "internal_error",
        }
    }
}

// ============================================================================
// SECTION: Loop
// ============================================================================

/// Running state of one request.
struct LoopState {
    /// Conversation sent upstream.
    request: ChatCompletionRequest,
    /// Upstream calls spent.
    upstream_calls: u32,
    /// Delivery mode of the reply.
    mode: ResponseMode,
    /// Mode the approval gate is evaluated in.
    gate_mode: ResponseMode,
}

/// Assistant turn produced by one upstream call.
struct AssistantTurn {
    /// Assistant message.
    message: ChatMessage,
    /// Finish reason.
    finish_reason: FinishReason,
    /// Completion body.
    body: Value,
    /// Streamed chunks withheld from the client.
    withheld: Vec<Value>,
}

/// Tool-calling loop orchestrator.
pub struct ToolLoop {
    /// Upstream gateway.
    upstream: Arc<dyn UpstreamGateway>,
    /// Tool registry.
    registry: Arc<dyn ToolRegistry>,
    /// Approval gate configuration.
    policy: ApprovalPolicy,
    /// Loop limits.
    config: LoopConfig,
    /// Parked continuations.
    pending: Arc<PendingApprovals>,
    /// Sink for approval audit records.
    audit: Arc<dyn AuditSink>,
}

impl ToolLoop {
    /// Creates a tool loop.
    #[must_use]
    pub fn new(
        upstream: Arc<dyn UpstreamGateway>,
        registry: Arc<dyn ToolRegistry>,
        policy: ApprovalPolicy,
        config: LoopConfig,
        pending: Arc<PendingApprovals>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            upstream,
            registry,
            policy,
            config,
            pending,
            audit,
        }
    }

    /// Returns the parked continuation store.
    #[must_use]
    pub const fn pending(&self) -> &Arc<PendingApprovals> {
        &self.pending
    }

    /// Runs a fresh request.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError`] when the upstream gateway fails, a continuation
    /// cannot be parked, or an event cannot be delivered.
    pub async fn run(
        &self,
        mut request: ChatCompletionRequest,
        trace_id: &TraceId,
        sink: &mut dyn EventSink,
    ) -> Result<LoopOutcome, LoopError> {
        let mode = request.mode();
        request.trace_id = None;
        self.inject_tool_definitions(&mut request, trace_id).await;
        let state = LoopState {
            request,
            upstream_calls: 0,
            mode,
            gate_mode: mode,
        };
        self.drive(state, trace_id, sink).await
    }

    /// Resumes a parked continuation after a decision.
    ///
    /// An approved call runs; a denied call is answered with a failed tool
    /// result. The rest of the round is then processed and the loop
    /// continues.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError`] as for [`ToolLoop::run`].
    pub async fn resume(
        &self,
        pending: PendingApproval,
        approved: bool,
        mode: ResponseMode,
        sink: &mut dyn EventSink,
    ) -> Result<LoopOutcome, LoopError> {
        let PendingApproval {
            trace_id,
            call,
            remaining,
            mut request,
            upstream_calls,
            mode: gate_mode,
        } = pending;
        self.audit.record(&AuditEvent::new(
            AuditEventKind::ToolApprovalResolved,
            &trace_id,
            json!({
                "tool_call_id": call.id,
                "name": call.name,
                "approved": approved,
            }),
        ));
        request.stream = mode.is_streaming();
        let mut state = LoopState {
            request,
            upstream_calls,
            mode,
            gate_mode,
        };
        if approved {
            self.execute_tool(&mut state, &call, &trace_id, sink).await?;
        } else {
            let denied = ToolExecutionResult::denied();
            state.request.messages.push(ChatMessage::tool_result(&call.id, &denied));
        }
        if let Some(ticket) =
            self.execute_round(&mut state, remaining.into(), &trace_id, sink).await?
        {
            return Ok(LoopOutcome::ApprovalRequired(ticket));
        }
        self.drive(state, &trace_id, sink).await
    }

    /// Calls upstream and runs tool rounds until the request settles.
    async fn drive(
        &self,
        mut state: LoopState,
        trace_id: &TraceId,
        sink: &mut dyn EventSink,
    ) -> Result<LoopOutcome, LoopError> {
        loop {
            let mut turn = self.call_upstream(&state, trace_id, sink).await?;
            state.upstream_calls += 1;
            let wants_tools = self.config.auto_tools
                && turn.finish_reason.is_tool_calls()
                && !turn.message.tool_calls.is_empty();
            if !wants_tools {
                relay_withheld(&mut turn, sink).await?;
                return Ok(LoopOutcome::Completed(final_response(turn, state.upstream_calls)));
            }
            if state.upstream_calls >= self.config.call_budget() {
                relay_withheld(&mut turn, sink).await?;
                return Ok(LoopOutcome::Exhausted(final_response(turn, state.upstream_calls)));
            }
            let calls: VecDeque<ToolCall> = turn.message.tool_calls.iter().cloned().collect();
            state.request.messages.push(turn.message);
            if let Some(ticket) = self.execute_round(&mut state, calls, trace_id, sink).await? {
                return Ok(LoopOutcome::ApprovalRequired(ticket));
            }
        }
    }

    /// Executes the calls of one round in order, halting at the first call
    /// that needs approval.
    async fn execute_round(
        &self,
        state: &mut LoopState,
        mut calls: VecDeque<ToolCall>,
        trace_id: &TraceId,
        sink: &mut dyn EventSink,
    ) -> Result<Option<ApprovalTicket>, LoopError> {
        while let Some(call) = calls.pop_front() {
            if self.policy.requires_approval(&call.name, state.gate_mode) {
                let ticket = self.pending.park(PendingApproval {
                    trace_id: trace_id.clone(),
                    call: call.clone(),
                    remaining: calls.into_iter().collect(),
                    request: std::mem::take(&mut state.request),
                    upstream_calls: state.upstream_calls,
                    mode: state.gate_mode,
                })?;
                self.audit.record(&AuditEvent::new(
                    AuditEventKind::ToolApprovalRequired,
                    trace_id,
                    json!({
                        "tool_call_id": call.id,
                        "name": call.name,
                        "arguments_hash": content_hash(call.arguments.as_bytes()),
                    }),
                ));
                sink.emit(ProtocolEvent::ToolApprovalRequired {
                    call,
                    trace_id: trace_id.clone(),
                })
                .await?;
                return Ok(Some(ticket));
            }
            self.execute_tool(state, &call, trace_id, sink).await?;
        }
        Ok(None)
    }

    /// Runs one tool and appends its result to the conversation.
    async fn execute_tool(
        &self,
        state: &mut LoopState,
        call: &ToolCall,
        trace_id: &TraceId,
        sink: &mut dyn EventSink,
    ) -> Result<(), LoopError> {
        sink.emit(ProtocolEvent::ToolStatus {
            call_id: call.id.clone(),
            name: call.name.clone(),
            phase: ToolPhase::Start,
        })
        .await?;
        let result = match self.registry.call_tool(&call.name, &call.arguments, trace_id).await {
            Ok(result) => result,
            Err(err) => ToolExecutionResult::failure(err.to_string()),
        };
        let phase = if result.ok { ToolPhase::Complete } else { ToolPhase::Failed };
        sink.emit(ProtocolEvent::ToolStatus {
            call_id: call.id.clone(),
            name: call.name.clone(),
            phase,
        })
        .await?;
        state.request.messages.push(ChatMessage::tool_result(&call.id, &result));
        Ok(())
    }

    /// Performs one upstream call, relaying content when streaming.
    ///
    /// Tool call fragments and their finish marker are withheld when tools
    /// run automatically and relayed as they arrive otherwise.
    async fn call_upstream(
        &self,
        state: &LoopState,
        trace_id: &TraceId,
        sink: &mut dyn EventSink,
    ) -> Result<AssistantTurn, LoopError> {
        let payload =
            state.request.upstream_payload().map_err(|err| LoopError::Payload(err.to_string()))?;
        match state.mode {
            ResponseMode::Aggregated => {
                let response = self.upstream.call_once(payload, trace_id).await?;
                Ok(AssistantTurn {
                    message: response.message,
                    finish_reason: response.finish_reason,
                    body: response.body,
                    withheld: Vec::new(),
                })
            }
            ResponseMode::Streaming => {
                let mut chunks = self.upstream.call_streaming(payload, trace_id).await?;
                let mut assembly = StreamAssembly::default();
                let mut withheld = Vec::new();
                while let Some(chunk) = chunks.next().await {
                    let chunk = chunk?;
                    assembly.push(&chunk);
                    if chunk.is_forwardable()
                        || (!self.config.auto_tools && chunk.carries_payload())
                    {
                        sink.emit(ProtocolEvent::ContentDelta(chunk.body)).await?;
                    } else if chunk.carries_payload() {
                        withheld.push(chunk.body);
                    }
                }
                let (message, finish_reason) = assembly.finish();
                let body = UpstreamResponse::completion_body(
                    &state.request.model,
                    &message,
                    finish_reason.as_str(),
                );
                Ok(AssistantTurn {
                    message,
                    finish_reason,
                    body,
                    withheld,
                })
            }
        }
    }

    /// Adds registry tool definitions when the caller declared none.
    ///
    /// A registry failure leaves the request without tools and is audited.
    async fn inject_tool_definitions(
        &self,
        request: &mut ChatCompletionRequest,
        trace_id: &TraceId,
    ) {
        if !self.config.auto_tools || request.declares_tools() {
            return;
        }
        match self.registry.tool_definitions(trace_id).await {
            Ok(definitions) if !definitions.is_empty() => {
                request.extra.insert("tools".to_string(), Value::Array(definitions));
            }
            Ok(_) => {}
            Err(err) => self.audit.record(&AuditEvent::new(
                AuditEventKind::ToolDefinitionsUnavailable,
                trace_id,
                json!({
                    "error": err.to_string(),
                }),
            )),
        }
    }

    /// Parks a continuation again after admission refused its resume.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError`] when the store refuses it; the loss is
    /// audited.
    pub fn repark(&self, pending: PendingApproval) -> Result<(), ApprovalError> {
        let trace_id = pending.trace_id.clone();
        let call_id = pending.call.id.clone();
        self.pending.park(pending).map(|_ticket| ()).inspect_err(|err| {
            self.audit.record(&AuditEvent::new(
                AuditEventKind::ToolApprovalDropped,
                &trace_id,
                json!({
                    "tool_call_id": call_id,
                    "error": err.to_string(),
                }),
            ));
        })
    }
}

/// Relays the chunks a turn withheld, once the turn ends the request.
async fn relay_withheld(
    turn: &mut AssistantTurn,
    sink: &mut dyn EventSink,
) -> Result<(), LoopError> {
    for body in std::mem::take(&mut turn.withheld) {
        sink.emit(ProtocolEvent::ContentDelta(body)).await?;
    }
    Ok(())
}

/// Converts the last turn into a final response.
fn final_response(turn: AssistantTurn, upstream_calls: u32) -> FinalResponse {
    FinalResponse {
        body: turn.body,
        message: turn.message,
        upstream_calls,
    }
}
