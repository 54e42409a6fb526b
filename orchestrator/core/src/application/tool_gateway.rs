// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Gateway
//!
//! The only path from an agent's tool-call proposal to the remote sandbox.
//!
//! ```text
//! submit(request)
//!   ├─ classify ─▶ low ──────────────▶ dispatch ─▶ ToolCallResult
//!   └─ classify ─▶ medium | high ─▶ park ─▶ ApprovalPending
//!
//! resolve_approval(id, approved)     ─▶ dispatch ─▶ ToolCallResult
//! resolve_approval(id, denied|timed_out)        ─▶ ToolCallResult(rejected)
//! ```
//!
//! Dispatch applies a per-attempt timeout and retries timeouts and transport
//! failures with capped exponential backoff. Exhausting the budget produces a
//! result with status `error`; it is never surfaced as an `Err`.
//!
//! Every result, whatever its status, is written to memory and charged to the
//! cost ledger before it is returned. A call cancelled in flight is charged
//! once, when its late result arrives. Human decisions are written to memory
//! as `approval:<tool_call_id>` notes before an approved call is dispatched.

use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domain::config::GatewayConfig;
use crate::domain::cost::{CostEntry, CostLedger, LedgerError};
use crate::domain::events::SessionEvent;
use crate::domain::memory::{facts_from_output, MemoryCategory, MemoryError, MemoryRecord, MemoryStore};
use crate::domain::policy::{Classification, RiskClassifier};
use crate::domain::session::{AgentRole, PendingApproval, SessionId};
use crate::domain::tool::{
    ApprovalDecision, ApprovalOutcome, RiskTier, ToolCallId, ToolCallRequest, ToolCallResult,
    ToolCallStatus, ToolInvocation, ToolServer, ToolServerError, ToolServerStatus,
};
use crate::infrastructure::approval_registry::{ApprovalError, ApprovalRegistry, ApprovalRequest};
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("Failed to record tool result in memory: {0}")]
    Memory(#[from] MemoryError),

    #[error("Failed to record tool cost: {0}")]
    Ledger(#[from] LedgerError),
}

/// Who is calling, on behalf of which turn.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub session_id: SessionId,
    pub role: AgentRole,
    pub turn_seq: u64,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone)]
pub enum GatewayOutcome {
    Completed(ToolCallResult),
    ApprovalPending {
        approval: PendingApproval,
        classification: Classification,
    },
}

/// What the dispatch loop produced, before bookkeeping.
struct Dispatched {
    status: ToolCallStatus,
    output: Value,
    retry_count: u32,
}

pub struct ToolGateway {
    classifier: RiskClassifier,
    server: Arc<dyn ToolServer>,
    approvals: Arc<ApprovalRegistry>,
    memory: Arc<dyn MemoryStore>,
    ledger: Arc<dyn CostLedger>,
    events: EventBus,
    config: GatewayConfig,
}

impl ToolGateway {
    pub fn new(
        classifier: RiskClassifier,
        server: Arc<dyn ToolServer>,
        approvals: Arc<ApprovalRegistry>,
        memory: Arc<dyn MemoryStore>,
        ledger: Arc<dyn CostLedger>,
        events: EventBus,
        config: GatewayConfig,
    ) -> Self {
        Self {
            classifier,
            server,
            approvals,
            memory,
            ledger,
            events,
            config,
        }
    }

    pub fn approvals(&self) -> &Arc<ApprovalRegistry> {
        &self.approvals
    }

    pub fn classify(&self, request: &ToolCallRequest) -> Classification {
        self.classifier.classify(request)
    }

    pub async fn submit(
        &self,
        ctx: &CallContext,
        request: ToolCallRequest,
    ) -> Result<GatewayOutcome, GatewayError> {
        let classification = self.classifier.classify(&request);
        let tool_call_id = ToolCallId::new();

        if classification.tier.requires_approval() {
            let approval = PendingApproval {
                tool_call_id,
                request,
                requested_by: ctx.role,
                turn_seq: ctx.turn_seq,
                tier: classification.tier,
                requested_at: Utc::now(),
            };
            self.approvals.register(ApprovalRequest {
                session_id: ctx.session_id,
                approval: approval.clone(),
                reasons: classification.reasons.clone(),
            });
            self.events.publish(SessionEvent::ApprovalRequested {
                session_id: ctx.session_id,
                tool_call_id,
                tool: approval.request.tool.clone(),
                tier: approval.tier,
                requested_by: ctx.role,
                reasons: classification.reasons.clone(),
                requested_at: approval.requested_at,
            });
            return Ok(GatewayOutcome::ApprovalPending {
                approval,
                classification,
            });
        }

        let result = self
            .execute(ctx, tool_call_id, &request, classification.tier)
            .await;
        self.record(ctx, &result).await?;
        Ok(GatewayOutcome::Completed(result))
    }

    /// Resolves a parked call. Approved calls are dispatched here; denied and
    /// timed-out calls yield a `rejected` result without touching the sandbox.
    pub async fn resolve_approval(
        &self,
        tool_call_id: ToolCallId,
        outcome: ApprovalOutcome,
        decided_by: &str,
        cancel: CancellationToken,
    ) -> Result<(ApprovalDecision, ToolCallResult), GatewayError> {
        let (parked, decision) = self.approvals.resolve(tool_call_id, outcome, decided_by)?;
        metrics::counter!("vanguard_approvals_total", "outcome" => outcome.as_str()).increment(1);
        self.events.publish(SessionEvent::ApprovalResolved {
            session_id: parked.session_id,
            tool_call_id,
            outcome,
            decided_by: decision.decided_by.clone(),
            resolved_at: decision.decided_at,
        });

        let ctx = CallContext {
            session_id: parked.session_id,
            role: parked.approval.requested_by,
            turn_seq: parked.approval.turn_seq,
            cancel,
        };
        let request = &parked.approval.request;

        let content = format!(
            "{} {} ({}) by {} at {}",
            outcome,
            request.tool,
            parked.approval.tier,
            decision.decided_by,
            decision.decided_at.to_rfc3339()
        );
        self.memory
            .write(MemoryRecord::new(
                ctx.session_id,
                MemoryCategory::Note,
                approval_key(tool_call_id),
                content,
                ctx.turn_seq,
            ))
            .await?;

        let result = match outcome {
            ApprovalOutcome::Approved => {
                self.execute(&ctx, tool_call_id, request, parked.approval.tier)
                    .await
            }
            ApprovalOutcome::Denied | ApprovalOutcome::TimedOut => ToolCallResult {
                tool_call_id,
                session_id: ctx.session_id,
                tool: request.tool.clone(),
                tier: parked.approval.tier,
                status: ToolCallStatus::Rejected,
                output: json!({
                    "reason": format!("{} by {}", outcome, decision.decided_by),
                }),
                duration_ms: 0,
                retry_count: 0,
                requesting_turn: ctx.turn_seq,
                completed_at: Utc::now(),
            },
        };
        self.record(&ctx, &result).await?;
        Ok((decision, result))
    }

    /// Re-parks a call restored from a checkpoint.
    pub fn restore_pending(&self, session_id: SessionId, approval: PendingApproval) {
        let reasons = self.classifier.classify(&approval.request).reasons;
        self.approvals.register(ApprovalRequest {
            session_id,
            approval,
            reasons,
        });
    }

    pub fn discard_pending(&self, session_id: SessionId) -> usize {
        self.approvals.discard_session(session_id)
    }

    pub fn stale_approvals(&self, timeout: Duration) -> Vec<ToolCallId> {
        match chrono::Duration::from_std(timeout) {
            Ok(timeout) => self.approvals.stale(timeout),
            Err(_) => Vec::new(),
        }
    }

    async fn execute(
        &self,
        ctx: &CallContext,
        tool_call_id: ToolCallId,
        request: &ToolCallRequest,
        tier: RiskTier,
    ) -> ToolCallResult {
        let invocation = ToolInvocation {
            tool: request.tool.clone(),
            arguments: request.arguments.clone(),
            timeout_ms: self.config.call_timeout_ms,
        };
        info!(
            session_id = %ctx.session_id,
            tool_call_id = %tool_call_id,
            tool = %request.tool,
            tier = %tier,
            "Dispatching tool call"
        );

        let started = Instant::now();
        let mut handle = tokio::spawn(dispatch_with_retry(
            self.server.clone(),
            invocation,
            self.config.clone(),
            ctx.cancel.clone(),
        ));

        let dispatched = tokio::select! {
            joined = &mut handle => match joined {
                Ok(dispatched) => dispatched,
                Err(e) => Dispatched {
                    status: ToolCallStatus::Error,
                    output: json!({ "error": format!("dispatch task failed: {}", e) }),
                    retry_count: 0,
                },
            },
            _ = ctx.cancel.cancelled() => {
                warn!(
                    session_id = %ctx.session_id,
                    tool_call_id = %tool_call_id,
                    "Session cancelled while tool call in flight"
                );
                self.audit_late_result(ctx, tool_call_id, request.tool.clone(), tier, handle, started);
                Dispatched {
                    status: ToolCallStatus::Cancelled,
                    output: json!({ "reason": "session cancelled" }),
                    retry_count: 0,
                }
            }
        };

        ToolCallResult {
            tool_call_id,
            session_id: ctx.session_id,
            tool: request.tool.clone(),
            tier,
            status: dispatched.status,
            output: dispatched.output,
            duration_ms: started.elapsed().as_millis() as u64,
            retry_count: dispatched.retry_count,
            requesting_turn: ctx.turn_seq,
            completed_at: Utc::now(),
        }
    }

    /// An already-dispatched call may still finish after cancellation; keep
    /// its outcome for the audit trail.
    fn audit_late_result(
        &self,
        ctx: &CallContext,
        tool_call_id: ToolCallId,
        tool: String,
        tier: RiskTier,
        handle: tokio::task::JoinHandle<Dispatched>,
        started: Instant,
    ) {
        let memory = self.memory.clone();
        let ledger = self.ledger.clone();
        let rate = self.config.tool_cost_per_second_usd;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let Ok(dispatched) = handle.await else {
                return;
            };
            let duration_ms = started.elapsed().as_millis() as u64;
            let content = format!(
                "{} finished after cancellation with status {}: {}",
                tool,
                dispatched.status,
                render_output(&dispatched.output)
            );
            let record = MemoryRecord::new(
                ctx.session_id,
                MemoryCategory::Note,
                format!("tool:{}:late", tool_call_id),
                content,
                ctx.turn_seq,
            );
            if let Err(e) = memory.write(record).await {
                warn!(tool_call_id = %tool_call_id, error = %e, "Failed to record late tool result");
            }
            let entry = CostEntry::tool_time(ctx.session_id, ctx.role, ctx.turn_seq, tool, duration_ms, rate);
            if let Err(e) = ledger.record(entry).await {
                warn!(tool_call_id = %tool_call_id, error = %e, "Failed to charge late tool result");
            }
            debug!(tool_call_id = %tool_call_id, tier = %tier, "Late tool result recorded for audit");
        });
    }

    async fn record(&self, ctx: &CallContext, result: &ToolCallResult) -> Result<(), GatewayError> {
        let category = match result.status {
            ToolCallStatus::Ok => MemoryCategory::Finding,
            _ => MemoryCategory::Note,
        };
        let content = format!(
            "{} [{}] {}",
            result.tool,
            result.status,
            render_output(&result.output)
        );
        self.memory
            .write(MemoryRecord::new(
                ctx.session_id,
                category,
                format!("tool:{}", result.tool_call_id),
                content,
                result.requesting_turn,
            ))
            .await?;

        if result.status == ToolCallStatus::Ok {
            for fact in facts_from_output(&result.output) {
                self.memory
                    .write(MemoryRecord::new(
                        ctx.session_id,
                        fact.category,
                        fact.key,
                        fact.content,
                        result.requesting_turn,
                    ))
                    .await?;
            }
        }

        // The late-result audit charges cancelled calls.
        if result.status != ToolCallStatus::Cancelled {
            self.ledger
                .record(CostEntry::tool_time(
                    ctx.session_id,
                    ctx.role,
                    result.requesting_turn,
                    result.tool.clone(),
                    result.duration_ms,
                    self.config.tool_cost_per_second_usd,
                ))
                .await?;
        }

        metrics::counter!(
            "vanguard_tool_calls_total",
            "tool" => result.tool.clone(),
            "tier" => result.tier.as_str(),
            "status" => result.status.as_str()
        )
        .increment(1);

        self.events.publish(SessionEvent::ToolCallCompleted {
            session_id: ctx.session_id,
            tool_call_id: result.tool_call_id,
            tool: result.tool.clone(),
            tier: result.tier,
            status: result.status,
            duration_ms: result.duration_ms,
            retry_count: result.retry_count,
            completed_at: result.completed_at,
        });

        info!(
            session_id = %ctx.session_id,
            tool_call_id = %result.tool_call_id,
            tool = %result.tool,
            status = %result.status,
            retries = result.retry_count,
            duration_ms = result.duration_ms,
            "Tool call completed"
        );
        Ok(())
    }
}

/// Memory key of the note recording a human decision on a gated call.
pub fn approval_key(tool_call_id: ToolCallId) -> String {
    format!("approval:{}", tool_call_id)
}

fn render_output(output: &Value) -> String {
    match output {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

async fn dispatch_with_retry(
    server: Arc<dyn ToolServer>,
    invocation: ToolInvocation,
    config: GatewayConfig,
    cancel: CancellationToken,
) -> Dispatched {
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let failure = match tokio::time::timeout(config.call_timeout(), server.invoke(&invocation)).await {
            Ok(Ok(response)) => match response.status {
                ToolServerStatus::Ok => {
                    return Dispatched {
                        status: ToolCallStatus::Ok,
                        output: response.output,
                        retry_count: attempt - 1,
                    }
                }
                // The tool ran and failed; running it again will not help.
                ToolServerStatus::Error => {
                    return Dispatched {
                        status: ToolCallStatus::Error,
                        output: response.output,
                        retry_count: attempt - 1,
                    }
                }
                ToolServerStatus::Timeout => "tool server reported timeout".to_string(),
            },
            Ok(Err(ToolServerError::Transport(e))) => format!("transport failure: {}", e),
            Ok(Err(ToolServerError::Protocol(e))) => {
                return Dispatched {
                    status: ToolCallStatus::Error,
                    output: json!({ "error": format!("protocol error: {}", e), "attempts": attempt }),
                    retry_count: attempt - 1,
                }
            }
            Err(_) => format!("no response within {}ms", config.call_timeout_ms),
        };

        if attempt >= max_attempts || cancel.is_cancelled() {
            warn!(tool = %invocation.tool, attempts = attempt, "Tool dispatch gave up: {}", failure);
            return Dispatched {
                status: ToolCallStatus::Error,
                output: json!({ "error": failure, "attempts": attempt }),
                retry_count: attempt - 1,
            };
        }

        let delay = config.backoff(attempt);
        debug!(tool = %invocation.tool, attempt, delay_ms = delay.as_millis() as u64, "Retrying tool dispatch: {}", failure);
        metrics::counter!("vanguard_tool_retries_total", "tool" => invocation.tool.clone()).increment(1);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Dispatched {
                    status: ToolCallStatus::Error,
                    output: json!({ "error": failure, "attempts": attempt, "abandoned": true }),
                    retry_count: attempt - 1,
                };
            }
        }
        attempt += 1;
    }
}
