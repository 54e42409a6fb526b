// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Coordinator
//!
//! Owns every session's state machine and drives it one turn at a time.
//!
//! ```text
//! start_session ──▶ running ──advance──▶ running ...
//!                      │  tool call gated
//!                      ▼
//!               awaiting_approval ──submit_approval──▶ running
//!                      │
//!                      ▼
//!        completed | failed | cancelled   (terminal)
//! ```
//!
//! ## Concurrency
//!
//! Each session sits behind its own async mutex: at most one `advance`,
//! `submit_approval` or `cancel_session` mutates a session at a time, while
//! independent sessions proceed in parallel. Cancellation flips the session's
//! [`CancellationToken`] *before* taking the lock so an in-flight tool call is
//! abandoned promptly.
//!
//! ## Safeguards
//!
//! Before every turn the coordinator checks the turn budget and the cost
//! ceiling. Exceeding either forces control to Summary; neither is an error.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use vanguard_core::application::{
    AgentError, AgentRuntime, CallContext, ContextAssembler, GatewayError, GatewayOutcome,
    ToolGateway,
};
use vanguard_core::domain::agent::{Action, SessionContext};
use vanguard_core::domain::config::CoordinatorConfig;
use vanguard_core::domain::cost::{CostLedger, CostTotals};
use vanguard_core::domain::events::{SessionEvent, RESPONSE_EXCERPT_CHARS};
use vanguard_core::domain::memory::{MemoryCategory, MemoryFilter, MemoryRecord, MemoryStore};
use vanguard_core::domain::repository::CheckpointStore;
use vanguard_core::domain::session::{
    AgentRole, Checkpoint, ForcedSummaryReason, Session, SessionId, SessionStatus, Turn,
};
use vanguard_core::domain::tool::{ApprovalOutcome, ToolCallId, ToolCallResult, ToolCallStatus};
use vanguard_core::infrastructure::approval_registry::ApprovalRequest;
use vanguard_core::infrastructure::event_bus::{EventBus, EventReceiver};

use crate::application::report;
use crate::domain::routing;
use crate::domain::{SwarmError, TurnOutcome};

/// Records considered when synthesizing a fallback report.
const REPORT_RECORD_LIMIT: usize = 50;

struct SessionState {
    session: Session,
    turns: Vec<Turn>,
}

struct SessionHandle {
    state: Mutex<SessionState>,
    cancel: CancellationToken,
}

impl SessionHandle {
    fn new(session: Session, turns: Vec<Turn>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SessionState { session, turns }),
            cancel: CancellationToken::new(),
        })
    }
}

/// What applying one action did, before the turn is persisted.
struct Applied {
    outcome: TurnOutcome,
    note: Option<String>,
}

pub struct SwarmCoordinator {
    sessions: DashMap<SessionId, Arc<SessionHandle>>,
    runtime: Arc<AgentRuntime>,
    gateway: Arc<ToolGateway>,
    memory: Arc<dyn MemoryStore>,
    ledger: Arc<dyn CostLedger>,
    checkpoints: Arc<dyn CheckpointStore>,
    events: EventBus,
    assembler: ContextAssembler,
    config: CoordinatorConfig,
}

impl SwarmCoordinator {
    pub fn new(
        runtime: Arc<AgentRuntime>,
        gateway: Arc<ToolGateway>,
        memory: Arc<dyn MemoryStore>,
        ledger: Arc<dyn CostLedger>,
        checkpoints: Arc<dyn CheckpointStore>,
        events: EventBus,
        config: CoordinatorConfig,
    ) -> Self {
        let assembler = ContextAssembler::new(
            memory.clone(),
            config.memory_context_limit,
            config.context_tail_turns,
        );
        Self {
            sessions: DashMap::new(),
            runtime,
            gateway,
            memory,
            ledger,
            checkpoints,
            events,
            assembler,
            config,
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Creates a `running` session with the Planner active and checkpoints it.
    pub async fn start_session(&self, objective: &str) -> Result<SessionId, SwarmError> {
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(SwarmError::InvalidObjective);
        }

        let mut session = Session::new(objective);
        let session_id = session.id;
        self.persist(&mut session).await?;
        self.sessions
            .insert(session_id, SessionHandle::new(session.clone(), Vec::new()));

        info!(session_id = %session_id, objective = %objective, "Session started");
        self.events.publish(SessionEvent::SessionStarted {
            session_id,
            objective: session.objective,
            started_at: session.created_at,
        });
        Ok(session_id)
    }

    /// Executes exactly one turn of the active role.
    pub async fn advance(&self, session_id: SessionId) -> Result<TurnOutcome, SwarmError> {
        let handle = self.handle(session_id)?;
        let mut state = handle.state.lock().await;

        check_runnable(&state.session)?;
        self.apply_safeguards(&mut state.session).await;

        let role = state.session.active_role;
        let ctx = self.assembler.assemble(&state.session, &state.turns).await?;

        let action = match self.runtime.execute(role, &ctx).await {
            Ok(action) => action,
            Err(AgentError::BackendUnavailable { attempts, reason }) => {
                let reason = format!("model backend unavailable after {} attempt(s): {}", attempts, reason);
                self.fail(&mut state.session, &reason).await?;
                return Ok(TurnOutcome::Failed { reason });
            }
            Err(AgentError::Ledger(e)) => return Err(e.into()),
        };

        if handle.cancel.is_cancelled() {
            debug!(session_id = %session_id, "Cancelled while the model was reasoning; dropping action");
            self.mark_cancelled(&mut state.session).await?;
            return Ok(TurnOutcome::Cancelled);
        }

        let seq = ctx.turn_seq;
        let applied = self
            .apply_action(&mut state.session, &ctx, &action, &handle.cancel)
            .await?;

        let mut turn = Turn::new(session_id, seq, role, action, ctx.context_ref());
        turn.note = applied.note;
        self.checkpoints.append_turn(&turn).await?;
        state.session.turn_count = seq;
        state.turns.push(turn.clone());

        self.track_cost(&mut state.session).await;
        self.persist(&mut state.session).await?;

        metrics::counter!("vanguard_turns_total", "role" => role.as_str()).increment(1);
        self.events.publish(SessionEvent::TurnCompleted {
            session_id,
            seq,
            role,
            action: turn.action.kind(),
            excerpt: turn.action.excerpt(RESPONSE_EXCERPT_CHARS),
            note: turn.note.clone(),
            completed_at: turn.timestamp,
        });
        debug!(session_id = %session_id, seq, role = %role, action = %turn.action.kind(), "Turn completed");

        Ok(applied.outcome)
    }

    /// Resolves a parked tool call and returns the session to `running` with
    /// the result visible to the role that requested it.
    pub async fn submit_approval(
        &self,
        tool_call_id: ToolCallId,
        outcome: ApprovalOutcome,
        decided_by: &str,
    ) -> Result<ToolCallResult, SwarmError> {
        let parked = self
            .gateway
            .approvals()
            .get(tool_call_id)
            .ok_or(SwarmError::NoPendingApproval(tool_call_id))?;
        let handle = self.handle(parked.session_id)?;
        let mut state = handle.state.lock().await;

        let waiting_on = state
            .session
            .pending_approval
            .as_ref()
            .map(|p| p.tool_call_id);
        if state.session.status != SessionStatus::AwaitingApproval || waiting_on != Some(tool_call_id) {
            return Err(SwarmError::NoPendingApproval(tool_call_id));
        }

        let result = match self
            .gateway
            .resolve_approval(tool_call_id, outcome, decided_by, handle.cancel.clone())
            .await
        {
            Ok((_, result)) => result,
            Err(e @ GatewayError::Approval(_)) => return Err(e.into()),
            Err(e) => {
                // The registry entry is already consumed; the session must not
                // keep waiting on it, nor re-park it on resume.
                state.session.pending_approval = None;
                let reason = format!("recording {} decision on {} failed: {}", outcome, tool_call_id, e);
                self.fail(&mut state.session, &reason).await?;
                return Err(e.into());
            }
        };

        let session = &mut state.session;
        let pending = session.release_approval();
        if let Some(pending) = pending {
            session.hand_off(pending.requested_by);
        }
        session.last_tool_result = Some(result.clone());

        if result.status == ToolCallStatus::Cancelled || handle.cancel.is_cancelled() {
            self.mark_cancelled(session).await?;
            return Ok(result);
        }

        self.status_changed(session.id, SessionStatus::AwaitingApproval, session.status);
        self.track_cost(session).await;
        self.persist(session).await?;
        Ok(result)
    }

    /// Marks the session `cancelled` and abandons any in-flight tool call.
    /// Cancelling an already-ended session is a no-op.
    pub async fn cancel_session(&self, session_id: SessionId) -> Result<(), SwarmError> {
        let handle = self.handle(session_id)?;
        handle.cancel.cancel();
        let mut state = handle.state.lock().await;
        self.mark_cancelled(&mut state.session).await
    }

    /// Reloads a session from its checkpoint and turn log. Sessions already
    /// loaded are returned as they are.
    pub async fn resume_session(&self, session_id: SessionId) -> Result<Session, SwarmError> {
        if let Some(handle) = self.sessions.get(&session_id).map(|h| h.value().clone()) {
            return Ok(handle.state.lock().await.session.clone());
        }

        let checkpoint = self
            .checkpoints
            .load_checkpoint(session_id)
            .await?
            .ok_or(SwarmError::SessionNotFound(session_id))?;
        let session = checkpoint.restore();
        let turns = reconcile_turns(self.checkpoints.load_turns(session_id).await?, session.turn_count)
            .map_err(SwarmError::Internal)?;

        if let Some(pending) = &session.pending_approval {
            self.gateway.restore_pending(session_id, pending.clone());
        }

        info!(
            session_id = %session_id,
            status = %session.status,
            active_role = %session.active_role,
            turn_count = session.turn_count,
            "Session resumed from checkpoint"
        );
        self.events.publish(SessionEvent::SessionResumed {
            session_id,
            active_role: session.active_role,
            turn_count: session.turn_count,
            resumed_at: Utc::now(),
        });

        let handle = self
            .sessions
            .entry(session_id)
            .or_insert_with(|| SessionHandle::new(session, turns))
            .value()
            .clone();
        let snapshot = handle.state.lock().await.session.clone();
        Ok(snapshot)
    }

    /// Resolves every approval parked longer than `approval_timeout_secs` as
    /// `timed_out`. Does nothing when no timeout is configured.
    pub async fn expire_stale_approvals(&self) -> Result<Vec<ToolCallResult>, SwarmError> {
        let Some(timeout) = self.config.approval_timeout() else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        for tool_call_id in self.gateway.stale_approvals(timeout) {
            match self
                .submit_approval(tool_call_id, ApprovalOutcome::TimedOut, "approval-timeout")
                .await
            {
                Ok(result) => results.push(result),
                // Raced with a human decision.
                Err(SwarmError::NoPendingApproval(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    pub async fn session(&self, session_id: SessionId) -> Result<Session, SwarmError> {
        let handle = self.handle(session_id)?;
        let state = handle.state.lock().await;
        Ok(state.session.clone())
    }

    pub async fn turns(&self, session_id: SessionId) -> Result<Vec<Turn>, SwarmError> {
        let handle = self.handle(session_id)?;
        let state = handle.state.lock().await;
        Ok(state.turns.clone())
    }

    /// Sessions loaded in this process, oldest first.
    pub async fn list_sessions(&self) -> Vec<Session> {
        let handles: Vec<Arc<SessionHandle>> =
            self.sessions.iter().map(|h| h.value().clone()).collect();
        let mut sessions = Vec::with_capacity(handles.len());
        for handle in handles {
            sessions.push(handle.state.lock().await.session.clone());
        }
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    pub fn pending_approvals(&self) -> Vec<ApprovalRequest> {
        self.gateway.approvals().list_pending()
    }

    pub async fn cost(&self, session_id: SessionId) -> CostTotals {
        self.ledger.total(session_id).await
    }

    fn handle(&self, session_id: SessionId) -> Result<Arc<SessionHandle>, SwarmError> {
        self.sessions
            .get(&session_id)
            .map(|h| h.value().clone())
            .ok_or(SwarmError::SessionNotFound(session_id))
    }

    async fn apply_safeguards(&self, session: &mut Session) {
        if session.active_role == AgentRole::Summary || session.forced_summary.is_some() {
            return;
        }

        let reason = if session.turn_count >= self.config.max_turns {
            Some(ForcedSummaryReason::BudgetExhausted)
        } else {
            let totals = self.ledger.total(session.id).await;
            let over_cost = self
                .config
                .max_session_cost_usd
                .is_some_and(|ceiling| totals.total_cost_usd >= ceiling);
            let over_tokens = self
                .config
                .max_session_tokens
                .is_some_and(|ceiling| totals.total_tokens >= ceiling);
            (over_cost || over_tokens).then_some(ForcedSummaryReason::CostCeilingReached)
        };

        let Some(reason) = reason else {
            return;
        };
        warn!(
            session_id = %session.id,
            from = %session.active_role,
            turn_count = session.turn_count,
            "Forcing summary: {}",
            reason
        );
        session.force_summary(reason);
        metrics::counter!("vanguard_forced_summaries_total", "reason" => reason.as_str()).increment(1);
        self.events.publish(SessionEvent::SummaryForced {
            session_id: session.id,
            reason,
            forced_at: Utc::now(),
        });
        self.note(
            session.id,
            "coordinator:forced_summary",
            format!("Control forced to summary after {} turn(s): {}", session.turn_count, reason),
            session.turn_count,
        )
        .await;
    }

    async fn apply_action(
        &self,
        session: &mut Session,
        ctx: &SessionContext,
        action: &Action,
        cancel: &CancellationToken,
    ) -> Result<Applied, SwarmError> {
        let role = ctx.role;
        let seq = ctx.turn_seq;

        if routing::may_report(role) {
            let (report, note) = match action {
                Action::TerminalReport { content } if !content.trim().is_empty() => {
                    (content.clone(), None)
                }
                other => (
                    self.synthesize_report(session).await?,
                    Some(format!("summary emitted {}; report synthesized from memory", other.kind())),
                ),
            };
            let forced = session.forced_summary;
            self.complete(session, report.clone()).await;
            return Ok(Applied {
                outcome: TurnOutcome::Completed { seq, report, forced },
                note,
            });
        }

        match action {
            Action::Handoff { next_role, .. } if routing::is_allowed(role, *next_role) => {
                session.hand_off(*next_role);
                info!(session_id = %session.id, seq, from = %role, to = %next_role, "Handoff");
                Ok(Applied {
                    outcome: TurnOutcome::HandedOff {
                        seq,
                        from: role,
                        to: *next_role,
                    },
                    note: None,
                })
            }
            Action::Handoff { next_role, .. } => {
                let reason = format!("handoff from {} to {} is not allowed", role, next_role);
                Ok(self.reject(session, seq, role, reason).await)
            }
            Action::TerminalReport { .. } => {
                let reason = format!("{} may not end the session with a report", role);
                Ok(self.reject(session, seq, role, reason).await)
            }
            Action::ToolCall { request } => {
                let call = CallContext {
                    session_id: session.id,
                    role,
                    turn_seq: seq,
                    cancel: cancel.clone(),
                };
                match self.gateway.submit(&call, request.clone()).await? {
                    GatewayOutcome::Completed(result) => {
                        session.last_tool_result = Some(result.clone());
                        if result.status == ToolCallStatus::Cancelled || cancel.is_cancelled() {
                            self.mark_cancelled(session).await?;
                            return Ok(Applied {
                                outcome: TurnOutcome::Cancelled,
                                note: Some("session cancelled while the tool call was in flight".to_string()),
                            });
                        }
                        Ok(Applied {
                            outcome: TurnOutcome::ToolExecuted { seq, result },
                            note: None,
                        })
                    }
                    GatewayOutcome::ApprovalPending { approval, .. } => {
                        let outcome = TurnOutcome::AwaitingApproval {
                            seq,
                            tool_call_id: approval.tool_call_id,
                            tool: approval.request.tool.clone(),
                            tier: approval.tier,
                        };
                        session.await_approval(approval);
                        self.status_changed(session.id, SessionStatus::Running, session.status);
                        Ok(Applied { outcome, note: None })
                    }
                }
            }
        }
    }

    /// The role stays active; the rejection is visible in its next context.
    async fn reject(&self, session: &Session, seq: u64, role: AgentRole, reason: String) -> Applied {
        warn!(session_id = %session.id, seq, role = %role, "Action rejected: {}", reason);
        self.note(session.id, format!("coordinator:rejected:{}", seq), reason.clone(), seq)
            .await;
        Applied {
            outcome: TurnOutcome::ActionRejected {
                seq,
                role,
                reason: reason.clone(),
            },
            note: Some(reason),
        }
    }

    async fn synthesize_report(&self, session: &Session) -> Result<String, SwarmError> {
        let filter = MemoryFilter::all().latest_per_key().limit(REPORT_RECORD_LIMIT);
        let mut records = Vec::new();
        for category in MemoryCategory::ALL {
            records.extend(self.memory.query(session.id, category, &filter).await?);
        }
        Ok(report::synthesize(&session.objective, session.forced_summary, &records))
    }

    async fn complete(&self, session: &mut Session, report: String) {
        let from = session.status;
        session.complete(report);
        let totals = self.ledger.total(session.id).await;
        metrics::histogram!("vanguard_session_cost_usd").record(totals.total_cost_usd);
        info!(
            session_id = %session.id,
            turns = session.turn_count + 1,
            cost_usd = totals.total_cost_usd,
            "Session completed"
        );
        self.status_changed(session.id, from, session.status);
    }

    async fn fail(&self, session: &mut Session, reason: &str) -> Result<(), SwarmError> {
        let from = session.status;
        error!(session_id = %session.id, role = %session.active_role, "Session failed: {}", reason);
        session.fail(reason);
        self.note(
            session.id,
            "coordinator:failed",
            format!("Session failed during {} turn: {}", session.active_role, reason),
            session.turn_count,
        )
        .await;
        self.status_changed(session.id, from, session.status);
        self.persist(session).await
    }

    async fn mark_cancelled(&self, session: &mut Session) -> Result<(), SwarmError> {
        let from = session.status;
        if !session.cancel() {
            return Ok(());
        }
        let dropped = self.gateway.discard_pending(session.id);
        info!(session_id = %session.id, dropped_approvals = dropped, "Session cancelled");
        self.note(
            session.id,
            "coordinator:cancelled",
            format!("Session cancelled while {}", from),
            session.turn_count,
        )
        .await;
        self.status_changed(session.id, from, session.status);
        self.persist(session).await
    }

    async fn track_cost(&self, session: &mut Session) {
        let totals = self.ledger.total(session.id).await;
        let threshold = self.config.cost_warning_usd;
        if !session.cost_warning_emitted && threshold > 0.0 && totals.total_cost_usd >= threshold {
            session.cost_warning_emitted = true;
            warn!(
                session_id = %session.id,
                total_cost_usd = totals.total_cost_usd,
                threshold_usd = threshold,
                "Session cost crossed warning threshold"
            );
            self.events.publish(SessionEvent::CostWarning {
                session_id: session.id,
                total_cost_usd: totals.total_cost_usd,
                threshold_usd: threshold,
            });
        }
        self.events.publish(SessionEvent::CostUpdated {
            session_id: session.id,
            totals,
        });
    }

    async fn persist(&self, session: &mut Session) -> Result<(), SwarmError> {
        let checkpoint = Checkpoint::capture(session);
        self.checkpoints.save_checkpoint(&checkpoint).await?;
        session.last_checkpoint_at = Some(checkpoint.written_at);
        Ok(())
    }

    /// Coordinator annotations are best-effort; a failed write is logged.
    async fn note(&self, session_id: SessionId, key: impl Into<String>, content: String, source_turn: u64) {
        let record = MemoryRecord::new(session_id, MemoryCategory::Note, key, content, source_turn);
        if let Err(e) = self.memory.write(record).await {
            warn!(session_id = %session_id, error = %e, "Failed to write coordinator note");
        }
    }

    fn status_changed(&self, session_id: SessionId, from: SessionStatus, to: SessionStatus) {
        if from == to {
            return;
        }
        self.events.publish(SessionEvent::StatusChanged {
            session_id,
            from,
            to,
            changed_at: Utc::now(),
        });
    }
}

fn check_runnable(session: &Session) -> Result<(), SwarmError> {
    if session.is_terminal() {
        return Err(SwarmError::SessionTerminal {
            session_id: session.id,
            status: session.status,
        });
    }
    if let Some(pending) = &session.pending_approval {
        return Err(SwarmError::SessionBlocked {
            session_id: session.id,
            tool_call_id: pending.tool_call_id,
        });
    }
    Ok(())
}

/// Keeps the newest entry per sequence number and drops turns the checkpoint
/// never acknowledged.
fn reconcile_turns(mut turns: Vec<Turn>, turn_count: u64) -> Result<Vec<Turn>, String> {
    turns.reverse();
    let mut seen = std::collections::HashSet::new();
    turns.retain(|t| t.seq <= turn_count && seen.insert(t.seq));
    turns.sort_by_key(|t| t.seq);

    let gap_free = turns.iter().enumerate().all(|(i, t)| t.seq == i as u64 + 1);
    if turns.len() as u64 != turn_count || !gap_free {
        return Err(format!(
            "turn log holds {} contiguous turn(s) but checkpoint records {}",
            turns.len(),
            turn_count
        ));
    }
    Ok(turns)
}
