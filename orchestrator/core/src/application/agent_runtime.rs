// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Runtime
//!
//! Single entry point for all four roles: `execute(role, context) -> Action`.
//! Roles are a closed enum, so the prompt and the allowed action set are
//! resolved by exhaustive match rather than by per-role objects.
//!
//! The runtime owns the model backend retry budget. Usage of every successful
//! completion is priced and written to the cost ledger before the action is
//! returned.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::agent::{Action, ActionKind, AgentRequest, BackendError, ModelBackend, SessionContext};
use crate::domain::cost::{CostEntry, CostLedger, LedgerError};
use crate::domain::pricing::PricingTable;
use crate::domain::session::AgentRole;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Model backend unavailable after {attempts} attempt(s): {reason}")]
    BackendUnavailable { attempts: u32, reason: String },

    #[error("Failed to record model usage: {0}")]
    Ledger(#[from] LedgerError),
}

pub struct AgentRuntime {
    backend: Arc<dyn ModelBackend>,
    ledger: Arc<dyn CostLedger>,
    pricing: PricingTable,
    max_attempts: u32,
    retry_delay: Duration,
}

impl AgentRuntime {
    pub fn new(backend: Arc<dyn ModelBackend>, ledger: Arc<dyn CostLedger>, pricing: PricingTable) -> Self {
        Self {
            backend,
            ledger,
            pricing,
            max_attempts: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, retry_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    pub fn role_prompt(role: AgentRole) -> &'static str {
        match role {
            AgentRole::Planner => {
                "You coordinate the assessment. Review known facts and hand off to the role \
                 that should act next: recon to map the attack surface, init_access to plan \
                 initial access, or summary once the objective is met."
            }
            AgentRole::Recon => {
                "You perform reconnaissance. Propose discovery tool calls against in-scope \
                 targets, then hand back to planner or forward to init_access."
            }
            AgentRole::InitAccess => {
                "You plan initial access from discovered services and findings. Propose tool \
                 calls with an honest risk tier, then hand back to planner or on to summary."
            }
            AgentRole::Summary => {
                "You write the final assessment report from the recorded facts. Respond with a \
                 terminal report."
            }
        }
    }

    pub fn available_actions(role: AgentRole) -> Vec<ActionKind> {
        match role {
            AgentRole::Summary => vec![ActionKind::TerminalReport],
            AgentRole::Planner | AgentRole::Recon | AgentRole::InitAccess => {
                vec![ActionKind::Handoff, ActionKind::ToolCall]
            }
        }
    }

    /// Produces exactly one action for `role`.
    pub async fn execute(&self, role: AgentRole, ctx: &SessionContext) -> Result<Action, AgentError> {
        let request = AgentRequest {
            model: self.backend.model_name().to_string(),
            role,
            role_prompt: Self::role_prompt(role).to_string(),
            context: ctx.clone(),
            available_actions: Self::available_actions(role),
        };

        let mut last_error: Option<BackendError> = None;
        let mut attempts = 0;
        for attempt in 0..self.max_attempts {
            attempts = attempt + 1;
            match self.backend.complete(&request).await {
                Ok(response) => {
                    let model = response
                        .model
                        .clone()
                        .unwrap_or_else(|| self.backend.model_name().to_string());
                    let cost = self.pricing.cost(&model, response.usage);
                    self.ledger
                        .record(CostEntry::model_call(
                            ctx.session_id,
                            role,
                            ctx.turn_seq,
                            model,
                            response.usage,
                            cost,
                        ))
                        .await?;

                    debug!(
                        session_id = %ctx.session_id,
                        role = %role,
                        attempt = attempts,
                        input_tokens = response.usage.input_tokens,
                        output_tokens = response.usage.output_tokens,
                        cost_usd = cost,
                        "Model completion received"
                    );
                    return Ok(stamp(response.action, ctx.turn_seq));
                }
                Err(BackendError::Authentication(reason)) => {
                    return Err(AgentError::BackendUnavailable {
                        attempts,
                        reason: format!("authentication failed: {}", reason),
                    });
                }
                Err(e) => {
                    warn!(
                        session_id = %ctx.session_id,
                        role = %role,
                        "Model call failed (attempt {}/{}): {}",
                        attempts,
                        self.max_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempts < self.max_attempts {
                        tokio::time::sleep(self.retry_delay * 2_u32.pow(attempt.min(16))).await;
                    }
                }
            }
        }

        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        info!(session_id = %ctx.session_id, role = %role, attempts, "Model backend retry budget exhausted");
        Err(AgentError::BackendUnavailable { attempts, reason })
    }
}

/// Tool calls carry the sequence number of the turn that proposed them.
fn stamp(action: Action, turn_seq: u64) -> Action {
    match action {
        Action::ToolCall { mut request } => {
            request.requesting_turn = turn_seq;
            Action::ToolCall { request }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{ModelResponse, TokenUsage};
    use crate::domain::session::SessionId;
    use crate::domain::tool::ToolCallRequest;
    use crate::infrastructure::cost_ledger::CostLedgerStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Scripted {
        replies: Mutex<VecDeque<Result<ModelResponse, BackendError>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<ModelResponse, BackendError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ModelBackend for Scripted {
        async fn complete(&self, _request: &AgentRequest) -> Result<ModelResponse, BackendError> {
            *self.calls.lock() += 1;
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(BackendError::Unavailable("script exhausted".into())))
        }

        fn model_name(&self) -> &str {
            "gpt-4o-mini"
        }
    }

    fn ctx(role: AgentRole) -> SessionContext {
        SessionContext {
            session_id: SessionId::new(),
            objective: "Scan 192.168.1.100".to_string(),
            role,
            turn_seq: 7,
            forced_summary: None,
            memory: vec![],
            recent_turns: vec![],
            last_tool_result: None,
        }
    }

    fn reply(action: Action) -> Result<ModelResponse, BackendError> {
        Ok(ModelResponse {
            action,
            usage: TokenUsage {
                input_tokens: 1_000_000,
                output_tokens: 0,
            },
            model: None,
        })
    }

    #[tokio::test]
    async fn test_retries_then_succeeds_and_records_cost() {
        let backend = Arc::new(Scripted::new(vec![
            Err(BackendError::Unavailable("connection refused".into())),
            reply(Action::ToolCall {
                request: ToolCallRequest::new("nmap"),
            }),
        ]));
        let ledger = Arc::new(CostLedgerStore::in_memory());
        let runtime = AgentRuntime::new(backend.clone(), ledger.clone(), PricingTable::default())
            .with_retry(3, Duration::from_millis(1));

        let context = ctx(AgentRole::Recon);
        let action = runtime.execute(AgentRole::Recon, &context).await.unwrap();
        match action {
            Action::ToolCall { request } => assert_eq!(request.requesting_turn, 7),
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(*backend.calls.lock(), 2);

        let totals = ledger.total(context.session_id).await;
        assert_eq!(totals.model_calls, 1);
        assert!((totals.total_cost_usd - 0.15).abs() < 1e-9);
        assert_eq!(totals.by_role[&AgentRole::Recon].entries, 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_is_backend_unavailable() {
        let backend = Arc::new(Scripted::new(vec![]));
        let ledger = Arc::new(CostLedgerStore::in_memory());
        let runtime = AgentRuntime::new(backend.clone(), ledger, PricingTable::default())
            .with_retry(3, Duration::from_millis(1));

        let err = runtime.execute(AgentRole::Planner, &ctx(AgentRole::Planner)).await.unwrap_err();
        assert!(matches!(err, AgentError::BackendUnavailable { attempts: 3, .. }));
        assert_eq!(*backend.calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_authentication_failure_is_not_retried() {
        let backend = Arc::new(Scripted::new(vec![Err(BackendError::Authentication("bad key".into()))]));
        let runtime = AgentRuntime::new(backend.clone(), Arc::new(CostLedgerStore::in_memory()), PricingTable::default())
            .with_retry(3, Duration::from_millis(1));

        let err = runtime.execute(AgentRole::Planner, &ctx(AgentRole::Planner)).await.unwrap_err();
        assert!(matches!(err, AgentError::BackendUnavailable { attempts: 1, .. }));
        assert_eq!(*backend.calls.lock(), 1);
    }

    #[test]
    fn test_summary_may_only_report() {
        assert_eq!(
            AgentRuntime::available_actions(AgentRole::Summary),
            vec![ActionKind::TerminalReport]
        );
        assert!(!AgentRuntime::available_actions(AgentRole::Recon).contains(&ActionKind::TerminalReport));
    }
}
