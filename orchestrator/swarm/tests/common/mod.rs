// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

// Shared fakes for coordinator integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vanguard_core::application::{AgentRuntime, ToolGateway};
use vanguard_core::domain::agent::{
    Action, AgentRequest, BackendError, ModelBackend, ModelResponse, SessionContext, TokenUsage,
};
use vanguard_core::domain::config::{CoordinatorConfig, GatewayConfig};
use vanguard_core::domain::memory::{
    MemoryCategory, MemoryError, MemoryFilter, MemoryRecord, MemoryStore, RecordId, ScoredRecord,
};
use vanguard_core::domain::policy::{RiskClassifier, RiskPolicy};
use vanguard_core::domain::pricing::PricingTable;
use vanguard_core::domain::repository::CheckpointStore;
use vanguard_core::domain::session::{AgentRole, SessionId};
use vanguard_core::domain::tool::{
    ToolCallRequest, ToolInvocation, ToolServer, ToolServerError, ToolServerResponse,
    ToolServerStatus,
};
use vanguard_core::infrastructure::approval_registry::ApprovalRegistry;
use vanguard_core::infrastructure::checkpoint_store::{FileCheckpointStore, InMemoryCheckpointStore};
use vanguard_core::infrastructure::cost_ledger::CostLedgerStore;
use vanguard_core::infrastructure::embedding::HashingEmbedder;
use vanguard_core::infrastructure::event_bus::EventBus;
use vanguard_core::infrastructure::memory_store::SessionMemoryStore;
use vanguard_swarm::SwarmCoordinator;

/// Model backend that answers from a per-role script.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<AgentRole, VecDeque<Action>>>,
    seen: Mutex<Vec<SessionContext>>,
}

impl ScriptedBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(self: &Arc<Self>, role: AgentRole, action: Action) -> Arc<Self> {
        self.scripts.lock().entry(role).or_default().push_back(action);
        self.clone()
    }

    /// Contexts handed to the backend, in call order.
    pub fn contexts(&self) -> Vec<SessionContext> {
        self.seen.lock().clone()
    }

    pub fn last_context(&self, role: AgentRole) -> Option<SessionContext> {
        self.seen.lock().iter().rev().find(|c| c.role == role).cloned()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn complete(&self, request: &AgentRequest) -> Result<ModelResponse, BackendError> {
        self.seen.lock().push(request.context.clone());
        let action = self
            .scripts
            .lock()
            .get_mut(&request.role)
            .and_then(|queue| queue.pop_front());
        match action {
            Some(action) => Ok(ModelResponse {
                action,
                usage: TokenUsage {
                    input_tokens: 1_000,
                    output_tokens: 100,
                },
                model: None,
            }),
            None => Err(BackendError::Unavailable(format!(
                "no scripted reply for {}",
                request.role
            ))),
        }
    }

    fn model_name(&self) -> &str {
        "gpt-4o-mini"
    }
}

pub enum ToolStep {
    Ok(Value),
    Fail(String),
    Hang,
}

/// Tool server answering from a queue; an empty queue hangs.
#[derive(Default)]
pub struct ScriptedTools {
    steps: Mutex<VecDeque<ToolStep>>,
    invocations: Mutex<Vec<ToolInvocation>>,
}

impl ScriptedTools {
    pub fn new(steps: Vec<ToolStep>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl ToolServer for ScriptedTools {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolServerResponse, ToolServerError> {
        self.invocations.lock().push(invocation.clone());
        let step = self.steps.lock().pop_front();
        match step {
            Some(ToolStep::Ok(output)) => Ok(ToolServerResponse {
                status: ToolServerStatus::Ok,
                output,
                duration_ms: 25,
            }),
            Some(ToolStep::Fail(reason)) => Err(ToolServerError::Transport(reason)),
            Some(ToolStep::Hang) | None => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ToolServerError::Transport("hung".to_string()))
            }
        }
    }
}

/// Session memory that starts failing writes once its allowance runs out.
pub struct FlakyMemory {
    inner: SessionMemoryStore,
    allowance: AtomicUsize,
}

impl FlakyMemory {
    fn new() -> Self {
        Self {
            inner: SessionMemoryStore::in_memory(Arc::new(HashingEmbedder::default())),
            allowance: AtomicUsize::new(usize::MAX),
        }
    }

    /// Lets `writes` more writes through, then fails every one after.
    pub fn fail_after(&self, writes: usize) {
        self.allowance.store(writes, Ordering::SeqCst);
    }
}

#[async_trait]
impl MemoryStore for FlakyMemory {
    async fn write(&self, record: MemoryRecord) -> Result<RecordId, MemoryError> {
        if self
            .allowance
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
        {
            return Err(MemoryError::Persistence("disk full".to_string()));
        }
        self.inner.write(record).await
    }

    async fn query(
        &self,
        session_id: SessionId,
        category: MemoryCategory,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        self.inner.query(session_id, category, filter).await
    }

    async fn semantic_search(
        &self,
        session_id: SessionId,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, MemoryError> {
        self.inner.semantic_search(session_id, query_text, k).await
    }

    async fn count(&self, session_id: SessionId) -> Result<usize, MemoryError> {
        self.inner.count(session_id).await
    }
}

pub struct Harness {
    pub coordinator: SwarmCoordinator,
    pub memory: Arc<FlakyMemory>,
    pub ledger: Arc<CostLedgerStore>,
    pub approvals: Arc<ApprovalRegistry>,
    pub events: EventBus,
}

pub fn coordinator_config(max_turns: u64) -> CoordinatorConfig {
    CoordinatorConfig {
        max_turns,
        cost_warning_usd: 0.0,
        ..CoordinatorConfig::default()
    }
}

pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        call_timeout_ms: 50,
        max_attempts: 3,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        tool_cost_per_second_usd: 0.0,
    }
}

pub fn harness(
    backend: Arc<ScriptedBackend>,
    tools: Arc<ScriptedTools>,
    config: CoordinatorConfig,
) -> Harness {
    build(backend, tools, config, Arc::new(InMemoryCheckpointStore::new()))
}

pub fn harness_on_disk(
    backend: Arc<ScriptedBackend>,
    tools: Arc<ScriptedTools>,
    config: CoordinatorConfig,
    data_dir: &Path,
) -> Harness {
    build(backend, tools, config, Arc::new(FileCheckpointStore::new(data_dir)))
}

fn build(
    backend: Arc<ScriptedBackend>,
    tools: Arc<ScriptedTools>,
    config: CoordinatorConfig,
    checkpoints: Arc<dyn CheckpointStore>,
) -> Harness {
    let memory = Arc::new(FlakyMemory::new());
    let ledger = Arc::new(CostLedgerStore::in_memory());
    let approvals = Arc::new(ApprovalRegistry::new());
    let events = EventBus::new(256);

    let runtime = AgentRuntime::new(backend, ledger.clone(), PricingTable::default())
        .with_retry(2, Duration::from_millis(1));
    let gateway = ToolGateway::new(
        RiskClassifier::new(&RiskPolicy::default()).expect("default policy compiles"),
        tools,
        approvals.clone(),
        memory.clone(),
        ledger.clone(),
        events.clone(),
        gateway_config(),
    );
    let coordinator = SwarmCoordinator::new(
        Arc::new(runtime),
        Arc::new(gateway),
        memory.clone(),
        ledger.clone(),
        checkpoints,
        events.clone(),
        config,
    );
    Harness {
        coordinator,
        memory,
        ledger,
        approvals,
        events,
    }
}

pub fn handoff(to: AgentRole) -> Action {
    Action::Handoff {
        next_role: to,
        rationale: format!("continue with {}", to),
    }
}

pub fn tool_call(request: ToolCallRequest) -> Action {
    Action::ToolCall { request }
}

pub fn report(content: &str) -> Action {
    Action::TerminalReport {
        content: content.to_string(),
    }
}
