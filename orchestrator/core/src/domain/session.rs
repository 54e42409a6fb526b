// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Session Aggregate
//!
//! One assessment run coordinated by the swarm coordinator.
//!
//! | Type | Role |
//! |------|------|
//! | [`Session`] | Aggregate root; mutated only through coordinator transitions |
//! | [`AgentRole`] | Closed set of routing labels |
//! | [`Turn`] | Append-only log entry for one role's execution step |
//! | [`Checkpoint`] | Serializable snapshot written after every turn |
//!
//! ## State Machine
//!
//! ```text
//! running ──▶ awaiting_approval ──▶ running      (once per gated tool call)
//! running ──▶ completed | failed | cancelled     (terminal)
//! awaiting_approval ──▶ cancelled
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::agent::Action;
use crate::domain::tool::{RiskTier, ToolCallId, ToolCallRequest, ToolCallResult};

/// Unique identifier for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The four fixed agent responsibilities.
///
/// A role is a routing label, not a live object: the runtime for a role is
/// assembled per turn from session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Recon,
    InitAccess,
    Summary,
}

impl AgentRole {
    pub const ALL: [AgentRole; 4] = [
        AgentRole::Planner,
        AgentRole::Recon,
        AgentRole::InitAccess,
        AgentRole::Summary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::Recon => "recon",
            AgentRole::InitAccess => "init_access",
            AgentRole::Summary => "summary",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "planner" => Ok(AgentRole::Planner),
            "recon" => Ok(AgentRole::Recon),
            "init_access" | "initaccess" => Ok(AgentRole::InitAccess),
            "summary" => Ok(AgentRole::Summary),
            other => Err(format!("unknown agent role '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    /// `completed`, `failed` and `cancelled` admit no further turns.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::AwaitingApproval => "awaiting_approval",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the coordinator routed control to Summary on its own authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForcedSummaryReason {
    BudgetExhausted,
    CostCeilingReached,
}

impl ForcedSummaryReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForcedSummaryReason::BudgetExhausted => "budget exhausted",
            ForcedSummaryReason::CostCeilingReached => "cost ceiling reached",
        }
    }
}

impl fmt::Display for ForcedSummaryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A gated tool call waiting on a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    pub tool_call_id: ToolCallId,
    pub request: ToolCallRequest,
    pub requested_by: AgentRole,
    pub turn_seq: u64,
    pub tier: RiskTier,
    pub requested_at: DateTime<Utc>,
}

/// Aggregate root for one assessment run.
///
/// # Invariants
///
/// - Exactly one role is active at any instant.
/// - `turn_count` equals the length of the session's turn log.
/// - `pending_approval` is `Some` iff `status == AwaitingApproval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub objective: String,
    pub active_role: AgentRole,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    pub turn_count: u64,
    #[serde(default)]
    pub forced_summary: Option<ForcedSummaryReason>,
    #[serde(default)]
    pub pending_approval: Option<PendingApproval>,
    #[serde(default)]
    pub last_tool_result: Option<ToolCallResult>,
    #[serde(default)]
    pub cost_warning_emitted: bool,
    #[serde(default)]
    pub report: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    /// New sessions start `running` with the Planner active.
    pub fn new(objective: impl Into<String>) -> Self {
        Self {
            id: SessionId::new(),
            objective: objective.into(),
            active_role: AgentRole::Planner,
            status: SessionStatus::Running,
            created_at: Utc::now(),
            last_checkpoint_at: None,
            turn_count: 0,
            forced_summary: None,
            pending_approval: None,
            last_tool_result: None,
            cost_warning_emitted: false,
            report: None,
            failure_reason: None,
            ended_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Sequence number the next turn will carry.
    pub fn next_seq(&self) -> u64 {
        self.turn_count + 1
    }

    pub fn hand_off(&mut self, to: AgentRole) {
        self.active_role = to;
    }

    pub fn force_summary(&mut self, reason: ForcedSummaryReason) {
        self.forced_summary = Some(reason);
        self.active_role = AgentRole::Summary;
    }

    pub fn await_approval(&mut self, pending: PendingApproval) {
        self.pending_approval = Some(pending);
        self.status = SessionStatus::AwaitingApproval;
    }

    /// Clears the pending approval and returns the session to `running`.
    pub fn release_approval(&mut self) -> Option<PendingApproval> {
        let pending = self.pending_approval.take();
        if self.status == SessionStatus::AwaitingApproval {
            self.status = SessionStatus::Running;
        }
        pending
    }

    pub fn complete(&mut self, report: String) {
        self.report = Some(report);
        self.finish(SessionStatus::Completed);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure_reason = Some(reason.into());
        self.finish(SessionStatus::Failed);
    }

    /// Returns `false` when the session had already ended.
    pub fn cancel(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.pending_approval = None;
        self.finish(SessionStatus::Cancelled);
        true
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// Identifies a turn within the session's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TurnId {
    pub session_id: SessionId,
    pub seq: u64,
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session_id, self.seq)
    }
}

/// What the role saw when it produced its action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRef {
    pub memory_records: usize,
    pub turn_tail: usize,
}

/// One role's execution step. Turns form the session's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub session_id: SessionId,
    pub seq: u64,
    pub role: AgentRole,
    pub action: Action,
    pub context_ref: ContextRef,
    /// Coordinator annotation (rejected handoff, synthesized report, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn new(
        session_id: SessionId,
        seq: u64,
        role: AgentRole,
        action: Action,
        context_ref: ContextRef,
    ) -> Self {
        Self {
            session_id,
            seq,
            role,
            action,
            context_ref,
            note: None,
            timestamp: Utc::now(),
        }
    }

    pub fn id(&self) -> TurnId {
        TurnId {
            session_id: self.session_id,
            seq: self.seq,
        }
    }
}

/// Snapshot written after every turn; reloaded to resume after restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session: Session,
    pub turn_count: u64,
    pub active_role: AgentRole,
    pub pending_approval: Option<PendingApproval>,
    pub written_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn capture(session: &Session) -> Self {
        let written_at = Utc::now();
        let mut snapshot = session.clone();
        snapshot.last_checkpoint_at = Some(written_at);
        Self {
            turn_count: session.turn_count,
            active_role: session.active_role,
            pending_approval: session.pending_approval.clone(),
            session: snapshot,
            written_at,
        }
    }

    /// Rebuilds the session; the checkpoint's top-level fields win.
    pub fn restore(self) -> Session {
        let mut session = self.session;
        session.turn_count = self.turn_count;
        session.active_role = self.active_role;
        session.pending_approval = self.pending_approval;
        session.last_checkpoint_at = Some(self.written_at);
        session
    }
}
