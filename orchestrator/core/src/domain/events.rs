// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::ActionKind;
use crate::domain::cost::CostTotals;
use crate::domain::session::{AgentRole, ForcedSummaryReason, SessionId, SessionStatus};
use crate::domain::tool::{ApprovalOutcome, RiskTier, ToolCallId, ToolCallStatus};

/// Maximum characters of an agent response carried in a [`SessionEvent::TurnCompleted`].
pub const RESPONSE_EXCERPT_CHARS: usize = 200;

/// Live session events published to the UI / CLI event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        session_id: SessionId,
        objective: String,
        started_at: DateTime<Utc>,
    },
    SessionResumed {
        session_id: SessionId,
        active_role: AgentRole,
        turn_count: u64,
        resumed_at: DateTime<Utc>,
    },
    TurnCompleted {
        session_id: SessionId,
        seq: u64,
        role: AgentRole,
        action: ActionKind,
        excerpt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        completed_at: DateTime<Utc>,
    },
    ToolCallCompleted {
        session_id: SessionId,
        tool_call_id: ToolCallId,
        tool: String,
        tier: RiskTier,
        status: ToolCallStatus,
        duration_ms: u64,
        retry_count: u32,
        completed_at: DateTime<Utc>,
    },
    ApprovalRequested {
        session_id: SessionId,
        tool_call_id: ToolCallId,
        tool: String,
        tier: RiskTier,
        requested_by: AgentRole,
        reasons: Vec<String>,
        requested_at: DateTime<Utc>,
    },
    ApprovalResolved {
        session_id: SessionId,
        tool_call_id: ToolCallId,
        outcome: ApprovalOutcome,
        decided_by: String,
        resolved_at: DateTime<Utc>,
    },
    CostUpdated {
        session_id: SessionId,
        totals: CostTotals,
    },
    CostWarning {
        session_id: SessionId,
        total_cost_usd: f64,
        threshold_usd: f64,
    },
    SummaryForced {
        session_id: SessionId,
        reason: ForcedSummaryReason,
        forced_at: DateTime<Utc>,
    },
    StatusChanged {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
        changed_at: DateTime<Utc>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            SessionEvent::SessionStarted { session_id, .. }
            | SessionEvent::SessionResumed { session_id, .. }
            | SessionEvent::TurnCompleted { session_id, .. }
            | SessionEvent::ToolCallCompleted { session_id, .. }
            | SessionEvent::ApprovalRequested { session_id, .. }
            | SessionEvent::ApprovalResolved { session_id, .. }
            | SessionEvent::CostUpdated { session_id, .. }
            | SessionEvent::CostWarning { session_id, .. }
            | SessionEvent::SummaryForced { session_id, .. }
            | SessionEvent::StatusChanged { session_id, .. } => *session_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::SessionResumed { .. } => "session_resumed",
            SessionEvent::TurnCompleted { .. } => "turn_completed",
            SessionEvent::ToolCallCompleted { .. } => "tool_call_completed",
            SessionEvent::ApprovalRequested { .. } => "approval_requested",
            SessionEvent::ApprovalResolved { .. } => "approval_resolved",
            SessionEvent::CostUpdated { .. } => "cost_updated",
            SessionEvent::CostWarning { .. } => "cost_warning",
            SessionEvent::SummaryForced { .. } => "summary_forced",
            SessionEvent::StatusChanged { .. } => "status_changed",
        }
    }
}
