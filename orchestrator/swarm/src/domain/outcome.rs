// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};
use vanguard_core::domain::session::{AgentRole, ForcedSummaryReason};
use vanguard_core::domain::tool::{RiskTier, ToolCallId, ToolCallResult};

/// What one call to `advance` did to the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    HandedOff {
        seq: u64,
        from: AgentRole,
        to: AgentRole,
    },
    /// The role asked for something the routing table does not allow; it stays active.
    ActionRejected {
        seq: u64,
        role: AgentRole,
        reason: String,
    },
    ToolExecuted {
        seq: u64,
        result: ToolCallResult,
    },
    AwaitingApproval {
        seq: u64,
        tool_call_id: ToolCallId,
        tool: String,
        tier: RiskTier,
    },
    Completed {
        seq: u64,
        report: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        forced: Option<ForcedSummaryReason>,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

impl TurnOutcome {
    /// Sequence number of the turn this outcome appended, if any.
    pub fn seq(&self) -> Option<u64> {
        match self {
            TurnOutcome::HandedOff { seq, .. }
            | TurnOutcome::ActionRejected { seq, .. }
            | TurnOutcome::ToolExecuted { seq, .. }
            | TurnOutcome::AwaitingApproval { seq, .. }
            | TurnOutcome::Completed { seq, .. } => Some(*seq),
            TurnOutcome::Failed { .. } | TurnOutcome::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnOutcome::Completed { .. } | TurnOutcome::Failed { .. } | TurnOutcome::Cancelled
        )
    }
}
