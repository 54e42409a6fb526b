// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Approval Registry - Infrastructure for human-in-the-loop tool gating
//!
//! Holds gated tool calls until a human decides. Nothing here blocks: a
//! pending call is parked and the caller returns `ApprovalPending`. Decisions
//! are handed back to the gateway, which writes them to session memory.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::session::{PendingApproval, SessionId};
use crate::domain::tool::{ApprovalDecision, ApprovalOutcome, ToolCallId};

/// A parked tool call (for listing and prompting)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub session_id: SessionId,
    pub approval: PendingApproval,
    /// Why the classifier gated the call
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl ApprovalRequest {
    pub fn tool_call_id(&self) -> ToolCallId {
        self.approval.tool_call_id
    }

    pub fn requested_at(&self) -> DateTime<Utc> {
        self.approval.requested_at
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("No pending approval for tool call {0}")]
    NotFound(ToolCallId),
}

#[derive(Default)]
pub struct ApprovalRegistry {
    pending: RwLock<HashMap<ToolCallId, ApprovalRequest>>,
}

impl ApprovalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, request: ApprovalRequest) {
        info!(
            tool_call_id = %request.tool_call_id(),
            session_id = %request.session_id,
            tool = %request.approval.request.tool,
            tier = %request.approval.tier,
            "Human approval requested"
        );
        self.pending.write().insert(request.tool_call_id(), request);
    }

    /// Removes the pending call and stamps the decision
    pub fn resolve(
        &self,
        tool_call_id: ToolCallId,
        outcome: ApprovalOutcome,
        decided_by: impl Into<String>,
    ) -> Result<(ApprovalRequest, ApprovalDecision), ApprovalError> {
        let request = self
            .pending
            .write()
            .remove(&tool_call_id)
            .ok_or(ApprovalError::NotFound(tool_call_id))?;

        let decision = ApprovalDecision {
            tool_call_id,
            session_id: request.session_id,
            outcome,
            decided_by: decided_by.into(),
            decided_at: Utc::now(),
        };
        info!(
            tool_call_id = %tool_call_id,
            session_id = %request.session_id,
            outcome = %outcome,
            decided_by = %decision.decided_by,
            "Human approval resolved"
        );
        Ok((request, decision))
    }

    pub fn get(&self, tool_call_id: ToolCallId) -> Option<ApprovalRequest> {
        self.pending.read().get(&tool_call_id).cloned()
    }

    /// Oldest first
    pub fn list_pending(&self) -> Vec<ApprovalRequest> {
        let mut pending: Vec<ApprovalRequest> = self.pending.read().values().cloned().collect();
        pending.sort_by_key(|r| r.requested_at());
        pending
    }

    /// Pending calls parked for longer than `timeout`
    pub fn stale(&self, timeout: Duration) -> Vec<ToolCallId> {
        let cutoff = Utc::now() - timeout;
        self.pending
            .read()
            .values()
            .filter(|r| r.requested_at() <= cutoff)
            .map(|r| r.tool_call_id())
            .collect()
    }

    /// Drops every pending call of a session without recording a decision
    pub fn discard_session(&self, session_id: SessionId) -> usize {
        let mut pending = self.pending.write();
        let before = pending.len();
        pending.retain(|_, r| r.session_id != session_id);
        let dropped = before - pending.len();
        if dropped > 0 {
            debug!(session_id = %session_id, dropped, "Discarded pending approvals");
        }
        dropped
    }
}
