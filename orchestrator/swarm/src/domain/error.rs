// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;
use vanguard_core::application::GatewayError;
use vanguard_core::domain::cost::LedgerError;
use vanguard_core::domain::memory::MemoryError;
use vanguard_core::domain::repository::CheckpointError;
use vanguard_core::domain::session::{SessionId, SessionStatus};
use vanguard_core::domain::tool::ToolCallId;
use vanguard_core::infrastructure::approval_registry::ApprovalError;

/// Caller-facing coordinator errors. All but `Internal` are recoverable by
/// correcting the call.
#[derive(Debug, Error)]
pub enum SwarmError {
    #[error("Objective must not be empty")]
    InvalidObjective,

    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("Session {session_id} is {status} and admits no further turns")]
    SessionTerminal {
        session_id: SessionId,
        status: SessionStatus,
    },

    #[error("Session {session_id} is blocked on approval of tool call {tool_call_id}")]
    SessionBlocked {
        session_id: SessionId,
        tool_call_id: ToolCallId,
    },

    #[error("No pending approval for tool call {0}")]
    NoPendingApproval(ToolCallId),

    /// Storage failure that kept the coordinator from persisting state.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<CheckpointError> for SwarmError {
    fn from(e: CheckpointError) -> Self {
        SwarmError::Internal(format!("checkpoint store: {}", e))
    }
}

impl From<MemoryError> for SwarmError {
    fn from(e: MemoryError) -> Self {
        SwarmError::Internal(format!("memory store: {}", e))
    }
}

impl From<LedgerError> for SwarmError {
    fn from(e: LedgerError) -> Self {
        SwarmError::Internal(format!("cost ledger: {}", e))
    }
}

impl From<GatewayError> for SwarmError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::Approval(ApprovalError::NotFound(id)) => SwarmError::NoPendingApproval(id),
            GatewayError::Memory(e) => e.into(),
            GatewayError::Ledger(e) => e.into(),
        }
    }
}
