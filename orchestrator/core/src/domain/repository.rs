// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::session::{Checkpoint, SessionId, Turn};

/// Durable checkpoint and turn-log storage, keyed by session id.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Replaces the session's latest checkpoint.
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    async fn load_checkpoint(&self, session_id: SessionId) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn append_turn(&self, turn: &Turn) -> Result<(), CheckpointError>;

    /// Turns in sequence order.
    async fn load_turns(&self, session_id: SessionId) -> Result<Vec<Turn>, CheckpointError>;

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, CheckpointError>;
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt checkpoint for session {session_id}: {reason}")]
    Corrupt { session_id: SessionId, reason: String },
}
