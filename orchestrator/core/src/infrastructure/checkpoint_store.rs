// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Checkpoint Stores
//!
//! | Store | Layout |
//! |-------|--------|
//! | [`FileCheckpointStore`] | `<dir>/checkpoints/<id>.json` (atomic replace), `<dir>/turns/<id>.jsonl` (append) |
//! | [`InMemoryCheckpointStore`] | maps, for tests and ephemeral runs |

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::repository::{CheckpointError, CheckpointStore};
use crate::domain::session::{Checkpoint, SessionId, Turn};
use crate::infrastructure::jsonl;

pub struct FileCheckpointStore {
    root: PathBuf,
    turn_log_lock: Mutex<()>,
}

impl FileCheckpointStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            root: data_dir.as_ref().to_path_buf(),
            turn_log_lock: Mutex::new(()),
        }
    }

    fn checkpoint_dir(&self) -> PathBuf {
        self.root.join("checkpoints")
    }

    fn checkpoint_path(&self, session_id: SessionId) -> PathBuf {
        self.checkpoint_dir().join(format!("{}.json", session_id))
    }

    fn turns_path(&self, session_id: SessionId) -> PathBuf {
        self.root.join("turns").join(format!("{}.jsonl", session_id))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.checkpoint_path(checkpoint.session.id);
        let bytes = serde_json::to_vec_pretty(checkpoint)?;
        jsonl::write_atomic(&path, &bytes)?;
        debug!(
            session_id = %checkpoint.session.id,
            turn_count = checkpoint.turn_count,
            "Checkpoint written"
        );
        Ok(())
    }

    async fn load_checkpoint(&self, session_id: SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.checkpoint_path(session_id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint: Checkpoint = serde_json::from_slice(&bytes)?;
        if checkpoint.session.id != session_id {
            return Err(CheckpointError::Corrupt {
                session_id,
                reason: format!("file holds session {}", checkpoint.session.id),
            });
        }
        Ok(Some(checkpoint))
    }

    async fn append_turn(&self, turn: &Turn) -> Result<(), CheckpointError> {
        let _guard = self.turn_log_lock.lock();
        jsonl::append(&self.turns_path(turn.session_id), turn)?;
        Ok(())
    }

    async fn load_turns(&self, session_id: SessionId) -> Result<Vec<Turn>, CheckpointError> {
        let mut turns: Vec<Turn> = jsonl::read_all(&self.turns_path(session_id))?;
        turns.sort_by_key(|t| t.seq);
        Ok(turns)
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let dir = self.checkpoint_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut checkpoints = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = std::fs::read(&path)?;
            match serde_json::from_slice::<Checkpoint>(&bytes) {
                Ok(checkpoint) => checkpoints.push(checkpoint),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint"),
            }
        }
        checkpoints.sort_by_key(|c| c.session.created_at);
        Ok(checkpoints)
    }
}

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: DashMap<SessionId, Checkpoint>,
    turns: DashMap<SessionId, Vec<Turn>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.checkpoints
            .insert(checkpoint.session.id, checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, session_id: SessionId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.checkpoints.get(&session_id).map(|c| c.value().clone()))
    }

    async fn append_turn(&self, turn: &Turn) -> Result<(), CheckpointError> {
        self.turns
            .entry(turn.session_id)
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn load_turns(&self, session_id: SessionId) -> Result<Vec<Turn>, CheckpointError> {
        Ok(self
            .turns
            .get(&session_id)
            .map(|t| t.value().clone())
            .unwrap_or_default())
    }

    async fn list_checkpoints(&self) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut all: Vec<Checkpoint> = self.checkpoints.iter().map(|c| c.value().clone()).collect();
        all.sort_by_key(|c| c.session.created_at);
        Ok(all)
    }
}
