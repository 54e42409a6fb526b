// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Cost ledger with an optional append-only JSONL log (`cost_log.jsonl`).

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::cost::{CostEntry, CostLedger, CostTotals, LedgerError, LedgerSummary};
use crate::domain::session::SessionId;
use crate::infrastructure::jsonl;

pub const COST_LOG_FILE: &str = "cost_log.jsonl";

pub struct CostLedgerStore {
    entries: DashMap<SessionId, Arc<Mutex<Vec<CostEntry>>>>,
    log_path: Option<PathBuf>,
    /// Serializes appends so lines never interleave.
    log_lock: Mutex<()>,
}

impl CostLedgerStore {
    pub fn in_memory() -> Self {
        Self {
            entries: DashMap::new(),
            log_path: None,
            log_lock: Mutex::new(()),
        }
    }

    /// Opens (or creates) the cost log and replays existing entries.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let log_path = data_dir.as_ref().join(COST_LOG_FILE);
        let ledger = Self {
            entries: DashMap::new(),
            log_path: Some(log_path.clone()),
            log_lock: Mutex::new(()),
        };
        let existing: Vec<CostEntry> = jsonl::read_all(&log_path)?;
        if !existing.is_empty() {
            info!(path = %log_path.display(), entries = existing.len(), "Replayed cost log");
        }
        for entry in existing {
            ledger.push(entry);
        }
        Ok(ledger)
    }

    /// Reads a cost log without keeping a ledger open (CLI analysis).
    pub fn read_log(path: impl AsRef<Path>) -> Result<Vec<CostEntry>, LedgerError> {
        Ok(jsonl::read_all(path.as_ref())?)
    }

    fn push(&self, entry: CostEntry) {
        self.entries
            .entry(entry.session_id)
            .or_default()
            .lock()
            .push(entry);
    }
}

#[async_trait]
impl CostLedger for CostLedgerStore {
    async fn record(&self, entry: CostEntry) -> Result<(), LedgerError> {
        if let Some(path) = &self.log_path {
            let _guard = self.log_lock.lock();
            jsonl::append(path, &entry)?;
        }
        debug!(
            session_id = %entry.session_id,
            role = %entry.role,
            kind = %entry.kind,
            quantity = entry.quantity,
            cost_usd = entry.cost_usd,
            "Cost entry recorded"
        );
        self.push(entry);
        Ok(())
    }

    async fn total(&self, session_id: SessionId) -> CostTotals {
        match self.entries.get(&session_id) {
            Some(entries) => CostTotals::from_entries(session_id, entries.lock().iter()),
            None => CostTotals::empty(session_id),
        }
    }

    async fn summary(&self) -> LedgerSummary {
        let all: Vec<CostEntry> = self
            .entries
            .iter()
            .flat_map(|e| e.value().lock().clone())
            .collect();
        LedgerSummary::from_entries(&all)
    }

    async fn entries(&self, session_id: SessionId) -> Vec<CostEntry> {
        self.entries
            .get(&session_id)
            .map(|e| e.lock().clone())
            .unwrap_or_default()
    }
}
