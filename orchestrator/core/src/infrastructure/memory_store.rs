// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Session Memory Store
//!
//! Append-only [`MemoryStore`] partitioned by session id. Each partition sits
//! behind its own lock, so sessions never contend with each other and readers
//! of one session only wait on writers of that same session.
//!
//! With a log directory configured every record is also appended to
//! `<dir>/memory/<session_id>.jsonl` and partitions are reloaded lazily on
//! first access after a restart.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::memory::{
    EmbeddingProvider, MemoryCategory, MemoryError, MemoryFilter, MemoryRecord, MemoryStore,
    RecordId, ScoredRecord, SearchMethod,
};
use crate::domain::session::SessionId;
use crate::infrastructure::embedding::{cosine_similarity, tokenize};
use crate::infrastructure::jsonl;

type Partition = Arc<RwLock<Vec<MemoryRecord>>>;

pub struct SessionMemoryStore {
    partitions: DashMap<SessionId, Partition>,
    embedder: Arc<dyn EmbeddingProvider>,
    log_dir: Option<PathBuf>,
}

impl SessionMemoryStore {
    pub fn in_memory(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            partitions: DashMap::new(),
            embedder,
            log_dir: None,
        }
    }

    pub fn persistent(embedder: Arc<dyn EmbeddingProvider>, data_dir: impl AsRef<Path>) -> Self {
        Self {
            partitions: DashMap::new(),
            embedder,
            log_dir: Some(data_dir.as_ref().join("memory")),
        }
    }

    fn log_path(&self, session_id: SessionId) -> Option<PathBuf> {
        self.log_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", session_id)))
    }

    fn partition(&self, session_id: SessionId) -> Result<Partition, MemoryError> {
        if let Some(partition) = self.partitions.get(&session_id) {
            return Ok(partition.clone());
        }
        let records = match self.log_path(session_id) {
            Some(path) => {
                let records: Vec<MemoryRecord> = jsonl::read_all(&path)?;
                if !records.is_empty() {
                    debug!(session_id = %session_id, records = records.len(), "Reloaded memory partition");
                }
                records
            }
            None => Vec::new(),
        };
        Ok(self
            .partitions
            .entry(session_id)
            .or_insert_with(|| Arc::new(RwLock::new(records)))
            .clone())
    }

    fn keyword_search(records: &[MemoryRecord], query_text: &str, k: usize) -> Vec<ScoredRecord> {
        let terms: HashSet<String> = tokenize(query_text).collect();
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .rev()
            .filter_map(|record| {
                let haystack = format!("{} {}", record.key, record.content).to_lowercase();
                let hits = terms
                    .iter()
                    .filter(|term| {
                        record.category.as_str() == term.as_str() || haystack.contains(term.as_str())
                    })
                    .count();
                (hits > 0).then(|| ScoredRecord {
                    record: record.without_embedding(),
                    score: hits as f32 / terms.len() as f32,
                    method: SearchMethod::Keyword,
                })
            })
            .collect();
        // Stable: equal scores keep newest-first order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}

#[async_trait]
impl MemoryStore for SessionMemoryStore {
    async fn write(&self, mut record: MemoryRecord) -> Result<RecordId, MemoryError> {
        if record.embedding.is_none() {
            let text = format!("{} {} {}", record.category, record.key, record.content);
            match self.embedder.embed(&text).await {
                Ok(vector) => record.embedding = Some(vector),
                Err(e) => debug!(error = %e, "Storing memory record without embedding"),
            }
        }

        let partition = self.partition(record.session_id)?;
        if let Some(path) = self.log_path(record.session_id) {
            jsonl::append(&path, &record)?;
        }

        let id = record.id;
        debug!(
            session_id = %record.session_id,
            category = %record.category,
            key = %record.key,
            source_turn = record.source_turn,
            "Memory record written"
        );
        partition.write().push(record);
        Ok(id)
    }

    async fn query(
        &self,
        session_id: SessionId,
        category: MemoryCategory,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryRecord>, MemoryError> {
        let partition = self.partition(session_id)?;
        let records = partition.read();
        let mut seen_keys = HashSet::new();
        let limit = filter.limit.unwrap_or(usize::MAX);

        Ok(records
            .iter()
            .rev()
            .filter(|record| record.category == category && filter.matches(record))
            .filter(|record| !filter.latest_per_key || seen_keys.insert(record.key.clone()))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn semantic_search(
        &self,
        session_id: SessionId,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, MemoryError> {
        let partition = self.partition(session_id)?;

        let query_vector = match self.embedder.embed(query_text).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Embedding unavailable, falling back to keyword search");
                None
            }
        };

        let records = partition.read();
        let Some(query_vector) = query_vector else {
            return Ok(Self::keyword_search(&records, query_text, k));
        };

        let mut scored: Vec<ScoredRecord> = records
            .iter()
            .rev()
            .filter_map(|record| {
                let embedding = record.embedding.as_ref()?;
                Some(ScoredRecord {
                    score: cosine_similarity(&query_vector, embedding),
                    record: record.without_embedding(),
                    method: SearchMethod::Semantic,
                })
            })
            .collect();

        if scored.is_empty() {
            return Ok(Self::keyword_search(&records, query_text, k));
        }

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, session_id: SessionId) -> Result<usize, MemoryError> {
        Ok(self.partition(session_id)?.read().len())
    }
}
