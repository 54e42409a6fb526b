// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Shared Memory
//!
//! Append-only fact log with a best-effort similarity index on top.
//! Records are never edited or removed; a newer record with the same
//! category and key shadows older ones when `latest_per_key` is requested.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Host,
    Service,
    Credential,
    Finding,
    Note,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::Host,
        MemoryCategory::Service,
        MemoryCategory::Credential,
        MemoryCategory::Finding,
        MemoryCategory::Note,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Host => "host",
            MemoryCategory::Service => "service",
            MemoryCategory::Credential => "credential",
            MemoryCategory::Finding => "finding",
            MemoryCategory::Note => "note",
        }
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "host" => Ok(MemoryCategory::Host),
            "service" => Ok(MemoryCategory::Service),
            "credential" => Ok(MemoryCategory::Credential),
            "finding" => Ok(MemoryCategory::Finding),
            "note" => Ok(MemoryCategory::Note),
            other => Err(format!("unknown memory category '{}'", other)),
        }
    }
}

/// A fact written to shared memory. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: RecordId,
    pub session_id: SessionId,
    pub category: MemoryCategory,
    pub key: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Sequence number of the turn that produced the fact (0 for the coordinator).
    pub source_turn: u64,
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(
        session_id: SessionId,
        category: MemoryCategory,
        key: impl Into<String>,
        content: impl Into<String>,
        source_turn: u64,
    ) -> Self {
        Self {
            id: RecordId::new(),
            session_id,
            category,
            key: key.into(),
            content: content.into(),
            embedding: None,
            source_turn,
            timestamp: Utc::now(),
        }
    }

    /// Copy without the embedding vector, for prompts and event payloads.
    pub fn without_embedding(&self) -> Self {
        Self {
            embedding: None,
            ..self.clone()
        }
    }
}

/// Query filter applied within a single category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryFilter {
    pub key: Option<String>,
    /// Case-insensitive substring match on key or content.
    pub contains: Option<String>,
    pub latest_per_key: bool,
    pub limit: Option<usize>,
}

impl MemoryFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn contains(mut self, needle: impl Into<String>) -> Self {
        self.contains = Some(needle.into());
        self
    }

    pub fn latest_per_key(mut self) -> Self {
        self.latest_per_key = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &MemoryRecord) -> bool {
        if let Some(key) = &self.key {
            if &record.key != key {
                return false;
            }
        }
        if let Some(needle) = &self.contains {
            let needle = needle.to_lowercase();
            if !record.key.to_lowercase().contains(&needle)
                && !record.content.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

/// A typed fact reported inside a tool server's structured output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredFact {
    pub category: MemoryCategory,
    pub key: String,
    pub content: String,
}

/// Extracts `{"facts": [...]}` entries; malformed entries are skipped.
pub fn facts_from_output(output: &Value) -> Vec<StructuredFact> {
    output
        .get("facts")
        .and_then(Value::as_array)
        .map(|facts| {
            facts
                .iter()
                .filter_map(|fact| serde_json::from_value(fact.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMethod {
    Semantic,
    Keyword,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: MemoryRecord,
    pub score: f32,
    pub method: SearchMethod,
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Memory persistence failed: {0}")]
    Persistence(String),
    #[error("Memory record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        MemoryError::Persistence(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("Embedding backend unavailable: {0}")]
    Unavailable(String),
    #[error("Nothing to embed")]
    EmptyInput,
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Session-partitioned shared memory.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Appends a record, attaching an embedding when the backend allows it.
    async fn write(&self, record: MemoryRecord) -> Result<RecordId, MemoryError>;

    /// Most-recent-first.
    async fn query(
        &self,
        session_id: SessionId,
        category: MemoryCategory,
        filter: &MemoryFilter,
    ) -> Result<Vec<MemoryRecord>, MemoryError>;

    /// Top-k by similarity; degrades to keyword matching instead of failing.
    async fn semantic_search(
        &self,
        session_id: SessionId,
        query_text: &str,
        k: usize,
    ) -> Result<Vec<ScoredRecord>, MemoryError>;

    async fn count(&self, session_id: SessionId) -> Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_facts_from_structured_output() {
        let output = json!({
            "raw": "22/tcp open ssh",
            "facts": [
                {"category": "service", "key": "192.168.1.100:22/tcp", "content": "OpenSSH 8.9"},
                {"category": "bogus", "key": "x", "content": "y"},
                {"key": "missing category"}
            ]
        });
        let facts = facts_from_output(&output);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].category, MemoryCategory::Service);

        assert!(facts_from_output(&json!("plain text")).is_empty());
    }

    #[test]
    fn test_filter_matching() {
        let record = MemoryRecord::new(
            SessionId::new(),
            MemoryCategory::Host,
            "192.168.1.100",
            "Linux host, TTL 64",
            2,
        );
        assert!(MemoryFilter::all().matches(&record));
        assert!(MemoryFilter::all().contains("linux").matches(&record));
        assert!(MemoryFilter::all().key("192.168.1.100").matches(&record));
        assert!(!MemoryFilter::all().key("10.0.0.1").matches(&record));
        assert!(!MemoryFilter::all().contains("windows").matches(&record));
    }
}
