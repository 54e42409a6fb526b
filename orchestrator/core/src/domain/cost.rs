// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Cost Accounting
//!
//! Every model call and every tool call yields one [`CostEntry`]. Entries are
//! append-only and partitioned by session; [`CostTotals`] is the aggregate
//! the coordinator consults before each turn.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use crate::domain::agent::TokenUsage;
use crate::domain::session::{AgentRole, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Quantity is total tokens.
    ModelTokens,
    /// Quantity is seconds of tool execution.
    ToolTime,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ModelTokens => "model_tokens",
            ResourceKind::ToolTime => "tool_time",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub session_id: SessionId,
    pub role: AgentRole,
    pub kind: ResourceKind,
    pub quantity: f64,
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    pub cost_usd: f64,
    /// Turn the usage is attributed to.
    pub turn_seq: u64,
    pub recorded_at: DateTime<Utc>,
}

impl CostEntry {
    pub fn model_call(
        session_id: SessionId,
        role: AgentRole,
        turn_seq: u64,
        model: impl Into<String>,
        usage: TokenUsage,
        cost_usd: f64,
    ) -> Self {
        Self {
            session_id,
            role,
            kind: ResourceKind::ModelTokens,
            quantity: usage.total() as f64,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            model: Some(model.into()),
            tool: None,
            cost_usd,
            turn_seq,
            recorded_at: Utc::now(),
        }
    }

    pub fn tool_time(
        session_id: SessionId,
        role: AgentRole,
        turn_seq: u64,
        tool: impl Into<String>,
        duration_ms: u64,
        cost_per_second_usd: f64,
    ) -> Self {
        let seconds = duration_ms as f64 / 1000.0;
        Self {
            session_id,
            role,
            kind: ResourceKind::ToolTime,
            quantity: seconds,
            input_tokens: 0,
            output_tokens: 0,
            model: None,
            tool: Some(tool.into()),
            cost_usd: seconds * cost_per_second_usd,
            turn_seq,
            recorded_at: Utc::now(),
        }
    }

    pub fn tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// One aggregation bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub entries: u64,
    pub quantity: f64,
    pub tokens: u64,
    pub cost_usd: f64,
}

impl Totals {
    fn add(&mut self, entry: &CostEntry) {
        self.entries += 1;
        self.quantity += entry.quantity;
        self.tokens += entry.tokens();
        self.cost_usd += entry.cost_usd;
    }
}

/// Per-session aggregate by resource kind, by role and by model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostTotals {
    pub session_id: SessionId,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub model_calls: u64,
    pub tool_calls: u64,
    pub tool_seconds: f64,
    pub by_kind: BTreeMap<ResourceKind, Totals>,
    pub by_role: BTreeMap<AgentRole, Totals>,
    pub by_model: BTreeMap<String, Totals>,
}

impl CostTotals {
    pub fn empty(session_id: SessionId) -> Self {
        Self {
            session_id,
            total_cost_usd: 0.0,
            total_tokens: 0,
            model_calls: 0,
            tool_calls: 0,
            tool_seconds: 0.0,
            by_kind: BTreeMap::new(),
            by_role: BTreeMap::new(),
            by_model: BTreeMap::new(),
        }
    }

    pub fn from_entries<'a>(
        session_id: SessionId,
        entries: impl IntoIterator<Item = &'a CostEntry>,
    ) -> Self {
        let mut totals = Self::empty(session_id);
        for entry in entries {
            totals.add(entry);
        }
        totals
    }

    pub fn add(&mut self, entry: &CostEntry) {
        self.total_cost_usd += entry.cost_usd;
        self.total_tokens += entry.tokens();
        match entry.kind {
            ResourceKind::ModelTokens => self.model_calls += 1,
            ResourceKind::ToolTime => {
                self.tool_calls += 1;
                self.tool_seconds += entry.quantity;
            }
        }
        self.by_kind.entry(entry.kind).or_default().add(entry);
        self.by_role.entry(entry.role).or_default().add(entry);
        if let Some(model) = &entry.model {
            self.by_model.entry(model.clone()).or_default().add(entry);
        }
    }
}

/// Aggregate across every session the ledger has seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_sessions: usize,
    pub total_cost_usd: f64,
    pub total_tokens: u64,
    pub model_calls: u64,
    pub tool_calls: u64,
    pub by_role: BTreeMap<AgentRole, Totals>,
    pub by_model: BTreeMap<String, Totals>,
}

impl LedgerSummary {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CostEntry>) -> Self {
        let mut summary = Self::default();
        let mut sessions = BTreeSet::new();
        for entry in entries {
            sessions.insert(entry.session_id);
            summary.total_cost_usd += entry.cost_usd;
            summary.total_tokens += entry.tokens();
            match entry.kind {
                ResourceKind::ModelTokens => summary.model_calls += 1,
                ResourceKind::ToolTime => summary.tool_calls += 1,
            }
            summary.by_role.entry(entry.role).or_default().add(entry);
            if let Some(model) = &entry.model {
                summary.by_model.entry(model.clone()).or_default().add(entry);
            }
        }
        summary.total_sessions = sessions.len();
        summary
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Cost log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cost entry serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait CostLedger: Send + Sync {
    async fn record(&self, entry: CostEntry) -> Result<(), LedgerError>;

    async fn total(&self, session_id: SessionId) -> CostTotals;

    async fn summary(&self) -> LedgerSummary;

    async fn entries(&self, session_id: SessionId) -> Vec<CostEntry>;
}
