// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Call Domain Types
//!
//! Requests, approval decisions and results that flow through the tool
//! gateway, plus the [`ToolServer`] seam to the remote execution sandbox.
//!
//! ## Tool Server Protocol
//!
//! | Direction | Shape |
//! |-----------|-------|
//! | request | `{tool, arguments, timeout_ms}` |
//! | response | `{status: ok \| error \| timeout, output, duration_ms}` |
//!
//! Any transport failure is reported as [`ToolServerError::Transport`] and is
//! retried by the gateway exactly like a `timeout` status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::session::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ToolCallId(pub Uuid);

impl ToolCallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ToolCallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ToolCallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ToolCallId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Risk classification. Ordered so that `max()` yields the stricter tier.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

impl RiskTier {
    /// `medium` and `high` calls never reach the sandbox without approval.
    pub fn requires_approval(&self) -> bool {
        !matches!(self, RiskTier::Low)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            other => Err(format!("unknown risk tier '{}'", other)),
        }
    }
}

/// A side-effecting action proposed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, Value>,
    /// Tier the agent itself declared; the gateway never classifies below it.
    #[serde(default)]
    pub declared_risk: RiskTier,
    /// Stamped by the coordinator with the proposing turn's sequence number.
    #[serde(default)]
    pub requesting_turn: u64,
}

impl ToolCallRequest {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments: BTreeMap::new(),
            declared_risk: RiskTier::Low,
            requesting_turn: 0,
        }
    }

    pub fn with_argument(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_declared_risk(mut self, tier: RiskTier) -> Self {
        self.declared_risk = tier;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Approved,
    Denied,
    TimedOut,
}

impl ApprovalOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalOutcome::Approved => "approved",
            ApprovalOutcome::Denied => "denied",
            ApprovalOutcome::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ApprovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human decision on a gated call. Exists only for `medium`/`high` calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub tool_call_id: ToolCallId,
    pub session_id: SessionId,
    pub outcome: ApprovalOutcome,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Ok,
    Error,
    Rejected,
    Cancelled,
}

impl ToolCallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolCallStatus::Ok => "ok",
            ToolCallStatus::Error => "error",
            ToolCallStatus::Rejected => "rejected",
            ToolCallStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ToolCallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a mediated tool call, success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: ToolCallId,
    pub session_id: SessionId,
    pub tool: String,
    pub tier: RiskTier,
    pub status: ToolCallStatus,
    pub output: Value,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub requesting_turn: u64,
    pub completed_at: DateTime<Utc>,
}

impl ToolCallResult {
    /// Output rendered as text for memory records and prompts.
    pub fn output_text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

/// Request sent to a remote tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub arguments: BTreeMap<String, Value>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolServerStatus {
    Ok,
    Error,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolServerResponse {
    pub status: ToolServerStatus,
    #[serde(default)]
    pub output: Value,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Error)]
pub enum ToolServerError {
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Uniform capability exposed by the remote tool sandbox.
#[async_trait]
pub trait ToolServer: Send + Sync {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolServerResponse, ToolServerError>;
}
