// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Actions and Model Backend Seam
//!
//! Every role turn ends in exactly one [`Action`]. The action is produced by a
//! [`ModelBackend`] from an immutable [`SessionContext`] assembled by the
//! coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::memory::MemoryRecord;
use crate::domain::session::{AgentRole, ContextRef, ForcedSummaryReason, SessionId, Turn};
use crate::domain::tool::{ToolCallRequest, ToolCallResult};

/// What a role decided to do with its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Handoff {
        next_role: AgentRole,
        #[serde(default)]
        rationale: String,
    },
    ToolCall {
        request: ToolCallRequest,
    },
    TerminalReport {
        content: String,
    },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Handoff { .. } => ActionKind::Handoff,
            Action::ToolCall { .. } => ActionKind::ToolCall,
            Action::TerminalReport { .. } => ActionKind::TerminalReport,
        }
    }

    /// Human-readable one-liner, truncated to `max` characters.
    pub fn excerpt(&self, max: usize) -> String {
        let full = match self {
            Action::Handoff {
                next_role,
                rationale,
            } => format!("handoff to {}: {}", next_role, rationale),
            Action::ToolCall { request } => {
                let args = serde_json::to_string(&request.arguments).unwrap_or_default();
                format!("tool call {} {}", request.tool, args)
            }
            Action::TerminalReport { content } => content.clone(),
        };
        truncate_chars(&full, max)
    }
}

pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Handoff,
    ToolCall,
    TerminalReport,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Handoff => "handoff",
            ActionKind::ToolCall => "tool_call",
            ActionKind::TerminalReport => "terminal_report",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable view handed to a role for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub objective: String,
    pub role: AgentRole,
    pub turn_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forced_summary: Option<ForcedSummaryReason>,
    /// Category-filtered, most-recent-first. Embeddings are stripped.
    pub memory: Vec<MemoryRecord>,
    /// Oldest first.
    pub recent_turns: Vec<Turn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_tool_result: Option<ToolCallResult>,
}

impl SessionContext {
    pub fn context_ref(&self) -> ContextRef {
        ContextRef {
            memory_records: self.memory.len(),
            turn_tail: self.recent_turns.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Request sent to the model backend for one role turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub model: String,
    pub role: AgentRole,
    pub role_prompt: String,
    pub context: SessionContext,
    pub available_actions: Vec<ActionKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub action: Action,
    #[serde(default)]
    pub usage: TokenUsage,
    /// Model that actually served the request, when the backend reports it.
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Model backend unavailable: {0}")]
    Unavailable(String),
    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
    #[error("Authentication failed: {0}")]
    Authentication(String),
}

impl BackendError {
    /// Only availability failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Unavailable(_))
    }
}

/// Opaque completion capability consumed by the agent runtime.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn complete(&self, request: &AgentRequest) -> Result<ModelResponse, BackendError>;

    fn model_name(&self) -> &str;
}
