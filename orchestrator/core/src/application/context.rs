// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use crate::domain::agent::SessionContext;
use crate::domain::memory::{MemoryCategory, MemoryError, MemoryFilter, MemoryStore};
use crate::domain::session::{AgentRole, Session, Turn};

/// Builds the immutable per-turn view a role reasons over.
pub struct ContextAssembler {
    memory: Arc<dyn MemoryStore>,
    memory_limit: usize,
    tail_turns: usize,
}

/// Memory categories each role is shown.
pub fn categories_for(role: AgentRole) -> &'static [MemoryCategory] {
    match role {
        AgentRole::Planner | AgentRole::Summary | AgentRole::InitAccess => &MemoryCategory::ALL,
        AgentRole::Recon => &[
            MemoryCategory::Host,
            MemoryCategory::Service,
            MemoryCategory::Finding,
            MemoryCategory::Note,
        ],
    }
}

impl ContextAssembler {
    pub fn new(memory: Arc<dyn MemoryStore>, memory_limit: usize, tail_turns: usize) -> Self {
        Self {
            memory,
            memory_limit,
            tail_turns,
        }
    }

    /// `turns` is the session's full log; only the tail is kept.
    pub async fn assemble(&self, session: &Session, turns: &[Turn]) -> Result<SessionContext, MemoryError> {
        let role = session.active_role;
        let filter = MemoryFilter::all().latest_per_key().limit(self.memory_limit);

        let mut memory = Vec::new();
        for category in categories_for(role) {
            let records = self.memory.query(session.id, *category, &filter).await?;
            memory.extend(records.iter().map(|r| r.without_embedding()));
        }
        memory.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let start = turns.len().saturating_sub(self.tail_turns);
        Ok(SessionContext {
            session_id: session.id,
            objective: session.objective.clone(),
            role,
            turn_seq: session.next_seq(),
            forced_summary: session.forced_summary,
            memory,
            recent_turns: turns[start..].to_vec(),
            last_tool_result: session.last_tool_result.clone(),
        })
    }
}
