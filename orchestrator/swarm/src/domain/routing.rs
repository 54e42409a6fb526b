// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Handoff routing table.
//!
//! | From | Allowed next roles |
//! |------|--------------------|
//! | planner | recon, init_access, summary |
//! | recon | planner, init_access |
//! | init_access | planner, summary |
//! | summary | none (terminal report only) |

use vanguard_core::domain::session::AgentRole;

/// Roles `from` may hand control to.
pub fn allowed_handoffs(from: AgentRole) -> &'static [AgentRole] {
    match from {
        AgentRole::Planner => &[AgentRole::Recon, AgentRole::InitAccess, AgentRole::Summary],
        AgentRole::Recon => &[AgentRole::Planner, AgentRole::InitAccess],
        AgentRole::InitAccess => &[AgentRole::Planner, AgentRole::Summary],
        AgentRole::Summary => &[],
    }
}

pub fn is_allowed(from: AgentRole, to: AgentRole) -> bool {
    allowed_handoffs(from).contains(&to)
}

/// Only Summary may end a session with a report.
pub fn may_report(role: AgentRole) -> bool {
    role == AgentRole::Summary
}
