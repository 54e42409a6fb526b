// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # `vanguard-swarm` - Swarm Coordinator
//!
//! Drives an assessment session across the four agent roles, one turn at a
//! time, with checkpointing after every turn.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | Routing table, `TurnOutcome`, `SwarmError` |
//! | [`application`] | Application | `SwarmCoordinator` and the fallback report builder |
//!
//! ## Key Concepts
//!
//! - **Turn**: one role's step. Produces exactly one action and one log entry.
//! - **Approval gate**: a `medium`/`high` tool call parks the session in
//!   `awaiting_approval` until [`SwarmCoordinator::submit_approval`] resolves it.
//! - **Forced summary**: the turn budget and cost ceiling hand control to
//!   Summary instead of failing the session.
//!
//! [`SwarmCoordinator::submit_approval`]: application::SwarmCoordinator::submit_approval

pub mod application;
pub mod domain;

pub use application::SwarmCoordinator;
pub use domain::*;
