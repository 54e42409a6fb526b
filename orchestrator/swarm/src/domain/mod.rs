// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure coordination types. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`routing`] | Handoff table between roles |
//! | [`outcome`] | `TurnOutcome` returned by `advance` |
//! | [`error`] | `SwarmError` caller-facing taxonomy |

pub mod error;
pub mod outcome;
pub mod routing;

pub use error::SwarmError;
pub use outcome::TurnOutcome;
