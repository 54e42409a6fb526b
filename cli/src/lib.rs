// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Vanguard CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Command handlers and the in-process swarm wiring

pub mod commands;
pub mod embedded;
