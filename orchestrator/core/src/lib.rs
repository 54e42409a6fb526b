// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Vanguard Core
//!
//! Building blocks of the multi-agent assessment orchestrator.
//!
//! # Architecture
//!
//! - **Domain:** sessions, turns, memory records, tool calls, cost entries, risk policy
//! - **Application:** agent runtime, tool gateway, context assembly
//! - **Infrastructure:** memory store, cost ledger, checkpoint store, event bus, HTTP adapters

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
