// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod approval_registry;
pub mod checkpoint_store;
pub mod cost_ledger;
pub mod embedding;
pub mod event_bus;
pub mod jsonl;
pub mod llm;
pub mod memory_store;
pub mod tool_server;
