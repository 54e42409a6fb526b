// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod coordinator;
pub mod report;

pub use coordinator::SwarmCoordinator;
