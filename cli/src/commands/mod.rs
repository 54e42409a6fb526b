// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! CLI command implementations

pub mod config;
pub mod cost;
pub mod risk;
pub mod run;
pub mod session;

pub use config::ConfigCommand;
pub use cost::CostCommand;
pub use risk::RiskCommand;
pub use session::SessionCommand;
