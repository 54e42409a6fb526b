// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: session aggregate, value types, and the traits at external seams.

pub mod agent;
pub mod config;
pub mod cost;
pub mod events;
pub mod memory;
pub mod policy;
pub mod pricing;
pub mod repository;
pub mod session;
pub mod tool;
