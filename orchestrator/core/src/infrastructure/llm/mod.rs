// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

// Model Backend Infrastructure - Anti-Corruption Layer Implementations
//
// Each adapter translates between the ModelBackend seam and an external
// completion service.

pub mod http;

pub use http::HttpModelBackend;
