// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_runtime;
pub mod context;
pub mod tool_gateway;

pub use agent_runtime::{AgentError, AgentRuntime};
pub use context::ContextAssembler;
pub use tool_gateway::{CallContext, GatewayError, GatewayOutcome, ToolGateway};
