// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

// Tool Server Adapter
//
// Anti-Corruption Layer for the remote tool sandbox.
// POST {endpoint}/invoke  {tool, arguments, timeout_ms} -> {status, output, duration_ms}

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::domain::config::ToolServerConfig;
use crate::domain::tool::{ToolInvocation, ToolServer, ToolServerError, ToolServerResponse};

pub struct HttpToolServer {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpToolServer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn from_config(config: &ToolServerConfig) -> Self {
        Self::new(config.endpoint.clone(), config.resolve_api_key())
    }
}

#[async_trait]
impl ToolServer for HttpToolServer {
    async fn invoke(&self, invocation: &ToolInvocation) -> Result<ToolServerResponse, ToolServerError> {
        let url = format!("{}/invoke", self.endpoint.trim_end_matches('/'));
        debug!(tool = %invocation.tool, url = %url, "Dispatching tool invocation");

        let mut request = self
            .client
            .post(&url)
            .timeout(Duration::from_millis(invocation.timeout_ms.max(1)))
            .json(invocation);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolServerError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolServerError::Transport(format!("HTTP {}: {}", status, body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolServerError::Protocol(format!("HTTP {}: {}", status, body)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ToolServerError::Transport(e.to_string()))?;
        serde_json::from_slice(&body)
            .map_err(|e| ToolServerError::Protocol(format!("Failed to parse response: {}", e)))
    }
}
