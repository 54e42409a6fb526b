// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

// HTTP Model Backend Adapter
//
// POST {endpoint}/complete  {model, role, role_prompt, context, available_actions}
//   -> {action, usage: {input_tokens, output_tokens}, model}
//
// The backend is expected to do its own prompt templating; this adapter only
// moves the structured request and decodes exactly one Action.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::agent::{AgentRequest, BackendError, ModelBackend, ModelResponse};
use crate::domain::config::ModelBackendConfig;

pub struct HttpModelBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl HttpModelBackend {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            model: model.into(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn from_config(config: &ModelBackendConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.model.clone(),
            config.resolve_api_key(),
        )
        .with_timeout(Duration::from_secs(config.timeout_secs))
    }
}

#[async_trait]
impl ModelBackend for HttpModelBackend {
    async fn complete(&self, request: &AgentRequest) -> Result<ModelResponse, BackendError> {
        let url = format!("{}/complete", self.endpoint.trim_end_matches('/'));

        let mut builder = self.client.post(&url).timeout(self.timeout).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(if status == 401 || status == 403 {
                BackendError::Authentication(error_text)
            } else if status == 429 || status.is_server_error() {
                BackendError::Unavailable(format!("HTTP {}: {}", status, error_text))
            } else {
                BackendError::InvalidResponse(format!("HTTP {}: {}", status, error_text))
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        serde_json::from_slice(&body)
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to decode action: {}", e)))
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
