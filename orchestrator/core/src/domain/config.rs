// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

// Swarm Configuration Manifest
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - Coordinator safeguards (turn budget, cost ceiling, approval timeout)
// - Tool gateway timeout/retry policy
// - Risk classification table and model pricing
// - Model backend, tool server and embedding endpoints
// - Storage location and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::policy::{RiskClassifier, RiskPolicy};
use crate::domain::pricing::PricingTable;

pub const API_VERSION: &str = "vanguard/v1";
pub const KIND: &str = "SwarmConfig";

/// Top-level swarm configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfigManifest {
    /// API version (must be "vanguard/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SwarmConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: SwarmConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwarmConfigSpec {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub risk_policy: RiskPolicy,

    #[serde(default)]
    pub pricing: PricingTable,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Per-session safeguards enforced before every turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Turns allowed before control is forced to Summary
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_session_cost_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_session_tokens: Option<u64>,

    /// One-time warning event once a session crosses this spend
    #[serde(default = "default_cost_warning")]
    pub cost_warning_usd: f64,

    #[serde(default = "default_context_tail")]
    pub context_tail_turns: usize,

    /// Records per memory category handed to a role
    #[serde(default = "default_memory_context_limit")]
    pub memory_context_limit: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_timeout_secs: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_session_cost_usd: None,
            max_session_tokens: None,
            cost_warning_usd: default_cost_warning(),
            context_tail_turns: default_context_tail(),
            memory_context_limit: default_memory_context_limit(),
            approval_timeout_secs: None,
        }
    }
}

impl CoordinatorConfig {
    pub fn approval_timeout(&self) -> Option<Duration> {
        self.approval_timeout_secs.map(Duration::from_secs)
    }
}

/// Tool dispatch timeout and retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Total dispatch attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default)]
    pub tool_cost_per_second_usd: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            tool_cost_per_second_usd: 0.0,
        }
    }
}

impl GatewayConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Delay before retry number `retry` (1-based): initial * 2^(retry-1), capped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelBackendConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_server: Option<ToolServerConfig>,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelBackendConfig {
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Literal key or "env:VAR_NAME"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

impl ModelBackendConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref()?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolServerConfig {
    pub endpoint: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl ToolServerConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref()?)
    }
}

fn resolve_secret(value: &str) -> Option<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var).ok(),
        None => Some(value.to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum EmbeddingConfig {
    Hashing {
        #[serde(default = "default_dimensions")]
        dimensions: usize,
    },
    Disabled,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        EmbeddingConfig::Hashing {
            dimensions: default_dimensions(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Checkpoints, turn logs, memory logs and the cost log live here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Configured directory, else ~/.vanguard/data, else ./.vanguard
    pub fn resolved_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .map(|home| home.join(".vanguard").join("data"))
            .unwrap_or_else(|| PathBuf::from("./.vanguard"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// "compact" or "json"
    #[serde(default = "default_log_format")]
    pub log_format: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics_port: Option<u16>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            metrics_port: None,
        }
    }
}

fn default_max_turns() -> u64 {
    40
}

fn default_cost_warning() -> f64 {
    0.10
}

fn default_context_tail() -> usize {
    8
}

fn default_memory_context_limit() -> usize {
    20
}

fn default_call_timeout_ms() -> u64 {
    120_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_dimensions() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for SwarmConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "vanguard".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: SwarmConfigSpec::default(),
        }
    }
}

impl SwarmConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. VANGUARD_CONFIG_PATH environment variable
    /// 2. ./vanguard-config.yaml
    /// 3. ~/.vanguard/config.yaml
    /// 4. /etc/vanguard/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("VANGUARD_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./vanguard-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".vanguard").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/vanguard/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Container deployments override a few knobs via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VANGUARD_MAX_TURNS") {
            match val.parse::<u64>() {
                Ok(turns) => {
                    tracing::info!("Environment override: VANGUARD_MAX_TURNS={}", turns);
                    self.spec.coordinator.max_turns = turns;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for VANGUARD_MAX_TURNS: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("VANGUARD_MAX_SESSION_COST_USD") {
            match val.parse::<f64>() {
                Ok(ceiling) => {
                    tracing::info!("Environment override: VANGUARD_MAX_SESSION_COST_USD={}", ceiling);
                    self.spec.coordinator.max_session_cost_usd = Some(ceiling);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for VANGUARD_MAX_SESSION_COST_USD: '{}'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("VANGUARD_DATA_DIR") {
            if !val.is_empty() {
                tracing::info!("Environment override: VANGUARD_DATA_DIR={}", val);
                self.spec.storage.data_dir = Some(PathBuf::from(val));
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let coordinator = &self.spec.coordinator;
        if coordinator.max_turns == 0 {
            anyhow::bail!("spec.coordinator.max_turns must be at least 1");
        }
        if let Some(ceiling) = coordinator.max_session_cost_usd {
            if ceiling <= 0.0 {
                anyhow::bail!("spec.coordinator.max_session_cost_usd must be positive");
            }
        }
        if coordinator.max_session_tokens == Some(0) {
            anyhow::bail!("spec.coordinator.max_session_tokens must be positive");
        }
        if coordinator.cost_warning_usd < 0.0 {
            anyhow::bail!("spec.coordinator.cost_warning_usd cannot be negative");
        }

        let gateway = &self.spec.gateway;
        if gateway.max_attempts == 0 {
            anyhow::bail!("spec.gateway.max_attempts must be at least 1");
        }
        if gateway.call_timeout_ms == 0 {
            anyhow::bail!("spec.gateway.call_timeout_ms must be positive");
        }
        if gateway.max_backoff_ms < gateway.initial_backoff_ms {
            anyhow::bail!("spec.gateway.max_backoff_ms cannot be below initial_backoff_ms");
        }

        RiskClassifier::new(&self.spec.risk_policy)?;

        for name in self.spec.pricing.models.keys() {
            if name.trim().is_empty() {
                anyhow::bail!("spec.pricing.models contains an empty model name");
            }
        }

        if let Some(model) = &self.spec.backends.model {
            if model.endpoint.is_empty() {
                anyhow::bail!("spec.backends.model.endpoint cannot be empty");
            }
            if model.max_attempts == 0 {
                anyhow::bail!("spec.backends.model.max_attempts must be at least 1");
            }
        }

        if let Some(tool_server) = &self.spec.backends.tool_server {
            if tool_server.endpoint.is_empty() {
                anyhow::bail!("spec.backends.tool_server.endpoint cannot be empty");
            }
        }

        if let EmbeddingConfig::Hashing { dimensions } = self.spec.backends.embedding {
            if dimensions == 0 {
                anyhow::bail!("spec.backends.embedding.dimensions must be positive");
            }
        }

        Ok(())
    }
}
