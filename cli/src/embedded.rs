// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-process swarm wiring
//!
//! Builds the coordinator and its collaborators from a configuration manifest.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use vanguard_core::{
    application::{AgentRuntime, ToolGateway},
    domain::{config::SwarmConfigManifest, memory::EmbeddingProvider, policy::RiskClassifier},
    infrastructure::{
        approval_registry::ApprovalRegistry, checkpoint_store::FileCheckpointStore,
        cost_ledger::CostLedgerStore, embedding, event_bus::EventBus, llm::HttpModelBackend,
        memory_store::SessionMemoryStore, tool_server::HttpToolServer,
    },
};
use vanguard_swarm::SwarmCoordinator;

pub struct EmbeddedSwarm {
    pub coordinator: Arc<SwarmCoordinator>,
    pub events: EventBus,
    pub data_dir: PathBuf,
}

impl EmbeddedSwarm {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self> {
        let manifest =
            SwarmConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
        manifest
            .validate()
            .context("Configuration validation failed")?;
        Self::from_manifest(&manifest)
    }

    pub fn from_manifest(manifest: &SwarmConfigManifest) -> Result<Self> {
        let spec = &manifest.spec;
        let data_dir = spec.storage.resolved_data_dir();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

        let model_config = spec
            .backends
            .model
            .as_ref()
            .context("No model backend configured (spec.backends.model)")?;
        let tool_config = spec
            .backends
            .tool_server
            .as_ref()
            .context("No tool server configured (spec.backends.tool_server)")?;

        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(embedding::from_config(&spec.backends.embedding));
        let memory = Arc::new(SessionMemoryStore::persistent(embedder, &data_dir));
        let ledger = Arc::new(CostLedgerStore::open(&data_dir).context("Failed to open cost log")?);
        let checkpoints = Arc::new(FileCheckpointStore::new(&data_dir));
        let events = EventBus::with_default_capacity();

        let runtime = AgentRuntime::new(
            Arc::new(HttpModelBackend::from_config(model_config)),
            ledger.clone(),
            spec.pricing.clone(),
        )
        .with_retry(
            model_config.max_attempts,
            Duration::from_millis(model_config.retry_delay_ms),
        );

        let gateway = ToolGateway::new(
            RiskClassifier::new(&spec.risk_policy).context("Invalid risk policy")?,
            Arc::new(HttpToolServer::from_config(tool_config)),
            Arc::new(ApprovalRegistry::new()),
            memory.clone(),
            ledger.clone(),
            events.clone(),
            spec.gateway.clone(),
        );

        let coordinator = SwarmCoordinator::new(
            Arc::new(runtime),
            Arc::new(gateway),
            memory,
            ledger,
            checkpoints,
            events.clone(),
            spec.coordinator.clone(),
        );

        Ok(Self {
            coordinator: Arc::new(coordinator),
            events,
            data_dir,
        })
    }
}

/// Data directory from configuration, without wiring any backends.
pub fn data_dir(config_path: Option<PathBuf>) -> Result<PathBuf> {
    let manifest =
        SwarmConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    Ok(manifest.spec.storage.resolved_data_dir())
}

pub fn checkpoint_store(data_dir: &Path) -> FileCheckpointStore {
    FileCheckpointStore::new(data_dir)
}
