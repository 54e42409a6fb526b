// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use vanguard_core::domain::config::{EmbeddingConfig, SwarmConfigManifest};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        #[arg(short, long, default_value = "./vanguard-config.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = SwarmConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. VANGUARD_CONFIG_PATH: {}",
            std::env::var("VANGUARD_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./vanguard-config.yaml");
        println!("  4. ~/.vanguard/config.yaml");
        println!("  5. /etc/vanguard/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{} {}", "Configuration:".bold(), config.metadata.name);
    println!();

    println!("{}", "Coordinator:".bold());
    println!("  Max turns:        {}", spec.coordinator.max_turns);
    println!("  Cost ceiling:     {}", optional(spec.coordinator.max_session_cost_usd.map(|c| format!("${:.2}", c))));
    println!("  Token ceiling:    {}", optional(spec.coordinator.max_session_tokens));
    println!("  Cost warning:     ${:.2}", spec.coordinator.cost_warning_usd);
    println!("  Approval timeout: {}", optional(spec.coordinator.approval_timeout_secs.map(|s| format!("{}s", s))));
    println!();

    println!("{}", "Tool gateway:".bold());
    println!("  Call timeout: {}ms", spec.gateway.call_timeout_ms);
    println!("  Attempts:     {}", spec.gateway.max_attempts);
    println!(
        "  Backoff:      {}ms .. {}ms",
        spec.gateway.initial_backoff_ms, spec.gateway.max_backoff_ms
    );
    println!();

    println!("{}", "Risk policy:".bold());
    println!("  Default tier: {}", spec.risk_policy.default_tier);
    for rule in &spec.risk_policy.rules {
        println!("  {:<14} {}", rule.tool, rule.tier);
        for escalation in &rule.escalations {
            println!(
                "    {} {} =~ /{}/ -> {}",
                "escalate".dimmed(),
                escalation.argument,
                escalation.pattern,
                escalation.tier
            );
        }
    }
    println!();

    println!("{}", "Backends:".bold());
    match &spec.backends.model {
        Some(model) => println!("  Model:       {} ({})", model.endpoint, model.model),
        None => println!("  Model:       {}", "(not configured)".red()),
    }
    match &spec.backends.tool_server {
        Some(server) => println!("  Tool server: {}", server.endpoint),
        None => println!("  Tool server: {}", "(not configured)".red()),
    }
    match &spec.backends.embedding {
        EmbeddingConfig::Hashing { dimensions } => println!("  Embedding:   hashing ({} dims)", dimensions),
        EmbeddingConfig::Disabled => println!("  Embedding:   disabled (keyword search)"),
    }
    println!();

    println!("{}", "Storage:".bold());
    println!("  Data dir: {}", spec.storage.resolved_data_dir().display());

    Ok(())
}

fn optional<T: std::fmt::Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "(none)".dimmed().to_string())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = SwarmConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    if config.spec.backends.model.is_none() || config.spec.backends.tool_server.is_none() {
        println!(
            "{}",
            "! Model backend or tool server not configured; `vanguard run` will refuse to start".yellow()
        );
    }
    println!("{}", "✓ Configuration is valid".green());
    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/config-with-examples.yaml")
    } else {
        include_str!("../../templates/config-minimal.yaml")
    };

    std::fs::write(&output, sample).with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());
    Ok(())
}
