// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! # Vanguard CLI
//!
//! The `vanguard` binary runs assessment sessions in-process against the
//! configured model backend and tool server.
//!
//! ## Commands
//!
//! - `vanguard run <objective>` - Start a session and drive it to completion
//! - `vanguard resume <id>` - Continue a checkpointed session
//! - `vanguard session list|show|cancel` - Inspect checkpointed sessions
//! - `vanguard cost summary|sessions|session` - Read the cost log
//! - `vanguard config show|validate|generate` - Configuration management
//! - `vanguard risk classify` - Dry-run the risk classifier

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tracing::{info, warn};

use vanguard_cli::commands::{self, ConfigCommand, CostCommand, RiskCommand, SessionCommand};
use vanguard_core::domain::config::{ObservabilityConfig, SwarmConfigManifest};
use vanguard_core::domain::session::SessionId;

/// Vanguard - multi-agent security assessment orchestrator
#[derive(Parser)]
#[command(name = "vanguard")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "VANGUARD_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config file
    #[arg(long, global = true, env = "VANGUARD_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new assessment session
    #[command(name = "run")]
    Run {
        #[arg(value_name = "OBJECTIVE")]
        objective: String,

        /// Deny every approval request without prompting
        #[arg(long)]
        auto_deny: bool,
    },

    /// Resume a checkpointed session
    #[command(name = "resume")]
    Resume {
        #[arg(value_name = "SESSION_ID")]
        session_id: SessionId,

        #[arg(long)]
        auto_deny: bool,
    },

    /// Session inspection
    #[command(name = "session")]
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Cost analysis
    #[command(name = "cost")]
    Cost {
        #[command(subcommand)]
        command: CostCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Risk classification
    #[command(name = "risk")]
    Risk {
        #[command(subcommand)]
        command: RiskCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // A broken config file must not stop `config validate` from reporting it.
    let observability = SwarmConfigManifest::load_or_default(cli.config.clone())
        .map(|c| c.spec.observability)
        .unwrap_or_default();

    let level = cli.log_level.as_deref().unwrap_or(&observability.log_level);
    init_logging(level, &observability.log_format)?;
    init_metrics(&observability);

    match cli.command {
        Some(Commands::Run { objective, auto_deny }) => commands::run::run(objective, auto_deny, cli.config).await,
        Some(Commands::Resume { session_id, auto_deny }) => {
            commands::run::resume(session_id, auto_deny, cli.config).await
        }
        Some(Commands::Session { command }) => commands::session::handle_command(command, cli.config).await,
        Some(Commands::Cost { command }) => commands::cost::handle_command(command, cli.config).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config).await,
        Some(Commands::Risk { command }) => commands::risk::handle_command(command, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

fn init_metrics(config: &ObservabilityConfig) {
    let Some(port) = config.metrics_port else {
        return;
    };
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    match metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        Ok(()) => info!("Prometheus metrics exposed on {}", addr),
        Err(e) => warn!("Failed to start metrics exporter: {}", e),
    }
}
