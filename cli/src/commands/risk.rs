// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Dry-run of the risk classifier against the active policy

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;

use vanguard_core::domain::config::SwarmConfigManifest;
use vanguard_core::domain::policy::RiskClassifier;
use vanguard_core::domain::tool::{RiskTier, ToolCallRequest};

#[derive(Subcommand)]
pub enum RiskCommand {
    /// Classify a tool call without running it
    Classify {
        #[arg(value_name = "TOOL")]
        tool: String,

        /// Tool argument as KEY=VALUE (repeatable)
        #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_argument)]
        arguments: Vec<(String, Value)>,

        /// Tier the agent declared
        #[arg(long, default_value = "low")]
        declared: RiskTier,
    },
}

pub async fn handle_command(command: RiskCommand, config_path: Option<PathBuf>) -> Result<()> {
    let RiskCommand::Classify {
        tool,
        arguments,
        declared,
    } = command;

    let config = SwarmConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    let classifier = RiskClassifier::new(&config.spec.risk_policy).context("Invalid risk policy")?;

    let mut request = ToolCallRequest::new(tool);
    request.declared_risk = declared;
    for (key, value) in arguments {
        request = request.with_argument(key, value);
    }

    let classification = classifier.classify(&request);
    let tier = match classification.tier {
        RiskTier::Low => "low".green(),
        RiskTier::Medium => "medium".yellow(),
        RiskTier::High => "high".red(),
    };
    println!("{} {} -> {}", "Tool".bold(), request.tool, tier);
    println!(
        "  Rule:     {}",
        classification.matched_rule.as_deref().unwrap_or("(default tier)")
    );
    println!(
        "  Approval: {}",
        if classification.tier == RiskTier::Low {
            "not required"
        } else {
            "required"
        }
    );
    for reason in &classification.reasons {
        println!("  {}", reason.dimmed());
    }
    Ok(())
}

/// `KEY=VALUE`; the value is parsed as JSON when it can be, else kept as a string.
pub fn parse_argument(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty argument name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
