// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Checkpointed session inspection
//!
//! Commands: list, show, cancel

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use vanguard_core::domain::repository::CheckpointStore;
use vanguard_core::domain::session::SessionId;

use crate::commands::run::status_label;
use crate::embedded::{self, EmbeddedSwarm};

#[derive(Subcommand)]
pub enum SessionCommand {
    /// List checkpointed sessions
    List,

    /// Show one session
    Show {
        #[arg(value_name = "SESSION_ID")]
        session_id: SessionId,

        /// Print the turn log
        #[arg(long)]
        turns: bool,
    },

    /// Cancel a session
    Cancel {
        #[arg(value_name = "SESSION_ID")]
        session_id: SessionId,
    },
}

pub async fn handle_command(command: SessionCommand, config_path: Option<PathBuf>) -> Result<()> {
    match command {
        SessionCommand::List => list(config_path).await,
        SessionCommand::Show { session_id, turns } => show(session_id, turns, config_path).await,
        SessionCommand::Cancel { session_id } => cancel(session_id, config_path).await,
    }
}

async fn list(config_path: Option<PathBuf>) -> Result<()> {
    let store = embedded::checkpoint_store(&embedded::data_dir(config_path)?);
    let mut checkpoints = store
        .list_checkpoints()
        .await
        .context("Failed to read checkpoints")?;
    checkpoints.sort_by_key(|c| c.session.created_at);

    if checkpoints.is_empty() {
        println!("{}", "No sessions found".dimmed());
        return Ok(());
    }

    println!(
        "{:<36}  {:<18}  {:<11}  {:>5}  {}",
        "SESSION".bold(),
        "STATUS".bold(),
        "ROLE".bold(),
        "TURNS".bold(),
        "OBJECTIVE".bold()
    );
    for checkpoint in checkpoints {
        let session = checkpoint.restore();
        println!(
            "{:<36}  {:<18}  {:<11}  {:>5}  {}",
            session.id,
            status_label(session.status),
            session.active_role,
            session.turn_count,
            session.objective
        );
    }
    Ok(())
}

async fn show(session_id: SessionId, with_turns: bool, config_path: Option<PathBuf>) -> Result<()> {
    let store = embedded::checkpoint_store(&embedded::data_dir(config_path)?);
    let session = store
        .load_checkpoint(session_id)
        .await
        .context("Failed to read checkpoint")?
        .with_context(|| format!("Session {} not found", session_id))?
        .restore();

    println!("{} {}", "Session:".bold(), session.id);
    println!("  Objective:   {}", session.objective);
    println!("  Status:      {}", status_label(session.status));
    println!("  Active role: {}", session.active_role);
    println!("  Turns:       {}", session.turn_count);
    println!("  Created:     {}", session.created_at.to_rfc3339());
    if let Some(at) = session.last_checkpoint_at {
        println!("  Checkpoint:  {}", at.to_rfc3339());
    }
    if let Some(reason) = session.forced_summary {
        println!("  Forced:      {}", reason.to_string().yellow());
    }
    if let Some(pending) = &session.pending_approval {
        println!(
            "  Pending:     {} [{}] ({})",
            pending.request.tool,
            pending.tier,
            pending.tool_call_id
        );
    }
    if let Some(reason) = &session.failure_reason {
        println!("  Failure:     {}", reason.red());
    }

    if with_turns {
        println!();
        println!("{}", "Turns:".bold());
        let turns = store
            .load_turns(session_id)
            .await
            .context("Failed to read turn log")?;
        for turn in turns.iter().filter(|t| t.seq <= session.turn_count) {
            println!(
                "  {:>3} {:<11} {}",
                turn.seq,
                turn.role.to_string().cyan(),
                turn.action.excerpt(120)
            );
            if let Some(note) = &turn.note {
                println!("      {}", note.yellow());
            }
        }
    }

    if let Some(report) = &session.report {
        println!();
        println!("{}", "Report:".bold());
        println!("{}", report);
    }
    Ok(())
}

async fn cancel(session_id: SessionId, config_path: Option<PathBuf>) -> Result<()> {
    let swarm = EmbeddedSwarm::new(config_path)?;
    swarm
        .coordinator
        .resume_session(session_id)
        .await
        .with_context(|| format!("Failed to load session {}", session_id))?;
    swarm.coordinator.cancel_session(session_id).await?;

    let session = swarm.coordinator.session(session_id).await?;
    println!("Session {} is {}", session_id, status_label(session.status));
    Ok(())
}
