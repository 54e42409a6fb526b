// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Interactive session driver
//!
//! Commands: run, resume

use anyhow::{Context, Result};
use chrono::Utc;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use vanguard_core::domain::events::SessionEvent;
use vanguard_core::domain::session::{SessionId, SessionStatus};
use vanguard_core::domain::tool::{ApprovalOutcome, ToolCallStatus};
use vanguard_core::infrastructure::approval_registry::ApprovalRequest;
use vanguard_core::infrastructure::event_bus::{EventBusError, SessionEventReceiver};
use vanguard_swarm::{SwarmCoordinator, SwarmError, TurnOutcome};

use crate::embedded::EmbeddedSwarm;

pub async fn run(objective: String, auto_deny: bool, config_path: Option<PathBuf>) -> Result<()> {
    let swarm = EmbeddedSwarm::new(config_path)?;
    let session_id = swarm
        .coordinator
        .start_session(&objective)
        .await
        .context("Failed to start session")?;

    println!("{} {}", "Session started:".bold(), session_id.to_string().cyan());
    println!("  Objective: {}", objective);
    println!("  Data dir:  {}", swarm.data_dir.display());
    println!();

    drive(&swarm, session_id, auto_deny).await
}

pub async fn resume(session_id: SessionId, auto_deny: bool, config_path: Option<PathBuf>) -> Result<()> {
    let swarm = EmbeddedSwarm::new(config_path)?;
    let session = swarm
        .coordinator
        .resume_session(session_id)
        .await
        .with_context(|| format!("Failed to resume session {}", session_id))?;

    println!(
        "{} {} ({} turn(s), {} active, {})",
        "Session resumed:".bold(),
        session_id.to_string().cyan(),
        session.turn_count,
        session.active_role,
        session.status
    );
    println!();

    drive(&swarm, session_id, auto_deny).await
}

/// Advances the session until it ends, prompting on every approval gate.
async fn drive(swarm: &EmbeddedSwarm, session_id: SessionId, auto_deny: bool) -> Result<()> {
    let coordinator = swarm.coordinator.clone();
    let printer = tokio::spawn(print_events(swarm.events.subscribe_session(session_id)));

    let interrupt = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(session_id = %session_id, "Interrupted; cancelling session");
                if let Err(e) = coordinator.cancel_session(session_id).await {
                    warn!("Failed to cancel session: {}", e);
                }
            }
        })
    };

    let result = drive_loop(&coordinator, session_id, auto_deny).await;

    interrupt.abort();
    printer.abort();
    result
}

async fn drive_loop(coordinator: &Arc<SwarmCoordinator>, session_id: SessionId, auto_deny: bool) -> Result<()> {
    let mut prompter = Prompter::default();
    let timeout = coordinator.config().approval_timeout();
    loop {
        let blocked_on = match coordinator.advance(session_id).await {
            Ok(TurnOutcome::AwaitingApproval { tool_call_id, .. }) => tool_call_id,
            Ok(TurnOutcome::Completed { report, forced, .. }) => {
                if let Some(reason) = forced {
                    println!("{}", format!("Summary forced: {}", reason).yellow());
                }
                println!();
                println!("{}", "Final report".bold());
                println!("{}", report);
                break;
            }
            Ok(TurnOutcome::Failed { reason }) => {
                println!("{} {}", "Session failed:".red().bold(), reason);
                break;
            }
            Ok(TurnOutcome::Cancelled) => {
                println!("{}", "Session cancelled".yellow());
                break;
            }
            Ok(_) => continue,
            Err(SwarmError::SessionBlocked { tool_call_id, .. }) => tool_call_id,
            Err(SwarmError::SessionTerminal { status, .. }) => {
                println!("Session is {}", status);
                break;
            }
            Err(e) => return Err(e.into()),
        };

        let timed_out = coordinator.expire_stale_approvals().await?;
        if timed_out.iter().any(|r| r.tool_call_id == blocked_on) {
            println!("{}", "Approval timed out; call rejected".yellow());
            continue;
        }

        let Some(request) = coordinator
            .pending_approvals()
            .into_iter()
            .find(|r| r.tool_call_id() == blocked_on)
        else {
            // Resolved elsewhere in the meantime.
            continue;
        };
        let Some(outcome) = decide(&mut prompter, &request, auto_deny, timeout).await? else {
            // Window closed while prompting; the next pass expires the call.
            continue;
        };
        let decided_by = std::env::var("USER").unwrap_or_else(|_| "operator".to_string());
        match coordinator.submit_approval(blocked_on, outcome, &decided_by).await {
            Ok(result) => info!(tool_call_id = %blocked_on, status = %result.status, "Approval applied"),
            Err(SwarmError::NoPendingApproval(_)) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    prompter.dismiss().await;

    let session = coordinator.session(session_id).await?;
    let cost = coordinator.cost(session_id).await;
    println!();
    println!(
        "{} {} after {} turn(s), ${:.4} ({} tokens)",
        "Session".bold(),
        status_label(session.status),
        session.turn_count,
        cost.total_cost_usd,
        cost.total_tokens
    );
    Ok(())
}

/// `None` when the approval window closed before the operator answered.
async fn decide(
    prompter: &mut Prompter,
    request: &ApprovalRequest,
    auto_deny: bool,
    timeout: Option<Duration>,
) -> Result<Option<ApprovalOutcome>> {
    let approval = &request.approval;
    println!();
    println!(
        "{} {} [{}] requested by {}",
        "Approval required:".yellow().bold(),
        approval.request.tool.bold(),
        approval.tier,
        approval.requested_by
    );
    for (key, value) in &approval.request.arguments {
        println!("  {} = {}", key, value);
    }
    for reason in &request.reasons {
        println!("  {}", reason.dimmed());
    }

    if auto_deny {
        println!("{}", "  Denied (--auto-deny)".red());
        return Ok(Some(ApprovalOutcome::Denied));
    }

    let window = timeout.map(|timeout| approval_window(request, timeout));
    match window {
        Some(Duration::ZERO) => return Ok(None),
        Some(window) => println!("  {}", format!("Expires in {}s", window.as_secs()).dimmed()),
        None => {}
    }
    let question = format!("Execute {} against the target?", approval.request.tool);
    let Some(approved) = prompter.ask(question, window).await? else {
        println!("{}", "  No answer before the approval timeout".yellow());
        return Ok(None);
    };

    Ok(Some(if approved {
        ApprovalOutcome::Approved
    } else {
        ApprovalOutcome::Denied
    }))
}

/// Time left before a parked call expires.
fn approval_window(request: &ApprovalRequest, timeout: Duration) -> Duration {
    let waited = (Utc::now() - request.requested_at()).to_std().unwrap_or_default();
    timeout.saturating_sub(waited)
}

/// Terminal confirmation prompts. A blocking read cannot be interrupted, so a
/// prompt that outlives its window keeps the terminal until answered and the
/// next prompt waits for it.
#[derive(Default)]
struct Prompter {
    expired: Option<JoinHandle<dialoguer::Result<bool>>>,
}

impl Prompter {
    /// Waits out a prompt left open by an expired approval.
    async fn dismiss(&mut self) {
        if let Some(expired) = self.expired.take() {
            println!("{}", "  Press Enter to dismiss the expired prompt".dimmed());
            // Whatever it read belongs to a call that is already rejected.
            let _ = expired.await;
        }
    }

    async fn ask(&mut self, question: String, window: Option<Duration>) -> Result<Option<bool>> {
        self.dismiss().await;

        let mut prompt = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(question)
                .default(false)
                .interact()
        });
        let answered = match window {
            Some(window) => {
                let answered = tokio::select! {
                    answered = &mut prompt => Some(answered),
                    _ = tokio::time::sleep(window) => None,
                };
                match answered {
                    Some(answered) => answered,
                    None => {
                        self.expired = Some(prompt);
                        return Ok(None);
                    }
                }
            }
            None => prompt.await,
        };
        let approved = answered
            .context("Approval prompt panicked")?
            .context("Failed to read approval")?;
        Ok(Some(approved))
    }
}

async fn print_events(mut receiver: SessionEventReceiver) {
    loop {
        let event = match receiver.recv().await {
            Ok(event) => event,
            Err(EventBusError::Lagged(dropped)) => {
                warn!(dropped, "Event printer fell behind");
                continue;
            }
            Err(_) => break,
        };
        match event {
            SessionEvent::TurnCompleted {
                seq,
                role,
                excerpt,
                note,
                ..
            } => {
                println!("{} {} {}", format!("[{:>3}]", seq).dimmed(), role.to_string().cyan(), excerpt);
                if let Some(note) = note {
                    println!("      {}", note.yellow());
                }
            }
            SessionEvent::ToolCallCompleted {
                tool,
                status,
                duration_ms,
                retry_count,
                ..
            } => {
                println!(
                    "      {} {} {} in {}ms{}",
                    "tool".dimmed(),
                    tool,
                    tool_status(status),
                    duration_ms,
                    if retry_count > 0 {
                        format!(" ({} retries)", retry_count)
                    } else {
                        String::new()
                    }
                );
            }
            SessionEvent::CostWarning {
                total_cost_usd,
                threshold_usd,
                ..
            } => println!(
                "{}",
                format!("Cost ${:.4} crossed the ${:.2} warning threshold", total_cost_usd, threshold_usd).yellow()
            ),
            SessionEvent::SummaryForced { reason, .. } => {
                println!("{}", format!("Handing control to summary: {}", reason).yellow())
            }
            _ => {}
        }
    }
}

fn tool_status(status: ToolCallStatus) -> colored::ColoredString {
    match status {
        ToolCallStatus::Ok => "ok".green(),
        ToolCallStatus::Error => "error".red(),
        ToolCallStatus::Rejected => "rejected".yellow(),
        ToolCallStatus::Cancelled => "cancelled".dimmed(),
    }
}

pub(crate) fn status_label(status: SessionStatus) -> colored::ColoredString {
    match status {
        SessionStatus::Running => "running".cyan(),
        SessionStatus::AwaitingApproval => "awaiting_approval".yellow(),
        SessionStatus::Completed => "completed".green(),
        SessionStatus::Failed => "failed".red(),
        SessionStatus::Cancelled => "cancelled".dimmed(),
    }
}
