// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Cost analysis over the JSONL cost log
//!
//! Commands: summary, sessions, session

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use vanguard_core::domain::cost::{CostEntry, CostTotals, LedgerSummary, Totals};
use vanguard_core::domain::session::SessionId;
use vanguard_core::infrastructure::cost_ledger::{CostLedgerStore, COST_LOG_FILE};

use crate::embedded;

#[derive(Subcommand)]
pub enum CostCommand {
    /// Totals across every session
    Summary,

    /// One line per session, most expensive first
    Sessions,

    /// Breakdown for one session
    Session {
        #[arg(value_name = "SESSION_ID")]
        session_id: SessionId,
    },
}

pub async fn handle_command(command: CostCommand, config_path: Option<PathBuf>) -> Result<()> {
    let log_path = embedded::data_dir(config_path)?.join(COST_LOG_FILE);
    let entries = load(&log_path)?;

    match command {
        CostCommand::Summary => {
            print_summary(&LedgerSummary::from_entries(&entries));
        }
        CostCommand::Sessions => {
            let mut sessions = per_session(&entries);
            sessions.sort_by(|a, b| b.total_cost_usd.total_cmp(&a.total_cost_usd));
            if sessions.is_empty() {
                println!("{}", "No cost entries recorded".dimmed());
            }
            for totals in sessions {
                println!(
                    "{}  ${:>9.4}  {:>9} tokens  {:>3} model / {:>3} tool calls",
                    totals.session_id, totals.total_cost_usd, totals.total_tokens, totals.model_calls, totals.tool_calls
                );
            }
        }
        CostCommand::Session { session_id } => {
            let totals = CostTotals::from_entries(
                session_id,
                entries.iter().filter(|e| e.session_id == session_id),
            );
            print_session(&totals);
        }
    }
    Ok(())
}

fn load(path: &Path) -> Result<Vec<CostEntry>> {
    CostLedgerStore::read_log(path).with_context(|| format!("Failed to read cost log {:?}", path))
}

pub fn per_session(entries: &[CostEntry]) -> Vec<CostTotals> {
    let mut grouped: BTreeMap<SessionId, Vec<&CostEntry>> = BTreeMap::new();
    for entry in entries {
        grouped.entry(entry.session_id).or_default().push(entry);
    }
    grouped
        .into_iter()
        .map(|(session_id, entries)| CostTotals::from_entries(session_id, entries))
        .collect()
}

fn print_summary(summary: &LedgerSummary) {
    println!("{}", "Cost summary".bold());
    println!("  Sessions:    {}", summary.total_sessions);
    println!("  Model calls: {}", summary.model_calls);
    println!("  Tool calls:  {}", summary.tool_calls);
    println!("  Tokens:      {}", summary.total_tokens);
    println!("  Total:       ${:.4}", summary.total_cost_usd);
    print_breakdown("By role", summary.by_role.iter().map(|(k, v)| (k.to_string(), v)));
    print_breakdown("By model", summary.by_model.iter().map(|(k, v)| (k.clone(), v)));
}

fn print_session(totals: &CostTotals) {
    println!("{} {}", "Session".bold(), totals.session_id);
    println!("  Model calls:  {}", totals.model_calls);
    println!("  Tool calls:   {} ({:.1}s)", totals.tool_calls, totals.tool_seconds);
    println!("  Tokens:       {}", totals.total_tokens);
    println!("  Total:        ${:.4}", totals.total_cost_usd);
    print_breakdown("By resource", totals.by_kind.iter().map(|(k, v)| (k.to_string(), v)));
    print_breakdown("By role", totals.by_role.iter().map(|(k, v)| (k.to_string(), v)));
    print_breakdown("By model", totals.by_model.iter().map(|(k, v)| (k.clone(), v)));
}

fn print_breakdown<'a>(title: &str, rows: impl Iterator<Item = (String, &'a Totals)>) {
    let rows: Vec<_> = rows.collect();
    if rows.is_empty() {
        return;
    }
    println!();
    println!("  {}", title.bold());
    for (label, totals) in rows {
        println!(
            "    {:<24} ${:>9.4}  {:>9} tokens  {:>4} entries",
            label, totals.cost_usd, totals.tokens, totals.entries
        );
    }
}
