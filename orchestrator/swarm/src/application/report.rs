// Copyright (c) 2026 Vanguard Contributors
// SPDX-License-Identifier: AGPL-3.0

// Fallback report used when Summary's turn does not produce one.

use std::fmt::Write;
use vanguard_core::domain::memory::{MemoryCategory, MemoryRecord};
use vanguard_core::domain::session::ForcedSummaryReason;

const SECTIONS: [(MemoryCategory, &str); 5] = [
    (MemoryCategory::Host, "Hosts"),
    (MemoryCategory::Service, "Services"),
    (MemoryCategory::Credential, "Credentials"),
    (MemoryCategory::Finding, "Findings"),
    (MemoryCategory::Note, "Notes"),
];

/// Builds a plain-text report from the newest memory records.
pub fn synthesize(
    objective: &str,
    forced: Option<ForcedSummaryReason>,
    records: &[MemoryRecord],
) -> String {
    let mut report = String::new();
    let _ = writeln!(report, "# Assessment report");
    let _ = writeln!(report);
    let _ = writeln!(report, "Objective: {}", objective);
    if let Some(reason) = forced {
        let _ = writeln!(report, "Ended early: {}", reason);
    }

    if records.is_empty() {
        let _ = writeln!(report);
        let _ = writeln!(report, "No facts were recorded.");
        return report;
    }

    for (category, title) in SECTIONS {
        let mut section = records.iter().filter(|r| r.category == category).peekable();
        if section.peek().is_none() {
            continue;
        }
        let _ = writeln!(report);
        let _ = writeln!(report, "## {}", title);
        for record in section {
            let _ = writeln!(report, "- {}: {}", record.key, record.content);
        }
    }
    report
}
