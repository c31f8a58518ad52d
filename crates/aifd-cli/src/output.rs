//! Terminal output: the progress reporter for text-mode sync and the
//! status table.

use std::fmt::Write as _;

use colored::Colorize;

use aifd_core::sync::SyncEvent;
use aifd_core::{PackageStatus, Report, Reporter, Summary};

/// Reporter that narrates sync progress to stderr. JSON mode uses
/// [`aifd_core::NullReporter`] instead so stdout stays machine-readable.
pub struct TextReporter;

impl Reporter for TextReporter {
    fn event(&self, event: SyncEvent<'_>) {
        match event {
            SyncEvent::Pruned { name } => {
                eprintln!("  {} {name}", "pruned".yellow());
            },
            SyncEvent::CacheHit { name, version } => {
                eprintln!("  {} {name}@{version} (cached)", "✓".green());
            },
            SyncEvent::Syncing { name, version } => {
                eprintln!("  {} {name}@{version}...", "⟳".cyan());
            },
            SyncEvent::FallbackEngaged {
                name, from, to, ..
            } => {
                eprintln!(
                    "  {} {name}: {} failed, trying {}",
                    "↪".yellow(),
                    from.as_str(),
                    to.as_str()
                );
            },
            SyncEvent::Synced {
                name,
                version,
                fallback,
            } => {
                if fallback {
                    eprintln!("  {} {name}@{version} (fallback)", "✓".yellow());
                } else {
                    eprintln!("  {} {name}@{version}", "✓".green());
                }
            },
            SyncEvent::Skipped { name, reason } => {
                eprintln!("  {} {name}: {reason}", "-".normal());
            },
            SyncEvent::Failed { name, code, message } => {
                eprintln!("  {} {name} [{}]: {message}", "✗".red(), code.as_str());
            },
        }
    }
}

/// Sync summary line, colored for the terminal.
pub fn render_sync_summary(report: &Report) -> String {
    let counters = report.sync.unwrap_or_default();
    let errors = if counters.errors > 0 {
        counters.errors.to_string().red().to_string()
    } else {
        counters.errors.to_string()
    };
    let mut line = format!(
        "Sync complete: {} synced, {} cached, {} skipped, {errors} errors",
        counters.synced.to_string().green(),
        counters.cached,
        counters.skipped,
    );
    if !report.error_codes.is_empty() {
        let breakdown: Vec<String> = report
            .error_codes
            .iter()
            .map(|(code, count)| format!("{code}={count}"))
            .collect();
        let _ = write!(line, "\n  error breakdown: {}", breakdown.join(", "));
    }
    line
}

const COL_NAME: usize = 28;
const COL_LOCK: usize = 16;
const COL_DOCS: usize = 16;
const COL_STATUS: usize = 14;

/// Fixed-width status table with per-row reasons and a summary footer.
pub fn render_status_table(statuses: &[PackageStatus]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<COL_NAME$} {:<COL_LOCK$} {:<COL_DOCS$} {:<COL_STATUS$}",
        "Package", "Lock Version", "Docs Version", "Status"
    );
    let _ = writeln!(
        out,
        "{:-<COL_NAME$} {:-<COL_LOCK$} {:-<COL_DOCS$} {:-<COL_STATUS$}",
        "", "", "", ""
    );

    for status in statuses {
        let lock = status.lock_version.as_deref().unwrap_or("-");
        let docs = status.docs_version.as_deref().unwrap_or("-");
        let _ = writeln!(
            out,
            "{:<COL_NAME$} {:<COL_LOCK$} {:<COL_DOCS$} {:<COL_STATUS$}",
            status.name,
            lock,
            docs,
            status.status.as_str(),
        );
        let _ = writeln!(out, "  └ {}", status.reason);
    }

    let summary = Summary::of(statuses);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Total: {} | Synced: {} | Missing: {} | Outdated: {} | Corrupted: {}",
        summary.total, summary.synced, summary.missing, summary.outdated, summary.corrupted
    );

    if summary.has_problems() {
        let _ = writeln!(out, "Hint: run `aifd sync` (or `aifd sync --force` for a full refresh)");
        let _ = writeln!(out, "CI hint: run `aifd check` to fail on stale docs");
        let _ = writeln!(out, "\nProblem details:");
        for status in statuses.iter().filter(|s| s.status.is_problem()) {
            let _ = writeln!(
                out,
                "- {} [{}]: {}",
                status.name,
                status.status.as_str(),
                status.reason
            );
        }
    }

    out
}
