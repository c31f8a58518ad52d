//! `aifd check`: CI gate. Exits 0 iff every configured package is Synced
//! or SyncedFallback.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use aifd_core::fetch::registry::RegistryFetcher;
use aifd_core::{
    collect_status, collect_status_latest, resolve_lock_versions, Config, PackageStatus, Report,
    SyncMode,
};

use crate::cli::{OutputFormat, SyncModeArg};
use crate::commands::{project_root, resolve_sync_mode};
use crate::output::render_status_table;

pub async fn run(
    config_path: &Path,
    mode: Option<SyncModeArg>,
    format: OutputFormat,
) -> Result<i32> {
    let config = Config::load(config_path)?;
    let root = project_root(config_path);
    let mode = resolve_sync_mode(mode, config.settings.sync_mode);
    let output_dir = root.join(&config.settings.output_dir);

    let statuses = match mode {
        SyncMode::Lockfile | SyncMode::Hybrid => {
            let versions = resolve_lock_versions(&root, config.settings.ecosystem)?;
            collect_status(&config, &versions, &output_dir, mode)
        },
        SyncMode::LatestDocs => {
            let registry = RegistryFetcher::new(config.settings.ecosystem)?;
            collect_status_latest(&config, &output_dir, Some(&registry), Utc::now()).await
        },
    };

    let report = Report::from_statuses(statuses);

    if report.all_synced() {
        match format {
            OutputFormat::Text => println!("All configured package docs are up to date."),
            OutputFormat::Json => {
                let json = report
                    .to_json()
                    .context("failed to serialize check report")?;
                println!("{json}");
            },
        }
        return Ok(0);
    }

    match format {
        OutputFormat::Text => {
            print!("{}", render_status_table(&report.statuses));
            eprintln!("Documentation is outdated, missing, or corrupted. Run: aifd sync");
        },
        OutputFormat::Json => {
            let json = report
                .to_json()
                .context("failed to serialize check report")?;
            println!("{json}");
        },
    }
    emit_ci_annotations(format, &report.statuses);

    Ok(1)
}

/// Under GitHub Actions, surface failures as `::error` annotations; plain
/// lines otherwise (text format only).
fn emit_ci_annotations(format: OutputFormat, statuses: &[PackageStatus]) {
    let github_actions = std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true");

    for status in statuses.iter().filter(|s| s.status.is_problem()) {
        if github_actions {
            eprintln!(
                "::error title=aifd check::{} [{}] {}",
                status.name,
                status.status.as_str(),
                status.reason
            );
        } else if format == OutputFormat::Text {
            eprintln!(
                "[aifd check] {} [{}] {}",
                status.name,
                status.status.as_str(),
                status.reason
            );
        }
    }
}
