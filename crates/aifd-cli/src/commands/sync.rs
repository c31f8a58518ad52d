//! `aifd sync`: run the engine and report.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use aifd_core::{Config, NullReporter, Reporter, SyncEngine, SyncOptions};

use crate::cli::{OutputFormat, SyncModeArg};
use crate::commands::project_root;
use crate::output::{render_sync_summary, TextReporter};

pub async fn run(
    config_path: &Path,
    mode: Option<SyncModeArg>,
    force: bool,
    report_format: OutputFormat,
) -> Result<i32> {
    let config = Config::load(config_path)?;
    let root = project_root(config_path);

    let reporter: Arc<dyn Reporter> = match report_format {
        OutputFormat::Text => Arc::new(TextReporter),
        OutputFormat::Json => Arc::new(NullReporter),
    };

    let engine = SyncEngine::new(config, root)?;
    let options = SyncOptions {
        force,
        mode_override: mode.map(SyncModeArg::to_sync_mode),
    };
    let report = engine.sync(options, reporter).await?;

    match report_format {
        OutputFormat::Text => {
            eprintln!();
            eprintln!("{}", render_sync_summary(&report));
        },
        OutputFormat::Json => {
            let json = report.to_json().context("failed to serialize sync report")?;
            println!("{json}");
        },
    }

    // Partial failures are best-effort, not fatal: sync exits 0 unless the
    // run could not start at all (config/lockfile errors return Err above).
    Ok(0)
}
