//! `aifd status`: show per-package documentation state.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;

use aifd_core::fetch::registry::RegistryFetcher;
use aifd_core::{
    collect_status, collect_status_latest, resolve_lock_versions, Config, Report, SyncMode,
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

    match format {
        OutputFormat::Text => print!("{}", render_status_table(&statuses)),
        OutputFormat::Json => {
            let report = Report::from_statuses(statuses);
            let json = report
                .to_json()
                .context("failed to serialize status report")?;
            println!("{json}");
        },
    }

    Ok(0)
}
