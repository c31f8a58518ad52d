//! Subcommand implementations.

pub mod check;
pub mod init;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};

use aifd_core::SyncMode;

use crate::cli::SyncModeArg;

/// CLI override beats the configured mode.
pub fn resolve_sync_mode(mode_override: Option<SyncModeArg>, configured: SyncMode) -> SyncMode {
    mode_override
        .map(SyncModeArg::to_sync_mode)
        .unwrap_or(configured)
}

/// The project root is wherever the config file lives.
pub fn project_root(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_override_wins() {
        assert_eq!(
            resolve_sync_mode(Some(SyncModeArg::LatestDocs), SyncMode::Lockfile),
            SyncMode::LatestDocs
        );
        assert_eq!(resolve_sync_mode(None, SyncMode::Hybrid), SyncMode::Hybrid);
    }

    #[test]
    fn project_root_is_the_config_parent() {
        assert_eq!(
            project_root(Path::new("some/dir/aifd.toml")),
            PathBuf::from("some/dir")
        );
        assert_eq!(project_root(Path::new("aifd.toml")), PathBuf::from("."));
    }
}
