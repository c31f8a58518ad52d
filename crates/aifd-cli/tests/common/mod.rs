#![allow(clippy::expect_used, clippy::unwrap_used, dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use assert_cmd::Command;
use tempfile::TempDir;

pub const CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Configured `aifd` command for integration tests.
pub fn aifd_cmd() -> Command {
    let mut cmd = Command::cargo_bin("aifd").expect("aifd binary should build for tests");
    cmd.timeout(CMD_TIMEOUT);
    cmd.env("NO_COLOR", "1");
    cmd
}

/// A scratch project: a directory with a config and a Cargo.lock.
pub struct Project {
    pub tmp: TempDir,
}

impl Project {
    pub fn new() -> Self {
        Self {
            tmp: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.root().join("aifd.toml")
    }

    pub fn write_config(&self, body: &str) {
        std::fs::write(self.config_path(), body).expect("write config");
    }

    pub fn write_cargo_lock(&self, entries: &[(&str, &str)]) {
        let mut out = String::from("version = 3\n");
        for (name, version) in entries {
            out.push_str(&format!(
                "\n[[package]]\nname = \"{name}\"\nversion = \"{version}\"\n"
            ));
        }
        std::fs::write(self.root().join("Cargo.lock"), out).expect("write lockfile");
    }

    /// Plant a committed package directory as a prior sync would have
    /// left it.
    pub fn plant_synced(&self, name: &str, version: &str, config_hash: &str) {
        let dir = self
            .root()
            .join("fdocs/rust")
            .join(format!("{name}@{version}"));
        std::fs::create_dir_all(&dir).expect("create package dir");
        std::fs::write(dir.join("README.md"), "# docs\n").expect("write file");
        std::fs::write(dir.join("_SUMMARY.md"), "# summary\n").expect("write summary");
        std::fs::write(
            dir.join(".aifd-meta.toml"),
            format!(
                "schema_version = 2\nversion = \"{version}\"\ngit_ref = \"v{version}\"\nis_fallback = false\nfetched_at = \"2026-08-01\"\nconfig_hash = \"{config_hash}\"\n"
            ),
        )
        .expect("write meta");
    }
}
