//! Project configuration: the `aifd.toml` file at the project root.
//!
//! The loader is strict where it matters and forgiving where history
//! requires: unknown top-level keys are ignored with a warning, unknown keys
//! inside known tables are rejected, and two legacy shapes (the
//! `experimental_registry_archive` boolean and the `sources = [{type=…}]`
//! package layout) are accepted without complaint.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::{self, Deserializer};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::{Error, Result};

/// Length of the hex fingerprint stored as `config_hash`.
const FINGERPRINT_LEN: usize = 16;

/// Supported dependency ecosystems. Selects lockfile shapes, registry
/// endpoints, and settings defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    /// Cargo.lock + crates.io + docs.rs.
    Rust,
    /// package-lock.json / pnpm-lock.yaml / yarn.lock + the npm registry.
    Node,
}

impl Ecosystem {
    /// Stable name used in config files and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Node => "node",
        }
    }

    /// Lockfile names probed at the project root, in priority order.
    pub const fn lockfile_candidates(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["Cargo.lock"],
            Self::Node => &["package-lock.json", "pnpm-lock.yaml", "yarn.lock"],
        }
    }

    /// Default artifact root for this ecosystem.
    pub fn default_output_dir(self) -> PathBuf {
        match self {
            Self::Rust => PathBuf::from("fdocs/rust"),
            Self::Node => PathBuf::from("fdocs/node"),
        }
    }

    /// Default per-file size cap in KiB.
    pub const fn default_max_file_size_kb(self) -> usize {
        match self {
            Self::Rust => 200,
            Self::Node => 512,
        }
    }

    /// Default docs source when the config names none.
    pub const fn default_docs_source(self) -> DocsSource {
        match self {
            Self::Rust => DocsSource::GitHost,
            Self::Node => DocsSource::RegistryArchive,
        }
    }

    /// Detect the ecosystem from the lockfile present at `project_root`.
    /// Cargo.lock wins when several are present.
    pub fn detect(project_root: &Path) -> Option<Self> {
        for eco in [Self::Rust, Self::Node] {
            for candidate in eco.lockfile_candidates() {
                if project_root.join(candidate).is_file() {
                    return Some(eco);
                }
            }
        }
        None
    }
}

impl<'de> Deserialize<'de> for Ecosystem {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "rust" => Ok(Self::Rust),
            "node" => Ok(Self::Node),
            _ => Err(de::Error::custom(format!(
                "settings.ecosystem must be \"rust\" or \"node\", got: {value}"
            ))),
        }
    }
}

/// Which adapter is the primary docs source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocsSource {
    /// Published registry archive (crates.io `.crate` / npm tarball).
    RegistryArchive,
    /// Git host raw files at a resolved tag or branch.
    GitHost,
}

impl DocsSource {
    /// Stable name used in config files and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RegistryArchive => "registry_archive",
            Self::GitHost => "git_host",
        }
    }
}

impl<'de> Deserialize<'de> for DocsSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "registry_archive" => Ok(Self::RegistryArchive),
            "git_host" => Ok(Self::GitHost),
            _ => Err(de::Error::custom(format!(
                "settings.docs_source must be \"registry_archive\" or \"git_host\", got: {value}"
            ))),
        }
    }
}

/// How target versions are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Versions pinned by the project lockfile.
    Lockfile,
    /// Latest published versions, refreshed on a TTL.
    LatestDocs,
    /// Registry archive for docs, git host for changelog-class files.
    Hybrid,
}

impl SyncMode {
    /// Stable name used in config files and reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lockfile => "lockfile",
            Self::LatestDocs => "latest_docs",
            Self::Hybrid => "hybrid",
        }
    }
}

impl<'de> Deserialize<'de> for SyncMode {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        match value.as_str() {
            "lockfile" => Ok(Self::Lockfile),
            "latest_docs" | "latest-docs" => Ok(Self::LatestDocs),
            "hybrid" => Ok(Self::Hybrid),
            _ => Err(de::Error::custom(format!(
                "settings.sync_mode must be \"lockfile\", \"latest_docs\", or \"hybrid\", got: {value}"
            ))),
        }
    }
}

/// Resolved engine settings. All defaults have been applied; the raw
/// on-disk shape lives in [`RawSettings`].
#[derive(Debug, Clone)]
pub struct Settings {
    /// Ecosystem profile in effect.
    pub ecosystem: Ecosystem,
    /// Artifact root, relative to the project root.
    pub output_dir: PathBuf,
    /// Per-file size cap in KiB.
    pub max_file_size_kb: usize,
    /// Remove stale `<name>@<version>` directories before syncing.
    pub prune: bool,
    /// Worker pool size, 1..=50.
    pub sync_concurrency: usize,
    /// Primary adapter.
    pub docs_source: DocsSource,
    /// Version selection strategy.
    pub sync_mode: SyncMode,
    /// Cache lifetime for latest-docs artifacts.
    pub latest_ttl_hours: u64,
}

/// One configured package.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageDoc {
    /// `owner/name` repository on the git host.
    pub repo: Option<String>,
    /// Path inside the repo for monorepos; used for default file selection.
    pub subpath: Option<String>,
    /// Explicit file list; every entry is mandatory when present.
    pub files: Option<Vec<String>>,
    /// Free-form notes surfaced in `_SUMMARY.md`. Never part of the
    /// fingerprint: editing notes must not invalidate the cache.
    #[serde(default)]
    pub ai_notes: String,

    /// Legacy shape: `sources = [{type = "github", repo = "...", files = []}]`.
    pub sources: Option<Vec<LegacySource>>,
}

/// Legacy per-package source entry, mapped onto `repo`/`files`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LegacySource {
    /// Git-host source with an optional explicit file list.
    Github {
        /// `owner/name` repository.
        repo: String,
        /// Explicit files, when non-empty.
        #[serde(default)]
        files: Vec<String>,
    },
}

impl PackageDoc {
    /// Repository from the modern field or the first legacy source.
    pub fn effective_repo(&self) -> Option<&str> {
        if let Some(repo) = self.repo.as_deref() {
            return Some(repo);
        }
        self.sources.as_ref().and_then(|sources| {
            sources.iter().map(|LegacySource::Github { repo, .. }| repo.as_str()).next()
        })
    }

    /// Explicit file list from the modern field or the first non-empty
    /// legacy source list.
    pub fn effective_files(&self) -> Option<Vec<String>> {
        if let Some(files) = &self.files {
            return Some(files.clone());
        }
        self.sources.as_ref().and_then(|sources| {
            sources
                .iter()
                .map(|LegacySource::Github { files, .. }| files)
                .find(|files| !files.is_empty())
                .cloned()
        })
    }

    /// Stable 16-hex-char digest over the fields that affect fetch output:
    /// canonical repo, canonical subpath, and the file list sorted
    /// lexicographically. `ai_notes` is deliberately excluded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(b"repo:");
        if let Some(repo) = self.effective_repo() {
            hasher.update(repo.trim().as_bytes());
        }

        hasher.update(b"\nsubpath:");
        hasher.update(normalize_subpath(self.subpath.as_deref().unwrap_or("")).as_bytes());

        hasher.update(b"\nfiles:");
        if let Some(mut files) = self.effective_files() {
            files.sort();
            for file in files {
                hasher.update(file.as_bytes());
                hasher.update(b"\n");
            }
        }

        use std::fmt::Write as _;
        let digest = hasher.finalize();
        let mut out = String::with_capacity(FINGERPRINT_LEN);
        for byte in digest.iter().take(FINGERPRINT_LEN / 2) {
            let _ = write!(out, "{byte:02x}");
        }
        out
    }
}

/// Normalize a monorepo subpath: backslashes become forward slashes, empty
/// boundary segments are stripped. `"/docs\api/"` and `"docs/api"` are the
/// same path.
pub fn normalize_subpath(subpath: &str) -> String {
    subpath
        .replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Raw `[settings]` table as written on disk.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    ecosystem: Option<Ecosystem>,
    output_dir: Option<PathBuf>,
    max_file_size_kb: Option<i64>,
    prune: Option<bool>,
    sync_concurrency: Option<i64>,
    docs_source: Option<DocsSource>,
    sync_mode: Option<SyncMode>,
    latest_ttl_hours: Option<i64>,
    /// Historical alias for `docs_source = "registry_archive"`. Explicit
    /// `docs_source` wins.
    experimental_registry_archive: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    settings: RawSettings,
    #[serde(default)]
    packages: BTreeMap<String, PackageDoc>,
}

/// Parsed and validated project configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Resolved settings.
    pub settings: Settings,
    /// Configured packages keyed by name. `BTreeMap` keeps every
    /// iteration deterministic.
    pub packages: BTreeMap<String, PackageDoc>,
}

const KNOWN_TOP_LEVEL: &[&str] = &["settings", "packages"];

impl Config {
    /// Load and validate the configuration at `path`. The project root is
    /// taken to be the file's parent directory; it drives ecosystem
    /// detection when `settings.ecosystem` is absent.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let project_root = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, project_root)
    }

    /// Parse a configuration document against an explicit project root.
    pub fn parse(content: &str, project_root: &Path) -> Result<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        if let Some(table) = value.as_table() {
            for key in table.keys() {
                if !KNOWN_TOP_LEVEL.contains(&key.as_str()) {
                    warn!("ignoring unknown top-level config key: {key}");
                }
            }
        }

        let mut known = toml::value::Table::new();
        if let Some(table) = value.as_table() {
            for key in KNOWN_TOP_LEVEL {
                if let Some(v) = table.get(*key) {
                    if !v.is_table() {
                        return Err(Error::InvalidConfig(format!(
                            "`{key}` must be a table"
                        )));
                    }
                    known.insert((*key).to_string(), v.clone());
                }
            }
        }

        let raw: RawConfig = toml::Value::Table(known)
            .try_into()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let settings = resolve_settings(raw.settings, project_root)?;
        let config = Self {
            settings,
            packages: raw.packages,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, package) in &self.packages {
            if let Some(repo) = &package.repo {
                if repo.trim().is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "package '{name}' has an empty `repo`"
                    )));
                }
            }
            if let Some(files) = &package.files {
                if files.iter().any(|f| f.trim().is_empty()) {
                    return Err(Error::InvalidConfig(format!(
                        "package '{name}' has an empty entry in `files`"
                    )));
                }
            }
        }

        let repo_required = match (self.settings.sync_mode, self.settings.docs_source) {
            (SyncMode::Hybrid, _) => true,
            (SyncMode::Lockfile, DocsSource::GitHost) => true,
            _ => false,
        };
        if repo_required {
            for (name, package) in &self.packages {
                if package.effective_repo().is_none() {
                    return Err(Error::InvalidConfig(format!(
                        "package '{name}' must define `repo` for {} mode with the {} source",
                        self.settings.sync_mode.as_str(),
                        self.settings.docs_source.as_str(),
                    )));
                }
            }
        }

        Ok(())
    }
}

fn positive(value: Option<i64>, key: &str, default: usize) -> Result<usize> {
    match value {
        None => Ok(default),
        Some(v) if v > 0 => Ok(v as usize),
        Some(_) => Err(Error::InvalidConfig(format!(
            "settings.{key} must be a positive integer"
        ))),
    }
}

fn resolve_settings(raw: RawSettings, project_root: &Path) -> Result<Settings> {
    let ecosystem = raw
        .ecosystem
        .or_else(|| Ecosystem::detect(project_root))
        .unwrap_or(Ecosystem::Rust);

    let docs_source = match (raw.docs_source, raw.experimental_registry_archive) {
        (Some(source), _) => source,
        (None, Some(true)) => DocsSource::RegistryArchive,
        (None, Some(false)) => DocsSource::GitHost,
        (None, None) => ecosystem.default_docs_source(),
    };

    let sync_concurrency = positive(raw.sync_concurrency, "sync_concurrency", 8)?;
    if sync_concurrency > 50 {
        return Err(Error::InvalidConfig(
            "settings.sync_concurrency must not exceed 50".to_string(),
        ));
    }

    Ok(Settings {
        ecosystem,
        output_dir: raw
            .output_dir
            .unwrap_or_else(|| ecosystem.default_output_dir()),
        max_file_size_kb: positive(
            raw.max_file_size_kb,
            "max_file_size_kb",
            ecosystem.default_max_file_size_kb(),
        )?,
        prune: raw.prune.unwrap_or(true),
        sync_concurrency,
        docs_source,
        sync_mode: raw.sync_mode.unwrap_or(SyncMode::Lockfile),
        latest_ttl_hours: positive(raw.latest_ttl_hours, "latest_ttl_hours", 24)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(content: &str) -> Result<Config> {
        Config::parse(content, Path::new("/nonexistent-project-root"))
    }

    #[test]
    fn defaults_apply_when_settings_table_is_absent() {
        let config = parse("[packages.serde]\nrepo = \"serde-rs/serde\"\n").unwrap();

        assert_eq!(config.settings.sync_mode, SyncMode::Lockfile);
        assert_eq!(config.settings.sync_concurrency, 8);
        assert_eq!(config.settings.latest_ttl_hours, 24);
        assert!(config.settings.prune);
        assert_eq!(config.settings.ecosystem, Ecosystem::Rust);
        assert_eq!(config.settings.max_file_size_kb, 200);
        assert_eq!(config.settings.output_dir, PathBuf::from("fdocs/rust"));
    }

    #[test]
    fn node_ecosystem_changes_defaults() {
        let config = parse(
            "[settings]\necosystem = \"node\"\n\n[packages.lodash]\nrepo = \"lodash/lodash\"\n",
        )
        .unwrap();

        assert_eq!(config.settings.ecosystem, Ecosystem::Node);
        assert_eq!(config.settings.max_file_size_kb, 512);
        assert_eq!(config.settings.docs_source, DocsSource::RegistryArchive);
        assert_eq!(config.settings.output_dir, PathBuf::from("fdocs/node"));
    }

    #[test]
    fn experimental_registry_archive_alias_maps_to_docs_source() {
        let config = parse(
            "[settings]\nexperimental_registry_archive = true\n\n[packages.serde]\nrepo = \"serde-rs/serde\"\n",
        )
        .unwrap();
        assert_eq!(config.settings.docs_source, DocsSource::RegistryArchive);

        // Explicit docs_source wins over the alias.
        let config = parse(
            "[settings]\nexperimental_registry_archive = true\ndocs_source = \"git_host\"\n\n[packages.serde]\nrepo = \"serde-rs/serde\"\n",
        )
        .unwrap();
        assert_eq!(config.settings.docs_source, DocsSource::GitHost);
    }

    #[test]
    fn legacy_sources_shape_provides_repo_and_files() {
        let config = parse(
            r#"[packages.axum]
sources = [{ type = "github", repo = "tokio-rs/axum", files = ["README.md"] }]
"#,
        )
        .unwrap();

        let package = &config.packages["axum"];
        assert_eq!(package.effective_repo(), Some("tokio-rs/axum"));
        assert_eq!(package.effective_files(), Some(vec!["README.md".to_string()]));
    }

    #[test]
    fn unknown_top_level_key_is_tolerated() {
        let config = parse(
            "[future_section]\nx = 1\n\n[packages.serde]\nrepo = \"serde-rs/serde\"\n",
        );
        assert!(config.is_ok());
    }

    #[test]
    fn unknown_settings_key_fails() {
        let err = parse(
            "[settings]\nmax_file_sixe_kb = 10\n\n[packages.serde]\nrepo = \"serde-rs/serde\"\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn unknown_package_key_fails() {
        let err = parse("[packages.serde]\nrepo = \"serde-rs/serde\"\nnotes = \"x\"\n")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn non_table_section_fails() {
        let err = parse("settings = 3\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn zero_and_oversized_concurrency_fail() {
        for body in [
            "[settings]\nsync_concurrency = 0\n",
            "[settings]\nsync_concurrency = 51\n",
            "[settings]\nmax_file_size_kb = 0\n",
            "[settings]\nlatest_ttl_hours = 0\n",
        ] {
            let err = parse(body).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig(_)), "{body}");
        }
    }

    #[test]
    fn empty_repo_fails_validation() {
        let err = parse("[packages.serde]\nrepo = \"\"\n").unwrap_err();
        assert!(err.to_string().contains("empty `repo`"));
    }

    #[test]
    fn empty_files_entry_fails_validation() {
        let err = parse(
            "[packages.serde]\nrepo = \"serde-rs/serde\"\nfiles = [\"README.md\", \"\"]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("empty entry in `files`"));
    }

    #[test]
    fn git_host_lockfile_mode_requires_repo() {
        let err = parse("[packages.serde]\nai_notes = \"x\"\n").unwrap_err();
        assert!(err.to_string().contains("must define `repo`"));
    }

    #[test]
    fn registry_archive_mode_allows_missing_repo() {
        let config = parse(
            "[settings]\ndocs_source = \"registry_archive\"\n\n[packages.serde]\nai_notes = \"x\"\n",
        );
        assert!(config.is_ok());
    }

    #[test]
    fn hybrid_mode_requires_repo() {
        let err = parse(
            "[settings]\nsync_mode = \"hybrid\"\ndocs_source = \"registry_archive\"\n\n[packages.serde]\nai_notes = \"x\"\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("must define `repo`"));
    }

    #[test]
    fn sync_mode_accepts_dash_alias() {
        let config = parse(
            "[settings]\nsync_mode = \"latest-docs\"\n\n[packages.serde]\nrepo = \"serde-rs/serde\"\n",
        )
        .unwrap();
        assert_eq!(config.settings.sync_mode, SyncMode::LatestDocs);
    }

    #[test]
    fn fingerprint_ignores_ai_notes() {
        let base = PackageDoc {
            repo: Some("lodash/lodash".into()),
            ai_notes: "v1".into(),
            ..PackageDoc::default()
        };
        let renamed = PackageDoc {
            ai_notes: "v2".into(),
            ..base.clone()
        };
        assert_eq!(base.fingerprint(), renamed.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_file_order() {
        let a = PackageDoc {
            repo: Some("o/r".into()),
            files: Some(vec!["b.md".into(), "a.md".into()]),
            ..PackageDoc::default()
        };
        let b = PackageDoc {
            repo: Some("o/r".into()),
            files: Some(vec!["a.md".into(), "b.md".into()]),
            ..PackageDoc::default()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_across_subpath_spellings() {
        let spellings = ["docs/api", "/docs\\api/", "docs\\api", "docs//api"];
        let prints: Vec<String> = spellings
            .iter()
            .map(|s| {
                PackageDoc {
                    repo: Some("o/r".into()),
                    subpath: Some((*s).to_string()),
                    ..PackageDoc::default()
                }
                .fingerprint()
            })
            .collect();
        assert!(prints.windows(2).all(|w| w[0] == w[1]), "{prints:?}");
    }

    #[test]
    fn fingerprint_changes_when_inputs_change() {
        let base = PackageDoc {
            repo: Some("o/r".into()),
            ..PackageDoc::default()
        };
        let other_repo = PackageDoc {
            repo: Some("o/other".into()),
            ..PackageDoc::default()
        };
        let with_files = PackageDoc {
            repo: Some("o/r".into()),
            files: Some(vec!["README.md".into()]),
            ..PackageDoc::default()
        };
        assert_ne!(base.fingerprint(), other_repo.fingerprint());
        assert_ne!(base.fingerprint(), with_files.fingerprint());
        assert_eq!(base.fingerprint().len(), 16);
    }

    #[test]
    fn normalize_subpath_strips_boundaries() {
        assert_eq!(normalize_subpath("/docs/api/"), "docs/api");
        assert_eq!(normalize_subpath("docs\\api"), "docs/api");
        assert_eq!(normalize_subpath(""), "");
        assert_eq!(normalize_subpath("///"), "");
    }
}
