//! The per-package metadata record, `.aifd-meta.toml`.
//!
//! Written once per successful sync, read by the cache index and by
//! `status`/`check`. Records newer than [`SCHEMA_VERSION`] are ignored
//! safely: the directory is reported Corrupted instead of being
//! misinterpreted.

use std::path::Path;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current metadata schema. v1 lacked `config_hash` and the latest-docs
/// fields; v1 records are still readable.
pub const SCHEMA_VERSION: u32 = 2;

/// Metadata file name inside every `<name>@<version>` directory.
pub const META_FILE: &str = ".aifd-meta.toml";

/// Reference sentinel recorded when docs came from a registry archive
/// rather than a git ref.
pub const REGISTRY_ARCHIVE_REF: &str = "registry-archive";

/// Values recorded in `source_kind`.
pub mod source_kind {
    /// Rendered-docs service produced the artifact.
    pub const RENDERED: &str = "rendered";
    /// Git host served after a fallback from the primary adapter.
    pub const GIT_FALLBACK: &str = "git_fallback";
    /// Hybrid artifact assembled from more than one adapter.
    pub const MIXED: &str = "mixed";
    /// Registry archive served the artifact.
    pub const REGISTRY_ARCHIVE: &str = "registry_archive";
    /// Git host served as the configured primary.
    pub const GIT_HOST: &str = "git_host";
}

/// On-disk metadata for one synced package directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMeta {
    /// Schema of this record; see [`SCHEMA_VERSION`].
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Version the docs were fetched for; always equals the directory
    /// suffix.
    pub version: String,
    /// Resolved git ref, or [`REGISTRY_ARCHIVE_REF`].
    pub git_ref: String,
    /// True when the version tag was not found and a default branch (or a
    /// fallback adapter) served instead.
    #[serde(default)]
    pub is_fallback: bool,
    /// `YYYY-MM-DD` date of the fetch.
    pub fetched_at: String,
    /// Fingerprint of the package entry at sync time; absence marks a
    /// pre-v2 record and renders the package Outdated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    /// Sync mode that produced this record (`latest_docs` records only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_mode: Option<String>,
    /// Which adapter class served; see [`source_kind`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_kind: Option<String>,
    /// Upstream's latest version at check time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_latest_version: Option<String>,
    /// RFC 3339 instant of the last upstream check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_checked_at: Option<String>,
    /// RFC 3339 instant after which a latest-docs artifact must be
    /// revalidated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_expires_at: Option<String>,
    /// Artifact encoding, e.g. `markdown`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_format: Option<String>,
    /// Total bytes persisted for the artifact set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_bytes: Option<u64>,
    /// Hex SHA-256 of the primary artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_sha256: Option<String>,
    /// Whether any file hit the size cap.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated: Option<bool>,
}

const fn default_schema_version() -> u32 {
    1
}

impl PackageMeta {
    /// Whether this record's schema is one we understand.
    pub const fn is_supported_schema(&self) -> bool {
        self.schema_version <= SCHEMA_VERSION
    }

    /// Parse a metadata document.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Storage(format!("invalid {META_FILE}: {e}")))
    }

    /// Read the record from a package directory. `Ok(None)` when the file
    /// does not exist; parse failures are errors so callers can
    /// distinguish missing from corrupted.
    pub fn load(package_dir: &Path) -> Result<Option<Self>> {
        let path = package_dir.join(META_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content).map(Some)
    }

    /// Serialize for writing.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::Storage(format!("failed to serialize {META_FILE}: {e}")))
    }

    /// Whether the latest-docs TTL has lapsed at `now`. Records without
    /// `ttl_expires_at` fall back to `fetched_at + ttl_hours`.
    pub fn ttl_expired(&self, now: DateTime<Utc>, ttl_hours: u64) -> bool {
        if let Some(expiry) = self
            .ttl_expires_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            return now > expiry.with_timezone(&Utc);
        }

        let Ok(date) = NaiveDate::parse_from_str(&self.fetched_at, "%Y-%m-%d") else {
            return true;
        };
        let Some(fetched) = date.and_hms_opt(0, 0, 0) else {
            return true;
        };
        now.naive_utc() - fetched >= Duration::hours(ttl_hours as i64)
    }
}
