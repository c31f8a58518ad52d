//! The structured report: the engine's machine-readable contract.
//!
//! Field names and the status/reason-code vocabularies are stable; new
//! fields are only ever added, never renamed or removed outside a major
//! version.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::error::ErrorCode;
use crate::fetch::AdapterKind;

/// Per-package documentation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DocsStatus {
    /// Docs match the target version.
    Synced,
    /// Docs match, but a fallback reference or adapter served them.
    SyncedFallback,
    /// Docs exist for a different version or a stale configuration.
    Outdated,
    /// No docs on disk (or the sync failed outright).
    Missing,
    /// Metadata unreadable or from an unsupported schema.
    Corrupted,
}

impl DocsStatus {
    /// Stable wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "Synced",
            Self::SyncedFallback => "SyncedFallback",
            Self::Outdated => "Outdated",
            Self::Missing => "Missing",
            Self::Corrupted => "Corrupted",
        }
    }

    /// Whether this status makes `check` fail.
    pub const fn is_problem(self) -> bool {
        matches!(self, Self::Outdated | Self::Missing | Self::Corrupted)
    }
}

/// Fixed reason-code vocabulary. Codes are plain strings in the report;
/// these constants keep producers consistent.
pub mod reason_code {
    pub const LOCKFILE_OK: &str = "lockfile_ok";
    pub const LOCKFILE_OK_FALLBACK: &str = "lockfile_ok_fallback";
    pub const LOCKFILE_OUTDATED_VERSION_MISMATCH: &str = "lockfile_outdated_version_mismatch";
    pub const LOCKFILE_OUTDATED_CONFIG_CHANGED: &str = "lockfile_outdated_config_changed";
    pub const LOCKFILE_MISSING: &str = "lockfile_missing";
    pub const LOCKFILE_CORRUPTED_META: &str = "lockfile_corrupted_meta";
    pub const LATEST_OK_RENDERED: &str = "latest_ok_rendered";
    pub const LATEST_OK_REGISTRY_ARCHIVE: &str = "latest_ok_registry_archive";
    pub const LATEST_OK_FALLBACK: &str = "latest_ok_fallback";
    pub const LATEST_CACHE_HIT_TTL: &str = "latest_cache_hit_ttl";
    pub const LATEST_OUTDATED_UPSTREAM_CHANGED: &str = "latest_outdated_upstream_changed";
    pub const LATEST_OUTDATED_REFRESH_FAILED: &str = "latest_outdated_refresh_failed";
    pub const LATEST_CORRUPTED_META: &str = "latest_corrupted_meta";
    pub const LATEST_MISSING: &str = "latest_missing";
}

/// One package's line in the report.
#[derive(Debug, Clone, Serialize)]
pub struct PackageStatus {
    /// Package name.
    pub name: String,
    /// Version the lock (or registry, in latest mode) resolves to.
    pub lock_version: Option<String>,
    /// Version of the docs on disk, when any exist.
    pub docs_version: Option<String>,
    /// Documentation state.
    pub status: DocsStatus,
    /// Human-readable explanation.
    pub reason: String,
    /// Mode that produced this status (`lockfile`, `latest_docs`,
    /// `hybrid`).
    pub mode: String,
    /// Adapter class that served the docs, when known.
    pub source_kind: Option<String>,
    /// Machine-readable reason from the fixed matrix.
    pub reason_code: String,
}

/// Aggregate counters over `statuses`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Configured package count.
    pub total: usize,
    /// Synced or synced-via-fallback.
    pub synced: usize,
    /// Missing docs.
    pub missing: usize,
    /// Outdated docs.
    pub outdated: usize,
    /// Corrupted metadata.
    pub corrupted: usize,
}

impl Summary {
    /// Tally statuses into a summary.
    pub fn of(statuses: &[PackageStatus]) -> Self {
        let mut summary = Self {
            total: statuses.len(),
            ..Self::default()
        };
        for status in statuses {
            match status.status {
                DocsStatus::Synced | DocsStatus::SyncedFallback => summary.synced += 1,
                DocsStatus::Missing => summary.missing += 1,
                DocsStatus::Outdated => summary.outdated += 1,
                DocsStatus::Corrupted => summary.corrupted += 1,
            }
        }
        summary
    }

    /// Whether anything needs attention.
    pub const fn has_problems(&self) -> bool {
        self.missing > 0 || self.outdated > 0 || self.corrupted > 0
    }
}

/// Work counters for one sync invocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounters {
    /// Packages fetched and committed this run.
    pub synced: usize,
    /// Cache hits (no network).
    pub cached: usize,
    /// Skipped (not in lock, nothing fetched).
    pub skipped: usize,
    /// Terminal failures.
    pub errors: usize,
}

/// Per-adapter outcome counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourceStat {
    /// Packages this adapter served to a commit.
    pub synced: usize,
    /// Errors attributed to this adapter (absorbed fallbacks included).
    pub errors: usize,
}

/// The full report emitted by `sync` and consumed by `status`/`check`
/// callers.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Aggregate counters.
    pub summary: Summary,
    /// Per-package statuses, sorted by name.
    pub statuses: Vec<PackageStatus>,
    /// Sync work counters; absent for pure status reports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncCounters>,
    /// Per-adapter counters keyed by adapter name.
    #[serde(rename = "sourceStats")]
    pub source_stats: BTreeMap<String, SourceStat>,
    /// Histogram of package-level error codes.
    #[serde(rename = "errorCodes")]
    pub error_codes: BTreeMap<String, usize>,
    /// Human-readable problem lines.
    pub issues: Vec<String>,
}

impl Report {
    /// Report over `statuses` with empty sync-side sections.
    pub fn from_statuses(statuses: Vec<PackageStatus>) -> Self {
        let issues = issues_of(&statuses);
        Self {
            summary: Summary::of(&statuses),
            statuses,
            sync: None,
            source_stats: BTreeMap::new(),
            error_codes: BTreeMap::new(),
            issues,
        }
    }

    /// Whether every configured package is synced (fallback included);
    /// drives `check`'s exit code.
    pub fn all_synced(&self) -> bool {
        self.statuses.iter().all(|s| !s.status.is_problem())
    }

    /// Record an error code occurrence.
    pub fn count_error(&mut self, code: ErrorCode) {
        *self
            .error_codes
            .entry(code.as_str().to_string())
            .or_insert(0) += 1;
    }

    /// Mutable per-adapter counters, created on first touch.
    pub fn source_stat_mut(&mut self, adapter: AdapterKind) -> &mut SourceStat {
        self.source_stats
            .entry(adapter.as_str().to_string())
            .or_default()
    }

    /// Serialize to the stable JSON shape.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Problem lines for the `issues` array and `check` output.
pub fn issues_of(statuses: &[PackageStatus]) -> Vec<String> {
    statuses
        .iter()
        .filter(|s| s.status.is_problem())
        .map(|s| format!("{} [{}]: {}", s.name, s.status.as_str(), s.reason))
        .collect()
}
