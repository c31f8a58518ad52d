//! Cache index: decide per package whether remote work is needed.
//!
//! The decision is a pure function of the on-disk metadata, the target
//! version, and the entry's fingerprint. It never touches the network; TTL
//! revalidation in latest-docs mode is the orchestrator's to schedule.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::config::SyncMode;
use crate::meta::PackageMeta;

/// Outcome of a cache lookup for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDecision {
    /// Docs on disk match the target version and fingerprint.
    Hit,
    /// Remote work needed; the reason is diagnostic only.
    Miss(MissReason),
    /// Latest-docs TTL lapsed: confirm the upstream version, refetch only
    /// when it moved.
    Revalidate,
    /// Metadata exists but is unreadable or from a newer schema. Treated
    /// as a miss and forces a refresh.
    Corrupted,
}

/// Why a lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No metadata file in the target directory.
    NoMeta,
    /// Metadata's version differs from the target version.
    VersionMismatch,
    /// Entry fingerprint changed since the docs were synced.
    ConfigChanged,
}

/// Result of [`check`]: the decision plus any metadata that informed it.
#[derive(Debug)]
pub struct CacheCheck {
    /// The decision.
    pub decision: CacheDecision,
    /// Parsed metadata, when it was readable.
    pub meta: Option<PackageMeta>,
}

/// Directory a `name@version` pair maps to under the output root.
pub fn package_dir(output_dir: &Path, name: &str, version: &str) -> PathBuf {
    output_dir.join(format!("{name}@{version}"))
}

/// Evaluate the cache for `name` at `target_version`.
pub fn check(
    output_dir: &Path,
    name: &str,
    target_version: &str,
    fingerprint: &str,
    mode: SyncMode,
    ttl_hours: u64,
    now: DateTime<Utc>,
) -> CacheCheck {
    let dir = package_dir(output_dir, name, target_version);

    let meta = match PackageMeta::load(&dir) {
        Ok(Some(meta)) => meta,
        Ok(None) => {
            return CacheCheck {
                decision: CacheDecision::Miss(MissReason::NoMeta),
                meta: None,
            };
        },
        Err(_) => {
            return CacheCheck {
                decision: CacheDecision::Corrupted,
                meta: None,
            };
        },
    };

    if !meta.is_supported_schema() {
        return CacheCheck {
            decision: CacheDecision::Corrupted,
            meta: Some(meta),
        };
    }

    if meta.version != target_version {
        return CacheCheck {
            decision: CacheDecision::Miss(MissReason::VersionMismatch),
            meta: Some(meta),
        };
    }

    if let Some(hash) = meta.config_hash.as_deref() {
        if hash != fingerprint {
            return CacheCheck {
                decision: CacheDecision::Miss(MissReason::ConfigChanged),
                meta: Some(meta),
            };
        }
    }

    if mode == SyncMode::LatestDocs && meta.ttl_expired(now, ttl_hours) {
        return CacheCheck {
            decision: CacheDecision::Revalidate,
            meta: Some(meta),
        };
    }

    CacheCheck {
        decision: CacheDecision::Hit,
        meta: Some(meta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::META_FILE;

    fn write_meta(dir: &Path, body: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(META_FILE), body).unwrap();
    }

    fn meta_body(version: &str, config_hash: Option<&str>) -> String {
        let mut body = format!(
            "schema_version = 2\nversion = \"{version}\"\ngit_ref = \"v{version}\"\nfetched_at = \"2026-08-01\"\n"
        );
        if let Some(hash) = config_hash {
            body.push_str(&format!("config_hash = \"{hash}\"\n"));
        }
        body
    }

    fn now() -> DateTime<Utc> {
        "2026-08-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn missing_meta_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let result = check(tmp.path(), "serde", "1.0.0", "f", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Miss(MissReason::NoMeta));
    }

    #[test]
    fn matching_meta_is_a_hit() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = package_dir(tmp.path(), "serde", "1.0.0");
        write_meta(&dir, &meta_body("1.0.0", Some("abc123")));

        let result = check(tmp.path(), "serde", "1.0.0", "abc123", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Hit);
    }

    #[test]
    fn version_mismatch_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = package_dir(tmp.path(), "serde", "1.0.1");
        write_meta(&dir, &meta_body("1.0.0", None));

        let result = check(tmp.path(), "serde", "1.0.1", "f", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Miss(MissReason::VersionMismatch));
    }

    #[test]
    fn changed_fingerprint_is_a_miss() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = package_dir(tmp.path(), "serde", "1.0.0");
        write_meta(&dir, &meta_body("1.0.0", Some("old")));

        let result = check(tmp.path(), "serde", "1.0.0", "new", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Miss(MissReason::ConfigChanged));
    }

    #[test]
    fn absent_config_hash_still_hits() {
        // Pre-v2 records have no hash; staleness is status's concern, the
        // cache itself treats a matching version as current.
        let tmp = tempfile::tempdir().unwrap();
        let dir = package_dir(tmp.path(), "serde", "1.0.0");
        write_meta(&dir, &meta_body("1.0.0", None));

        let result = check(tmp.path(), "serde", "1.0.0", "f", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Hit);
    }

    #[test]
    fn unparseable_meta_is_corrupted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = package_dir(tmp.path(), "serde", "1.0.0");
        write_meta(&dir, "not [valid toml");

        let result = check(tmp.path(), "serde", "1.0.0", "f", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Corrupted);
    }

    #[test]
    fn future_schema_is_corrupted() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = package_dir(tmp.path(), "serde", "1.0.0");
        write_meta(
            &dir,
            &meta_body("1.0.0", Some("f")).replace("schema_version = 2", "schema_version = 99"),
        );

        let result = check(tmp.path(), "serde", "1.0.0", "f", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Corrupted);
    }

    #[test]
    fn latest_mode_schedules_revalidation_after_ttl() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = package_dir(tmp.path(), "serde", "1.0.0");
        let mut body = meta_body("1.0.0", Some("f"));
        body.push_str("ttl_expires_at = \"2026-08-01T00:00:00Z\"\n");
        write_meta(&dir, &body);

        let result = check(tmp.path(), "serde", "1.0.0", "f", SyncMode::LatestDocs, 24, now());
        assert_eq!(result.decision, CacheDecision::Revalidate);

        // Same record in lockfile mode is a plain hit.
        let result = check(tmp.path(), "serde", "1.0.0", "f", SyncMode::Lockfile, 24, now());
        assert_eq!(result.decision, CacheDecision::Hit);
    }
}
