//! State inspection: classify every configured package against the disk
//! without mutating anything.
//!
//! Lockfile and hybrid modes are purely local. Latest-docs mode may probe
//! the registry for packages whose TTL has lapsed, when a fetcher is
//! supplied.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::cache::package_dir;
use crate::config::{Config, SyncMode};
use crate::error::Error;
use crate::fetch::registry::RegistryFetcher;
use crate::lockfile::VersionMap;
use crate::meta::{source_kind, PackageMeta, META_FILE, SCHEMA_VERSION};
use crate::report::{reason_code, DocsStatus, PackageStatus};
use crate::storage::best_existing_versions;

struct StatusBuilder<'a> {
    name: &'a str,
    mode: SyncMode,
}

impl StatusBuilder<'_> {
    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        lock_version: Option<String>,
        docs_version: Option<String>,
        status: DocsStatus,
        reason: impl Into<String>,
        code: &str,
        kind: Option<String>,
    ) -> PackageStatus {
        PackageStatus {
            name: self.name.to_string(),
            lock_version,
            docs_version,
            status,
            reason: reason.into(),
            mode: self.mode.as_str().to_string(),
            source_kind: kind,
            reason_code: code.to_string(),
        }
    }
}

/// Classify a loaded metadata record for lockfile/hybrid mode.
fn classify_meta(
    builder: &StatusBuilder<'_>,
    meta: &PackageMeta,
    lock_version: &str,
    fingerprint: &str,
) -> PackageStatus {
    if !meta.is_supported_schema() {
        return builder.build(
            Some(lock_version.to_string()),
            Some(lock_version.to_string()),
            DocsStatus::Corrupted,
            format!(
                "{META_FILE} schema version {} is newer than supported version {SCHEMA_VERSION}",
                meta.schema_version
            ),
            reason_code::LOCKFILE_CORRUPTED_META,
            meta.source_kind.clone(),
        );
    }

    if meta.version != lock_version {
        return builder.build(
            Some(lock_version.to_string()),
            Some(meta.version.clone()),
            DocsStatus::Outdated,
            format!(
                "docs version {} differs from lock version {lock_version}",
                meta.version
            ),
            reason_code::LOCKFILE_OUTDATED_VERSION_MISMATCH,
            meta.source_kind.clone(),
        );
    }

    match meta.config_hash.as_deref() {
        None => {
            return builder.build(
                Some(lock_version.to_string()),
                Some(meta.version.clone()),
                DocsStatus::Outdated,
                "metadata predates config fingerprinting; re-sync to refresh",
                reason_code::LOCKFILE_OUTDATED_CONFIG_CHANGED,
                meta.source_kind.clone(),
            );
        },
        Some(hash) if hash != fingerprint => {
            return builder.build(
                Some(lock_version.to_string()),
                Some(meta.version.clone()),
                DocsStatus::Outdated,
                "package configuration changed since the docs were synced",
                reason_code::LOCKFILE_OUTDATED_CONFIG_CHANGED,
                meta.source_kind.clone(),
            );
        },
        Some(_) => {},
    }

    if meta.is_fallback {
        builder.build(
            Some(lock_version.to_string()),
            Some(meta.version.clone()),
            DocsStatus::SyncedFallback,
            "synced from a fallback reference (no exact version tag found)",
            reason_code::LOCKFILE_OK_FALLBACK,
            meta.source_kind
                .clone()
                .or_else(|| Some(source_kind::GIT_FALLBACK.to_string())),
        )
    } else {
        builder.build(
            Some(lock_version.to_string()),
            Some(meta.version.clone()),
            DocsStatus::Synced,
            "up to date",
            reason_code::LOCKFILE_OK,
            meta.source_kind
                .clone()
                .or_else(|| Some(source_kind::GIT_HOST.to_string())),
        )
    }
}

/// Collect statuses for lockfile or hybrid mode. Purely local.
pub fn collect_status(
    config: &Config,
    versions: &VersionMap,
    output_dir: &Path,
    mode: SyncMode,
) -> Vec<PackageStatus> {
    let existing = best_existing_versions(output_dir);
    let mut statuses = Vec::with_capacity(config.packages.len());

    for (name, package) in &config.packages {
        let builder = StatusBuilder { name, mode };

        let Some(lock_version) = versions.get(name).cloned() else {
            statuses.push(builder.build(
                None,
                None,
                DocsStatus::Missing,
                "package missing from the lockfile",
                reason_code::LOCKFILE_MISSING,
                None,
            ));
            continue;
        };

        let expected_dir = package_dir(output_dir, name, &lock_version);
        if !expected_dir.is_dir() {
            let status = match existing.get(name.as_str()) {
                Some((docs_version, _)) => builder.build(
                    Some(lock_version.clone()),
                    Some(docs_version.clone()),
                    DocsStatus::Outdated,
                    format!(
                        "cached docs version {docs_version} differs from lock version {lock_version}"
                    ),
                    reason_code::LOCKFILE_OUTDATED_VERSION_MISMATCH,
                    None,
                ),
                None => builder.build(
                    Some(lock_version),
                    None,
                    DocsStatus::Missing,
                    "no synced docs found for this package",
                    reason_code::LOCKFILE_MISSING,
                    None,
                ),
            };
            statuses.push(status);
            continue;
        }

        let status = match PackageMeta::load(&expected_dir) {
            Ok(Some(meta)) => {
                classify_meta(&builder, &meta, &lock_version, &package.fingerprint())
            },
            Ok(None) => builder.build(
                Some(lock_version.clone()),
                Some(lock_version),
                DocsStatus::Corrupted,
                format!("{META_FILE} is missing"),
                reason_code::LOCKFILE_CORRUPTED_META,
                None,
            ),
            Err(Error::Storage(_)) => builder.build(
                Some(lock_version.clone()),
                Some(lock_version),
                DocsStatus::Corrupted,
                format!("{META_FILE} has invalid TOML"),
                reason_code::LOCKFILE_CORRUPTED_META,
                None,
            ),
            Err(_) => builder.build(
                Some(lock_version.clone()),
                Some(lock_version),
                DocsStatus::Corrupted,
                format!("{META_FILE} is unreadable"),
                reason_code::LOCKFILE_CORRUPTED_META,
                None,
            ),
        };
        statuses.push(status);
    }

    statuses
}

/// Collect statuses for latest-docs mode. With a registry fetcher,
/// packages whose TTL lapsed are revalidated upstream; without one the
/// check stays local.
pub async fn collect_status_latest(
    config: &Config,
    output_dir: &Path,
    registry: Option<&RegistryFetcher>,
    now: DateTime<Utc>,
) -> Vec<PackageStatus> {
    let existing = best_existing_versions(output_dir);
    let ttl_hours = config.settings.latest_ttl_hours;
    let mut statuses = Vec::with_capacity(config.packages.len());

    for name in config.packages.keys() {
        let builder = StatusBuilder {
            name,
            mode: SyncMode::LatestDocs,
        };

        let Some((docs_version, dir)) = existing.get(name.as_str()) else {
            statuses.push(builder.build(
                None,
                None,
                DocsStatus::Missing,
                "no synced docs found for this package",
                reason_code::LATEST_MISSING,
                None,
            ));
            continue;
        };

        let meta = match PackageMeta::load(dir) {
            Ok(Some(meta)) if meta.is_supported_schema() => meta,
            Ok(Some(meta)) => {
                statuses.push(builder.build(
                    None,
                    Some(docs_version.clone()),
                    DocsStatus::Corrupted,
                    format!(
                        "{META_FILE} schema version {} is newer than supported version {SCHEMA_VERSION}",
                        meta.schema_version
                    ),
                    reason_code::LATEST_CORRUPTED_META,
                    meta.source_kind.clone(),
                ));
                continue;
            },
            Ok(None) | Err(_) => {
                statuses.push(builder.build(
                    None,
                    Some(docs_version.clone()),
                    DocsStatus::Corrupted,
                    format!("{META_FILE} is missing or invalid"),
                    reason_code::LATEST_CORRUPTED_META,
                    None,
                ));
                continue;
            },
        };

        let kind = meta
            .source_kind
            .clone()
            .unwrap_or_else(|| source_kind::RENDERED.to_string());
        let is_fallback = meta.is_fallback || kind == source_kind::GIT_FALLBACK;

        if !meta.ttl_expired(now, ttl_hours) {
            statuses.push(builder.build(
                None,
                Some(docs_version.clone()),
                if is_fallback {
                    DocsStatus::SyncedFallback
                } else {
                    DocsStatus::Synced
                },
                "cached docs within TTL",
                reason_code::LATEST_CACHE_HIT_TTL,
                Some(kind),
            ));
            continue;
        }

        let status = match registry {
            Some(registry) => match registry.resolve_latest(name).await {
                Ok(latest) if latest != *docs_version => builder.build(
                    Some(latest.clone()),
                    Some(docs_version.clone()),
                    DocsStatus::Outdated,
                    format!("upstream latest {latest} is newer than cached {docs_version}"),
                    reason_code::LATEST_OUTDATED_UPSTREAM_CHANGED,
                    Some(kind),
                ),
                Ok(latest) => builder.build(
                    Some(latest),
                    Some(docs_version.clone()),
                    if is_fallback {
                        DocsStatus::SyncedFallback
                    } else {
                        DocsStatus::Synced
                    },
                    "upstream unchanged",
                    if is_fallback {
                        reason_code::LATEST_OK_FALLBACK
                    } else {
                        reason_code::LATEST_OK_RENDERED
                    },
                    Some(kind),
                ),
                Err(e) => builder.build(
                    None,
                    Some(docs_version.clone()),
                    DocsStatus::Outdated,
                    format!("TTL expired and the upstream check failed: {e}"),
                    reason_code::LATEST_OUTDATED_REFRESH_FAILED,
                    Some(kind),
                ),
            },
            None => builder.build(
                None,
                Some(docs_version.clone()),
                if is_fallback {
                    DocsStatus::SyncedFallback
                } else {
                    DocsStatus::Synced
                },
                "TTL expired; run sync to revalidate",
                if is_fallback {
                    reason_code::LATEST_OK_FALLBACK
                } else {
                    reason_code::LATEST_OK_RENDERED
                },
                Some(kind),
            ),
        };
        statuses.push(status);
    }

    statuses
}
