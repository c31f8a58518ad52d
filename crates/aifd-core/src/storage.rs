//! On-disk layout: atomic package commits, pruning, and directory scans.
//!
//! A package directory is only ever replaced as a single observable step:
//! everything is staged into a `.tmp-<id>` sibling, then swapped in by
//! rename. A crash at any point leaves either the previous committed state
//! or the new one, never a partial directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::package_dir;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::lockfile::VersionMap;
use crate::meta::{PackageMeta, META_FILE};
use crate::transform::TransformedFile;
use crate::util::{is_version_better, split_name_version};

/// Index file at the output root.
pub const INDEX_FILE: &str = "_INDEX.md";

/// Per-package summary file.
pub const SUMMARY_FILE: &str = "_SUMMARY.md";

const TMP_INFIX: &str = ".tmp-";
const OLD_INFIX: &str = ".old-";

/// A package directory that reached the output root, as the index and the
/// report see it.
#[derive(Debug, Clone)]
pub struct SavedPackage {
    /// Package name.
    pub name: String,
    /// Version suffix of the directory.
    pub version: String,
    /// Resolved reference recorded in metadata.
    pub reference: String,
    /// Whether a fallback served the content.
    pub is_fallback: bool,
    /// Persisted file names (flattened), summary excluded.
    pub files: Vec<String>,
    /// Notes from the package entry.
    pub ai_notes: String,
}

/// Removes a staged temp directory unless the commit disarmed it. Covers
/// every early-return and cancellation path.
struct TempDirGuard {
    path: PathBuf,
    armed: bool,
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = fs::remove_dir_all(&self.path);
        }
    }
}

/// Stage `files`, the summary, and the metadata record for
/// `name@version`, then atomically swap the final directory into place.
pub fn commit_package(
    output_dir: &Path,
    name: &str,
    version: &str,
    files: &[TransformedFile],
    meta: &PackageMeta,
    summary: &str,
    ai_notes: &str,
) -> Result<SavedPackage> {
    let final_dir = package_dir(output_dir, name, version);
    let staging_dir = output_dir.join(format!(
        "{name}@{version}{TMP_INFIX}{}",
        Uuid::new_v4().simple()
    ));

    fs::create_dir_all(&staging_dir)?;
    let mut guard = TempDirGuard {
        path: staging_dir.clone(),
        armed: true,
    };

    let mut saved_names = Vec::with_capacity(files.len());
    for file in files {
        fs::write(staging_dir.join(&file.name), &file.content)?;
        saved_names.push(file.name.clone());
    }
    fs::write(staging_dir.join(SUMMARY_FILE), summary)?;
    fs::write(staging_dir.join(META_FILE), meta.to_toml()?)?;

    swap_into_place(&staging_dir, &final_dir)?;
    guard.armed = false;

    info!(
        "committed {name}@{version}: {} files",
        saved_names.len()
    );

    Ok(SavedPackage {
        name: name.to_string(),
        version: version.to_string(),
        reference: meta.git_ref.clone(),
        is_fallback: meta.is_fallback,
        files: saved_names,
        ai_notes: ai_notes.to_string(),
    })
}

/// Replace `final_dir` with `staging_dir` in one observable step. When the
/// destination exists a three-phase rename keeps a committed directory
/// visible throughout: final → old, staging → final, remove old.
fn swap_into_place(staging_dir: &Path, final_dir: &Path) -> Result<()> {
    if let Some(parent) = final_dir.parent() {
        fs::create_dir_all(parent)?;
    }

    let atomicity_fail = |message: String| Error::AtomicityFail {
        path: final_dir.to_path_buf(),
        message,
    };

    if final_dir.exists() {
        let old_dir = final_dir.with_file_name(format!(
            "{}{OLD_INFIX}{}",
            final_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Uuid::new_v4().simple()
        ));
        fs::rename(final_dir, &old_dir).map_err(|e| atomicity_fail(e.to_string()))?;

        if let Err(e) = fs::rename(staging_dir, final_dir) {
            // Put the previous state back before reporting failure.
            let _ = fs::rename(&old_dir, final_dir);
            return Err(atomicity_fail(e.to_string()));
        }
        let _ = fs::remove_dir_all(&old_dir);
    } else {
        fs::rename(staging_dir, final_dir).map_err(|e| atomicity_fail(e.to_string()))?;
    }

    Ok(())
}

/// Rewrite only the metadata record of an existing package directory
/// (latest-docs revalidation refreshes TTL fields without re-fetching).
pub fn refresh_meta(output_dir: &Path, name: &str, version: &str, meta: &PackageMeta) -> Result<()> {
    let dir = package_dir(output_dir, name, version);
    let path = dir.join(META_FILE);
    let tmp = dir.join(format!("{META_FILE}{TMP_INFIX}{}", Uuid::new_v4().simple()));
    fs::write(&tmp, meta.to_toml()?)?;
    fs::rename(&tmp, &path).map_err(|e| Error::AtomicityFail {
        path,
        message: e.to_string(),
    })?;
    Ok(())
}

/// A `<name>@<version>` directory found under the output root.
#[derive(Debug, Clone)]
pub struct ScannedPackage {
    /// Parsed package name (scoped npm names keep their `@scope/` prefix).
    pub name: String,
    /// Parsed version suffix.
    pub version: String,
    /// Directory path.
    pub path: PathBuf,
}

/// List every package directory under the output root. Scope directories
/// (`@scope/name@version`) are descended one level.
pub fn scan_packages(output_dir: &Path) -> Vec<ScannedPackage> {
    let mut found = Vec::new();
    collect_package_dirs(output_dir, None, &mut found);
    found.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));
    found
}

fn collect_package_dirs(dir: &Path, scope: Option<&str>, found: &mut Vec<ScannedPackage>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let file_name = entry.file_name();
        let dir_name = file_name.to_string_lossy();

        if dir_name.contains(TMP_INFIX) || dir_name.contains(OLD_INFIX) {
            continue;
        }

        if let Some((name, version)) = split_name_version(&dir_name) {
            let full_name = match scope {
                Some(scope) => format!("{scope}/{name}"),
                None => name.to_string(),
            };
            found.push(ScannedPackage {
                name: full_name,
                version: version.to_string(),
                path,
            });
        } else if scope.is_none() && dir_name.starts_with('@') {
            collect_package_dirs(&path, Some(&dir_name), found);
        }
    }
}

/// Newest on-disk version per package name, for status display.
pub fn best_existing_versions(output_dir: &Path) -> std::collections::HashMap<String, (String, PathBuf)> {
    let mut best: std::collections::HashMap<String, (String, PathBuf)> = std::collections::HashMap::new();
    for scanned in scan_packages(output_dir) {
        match best.get(&scanned.name) {
            Some((existing, _)) if !is_version_better(&scanned.version, Some(existing.as_str())) => {},
            _ => {
                best.insert(scanned.name, (scanned.version, scanned.path));
            },
        }
    }
    best
}

/// Remove package directories whose name is no longer configured or whose
/// version no longer matches the lock target; also sweeps staging
/// leftovers from interrupted runs. Returns the removed directory names.
pub fn prune(output_dir: &Path, config: &Config, versions: &VersionMap) -> Result<Vec<String>> {
    if !output_dir.exists() {
        return Ok(Vec::new());
    }

    let configured: HashSet<&str> = config.packages.keys().map(String::as_str).collect();
    let mut removed = Vec::new();

    for scanned in scan_packages(output_dir) {
        let stale = if configured.contains(scanned.name.as_str()) {
            match versions.get(&scanned.name) {
                Some(target) => target != &scanned.version,
                None => true,
            }
        } else {
            true
        };

        if stale {
            info!("pruning {}@{}", scanned.name, scanned.version);
            fs::remove_dir_all(&scanned.path)?;
            removed.push(format!("{}@{}", scanned.name, scanned.version));
        }
    }

    // Staging directories from interrupted runs are never part of the
    // committed state; sweep them opportunistically.
    if let Ok(entries) = fs::read_dir(output_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if (name.contains(TMP_INFIX) || name.contains(OLD_INFIX)) && entry.path().is_dir() {
                debug!("sweeping stale staging dir {name}");
                let _ = fs::remove_dir_all(entry.path());
            }
        }
    }

    Ok(removed)
}

/// Read a committed directory back as a [`SavedPackage`] for the index.
pub fn read_saved(
    output_dir: &Path,
    name: &str,
    version: &str,
    ai_notes: &str,
) -> Option<SavedPackage> {
    let dir = package_dir(output_dir, name, version);
    let meta = PackageMeta::load(&dir).ok().flatten()?;

    let mut files: Vec<String> = fs::read_dir(&dir)
        .ok()?
        .flatten()
        .filter_map(|entry| {
            let file_name = entry.file_name().to_str()?.to_string();
            if file_name.starts_with('.') || file_name == SUMMARY_FILE {
                None
            } else {
                Some(file_name)
            }
        })
        .collect();
    files.sort();

    Some(SavedPackage {
        name: name.to_string(),
        version: version.to_string(),
        reference: meta.git_ref,
        is_fallback: meta.is_fallback,
        files,
        ai_notes: ai_notes.to_string(),
    })
}
