//! Lock resolution: `package name → exact version` from the ecosystem's
//! lockfile.
//!
//! Four shapes are understood: Cargo.lock (TOML), package-lock.json (npm),
//! pnpm-lock.yaml, and yarn.lock (flat text). Within an ecosystem the first
//! lockfile that exists at the project root wins; the engine never writes to
//! any of them. Latest-docs mode bypasses this module entirely and resolves
//! versions from the registry instead.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::config::Ecosystem;
use crate::error::{Error, Result};
use crate::util::is_version_better;

/// Map of exact versions keyed by package name.
pub type VersionMap = HashMap<String, String>;

/// Resolve the version map for `ecosystem` from the lockfile at
/// `project_root`. Fails with [`Error::LockfileNotFound`] when no candidate
/// exists.
pub fn resolve_lock_versions(project_root: &Path, ecosystem: Ecosystem) -> Result<VersionMap> {
    for candidate in ecosystem.lockfile_candidates() {
        let path = project_root.join(candidate);
        if !path.is_file() {
            continue;
        }
        debug!("resolving versions from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        return match *candidate {
            "Cargo.lock" => parse_cargo_lock(&content).map_err(|message| Error::LockfileParse {
                path,
                message,
            }),
            "package-lock.json" => {
                parse_npm_lock(&content).map_err(|message| Error::LockfileParse { path, message })
            },
            "pnpm-lock.yaml" => {
                parse_pnpm_lock(&content).map_err(|message| Error::LockfileParse { path, message })
            },
            "yarn.lock" => Ok(parse_yarn_lock(&content)),
            other => Err(Error::Other(format!("unsupported lockfile: {other}"))),
        };
    }

    Err(Error::LockfileNotFound(
        ecosystem.lockfile_candidates().join(", "),
    ))
}

#[derive(Debug, Deserialize)]
struct CargoLock {
    #[serde(default)]
    package: Vec<CargoLockPackage>,
}

#[derive(Debug, Deserialize)]
struct CargoLockPackage {
    name: String,
    version: String,
}

/// `[[package]] name, version`. When the graph carries several versions of
/// one crate, the greatest wins.
fn parse_cargo_lock(content: &str) -> std::result::Result<VersionMap, String> {
    let lock: CargoLock = toml::from_str(content).map_err(|e| e.to_string())?;

    let mut map = VersionMap::new();
    for package in lock.package {
        let better = is_version_better(&package.version, map.get(&package.name).map(String::as_str));
        if better {
            map.insert(package.name, package.version);
        }
    }
    Ok(map)
}

/// npm v2/v3 `packages` map with a legacy `dependencies` fallback.
fn parse_npm_lock(content: &str) -> std::result::Result<VersionMap, String> {
    let root: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;

    let mut map = VersionMap::new();

    if let Some(packages) = root.get("packages").and_then(|v| v.as_object()) {
        for (key, entry) in packages {
            // Top-level installs only: "node_modules/<name>", including
            // scoped "@scope/name". Nested copies carry a second
            // "node_modules/" segment and are skipped.
            let Some(name) = key.strip_prefix("node_modules/") else {
                continue;
            };
            if name.is_empty() || name.contains("node_modules/") {
                continue;
            }
            if let Some(version) = entry.get("version").and_then(|v| v.as_str()) {
                map.insert(name.to_string(), version.to_string());
            }
        }
    }

    if map.is_empty() {
        if let Some(dependencies) = root.get("dependencies").and_then(|v| v.as_object()) {
            for (name, entry) in dependencies {
                if let Some(version) = entry.get("version").and_then(|v| v.as_str()) {
                    map.insert(name.clone(), version.to_string());
                }
            }
        }
    }

    Ok(map)
}

/// pnpm `packages` keys: `/<name>@<version>(peer-suffix…)`, or without the
/// leading slash in newer lockfile versions.
fn parse_pnpm_lock(content: &str) -> std::result::Result<VersionMap, String> {
    let root: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;

    let mut map = VersionMap::new();
    let Some(packages) = root.get("packages").and_then(|v| v.as_mapping()) else {
        return Ok(map);
    };

    for key in packages.keys() {
        let Some(key) = key.as_str() else { continue };
        let key = key.strip_prefix('/').unwrap_or(key);
        let key = key.split('(').next().unwrap_or(key);
        // rsplit keeps scoped names ("@scope/pkg@1.0.0") intact.
        if let Some((name, version)) = key.rsplit_once('@') {
            if !name.is_empty() && !version.is_empty() {
                map.insert(name.to_string(), version.to_string());
            }
        }
    }

    Ok(map)
}

/// Flat yarn.lock blocks:
///
/// ```text
/// "lodash@^4.17.15", "lodash@^4.17.20":
///   version "4.17.21"
/// ```
fn parse_yarn_lock(content: &str) -> VersionMap {
    let mut map = VersionMap::new();
    let mut pending_names: Vec<String> = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim_end();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if !line.starts_with(' ') && trimmed.ends_with(':') {
            pending_names = trimmed
                .trim_end_matches(':')
                .split(',')
                .filter_map(|spec| {
                    let spec = spec.trim().trim_matches('"');
                    spec.rsplit_once('@').map(|(name, _)| name.to_string())
                })
                .filter(|name| !name.is_empty())
                .collect();
            continue;
        }

        if let Some(rest) = line.trim_start().strip_prefix("version") {
            let version = rest.trim().trim_matches('"');
            if !version.is_empty() {
                for name in pending_names.drain(..) {
                    map.insert(name, version.to_string());
                }
            }
        }
    }

    map
}
