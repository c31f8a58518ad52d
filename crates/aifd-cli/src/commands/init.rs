//! `aifd init`: bootstrap a config from the project manifest.
//!
//! Scans the dependency names out of Cargo.toml (or package.json), asks
//! the registry for each package's repository URL, and writes a starter
//! config for the ones that resolve to a git-host repo.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

use aifd_core::fetch::registry::RegistryFetcher;
use aifd_core::Ecosystem;

use crate::commands::project_root;

pub async fn run(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists. Use --force to overwrite",
            config_path.display()
        );
    }

    let root = project_root(config_path);
    let ecosystem = Ecosystem::detect(&root).unwrap_or(Ecosystem::Rust);
    let names = collect_dependency_names(&root, ecosystem)?;
    if names.is_empty() {
        bail!("no dependencies found in the project manifest");
    }

    let registry = RegistryFetcher::new(ecosystem)?;
    let mut resolved = std::collections::BTreeMap::new();

    for name in names {
        match registry.resolve_repository(&name).await {
            Ok(Some(url)) => match extract_owner_repo(&url) {
                Some(repo) => {
                    resolved.insert(name, repo);
                },
                None => warn!("could not infer a git-host repo for '{name}' from {url}, skipping"),
            },
            Ok(None) => warn!("registry records no repository for '{name}', skipping"),
            Err(e) => warn!("failed to resolve metadata for '{name}': {e}"),
        }
    }

    if resolved.is_empty() {
        bail!("could not resolve any repositories from the project dependencies");
    }

    let mut out = String::new();
    out.push_str("[settings]\n");
    out.push_str(&format!(
        "output_dir = \"{}\"\n",
        ecosystem.default_output_dir().display()
    ));
    out.push_str(&format!(
        "max_file_size_kb = {}\n",
        ecosystem.default_max_file_size_kb()
    ));
    out.push_str("prune = true\n");
    out.push_str(&format!(
        "docs_source = \"{}\"\n\n",
        ecosystem.default_docs_source().as_str()
    ));

    for (name, repo) in resolved {
        if name.contains('.') || name.contains('@') || name.contains('/') {
            out.push_str(&format!("[packages.\"{name}\"]\n"));
        } else {
            out.push_str(&format!("[packages.{name}]\n"));
        }
        out.push_str(&format!("repo = \"{repo}\"\n\n"));
    }

    std::fs::write(config_path, out)
        .with_context(|| format!("failed to write {}", config_path.display()))?;
    println!("Wrote {} ({} ecosystem)", config_path.display(), ecosystem.as_str());
    Ok(())
}

/// Direct dependency names from the manifest, sorted.
fn collect_dependency_names(root: &Path, ecosystem: Ecosystem) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    match ecosystem {
        Ecosystem::Rust => {
            let manifest_path = root.join("Cargo.toml");
            if !manifest_path.is_file() {
                bail!("Cargo.toml not found at {}", manifest_path.display());
            }
            let manifest: toml::Value = toml::from_str(&std::fs::read_to_string(&manifest_path)?)
                .context("failed to parse Cargo.toml")?;

            insert_table_keys(manifest.get("dependencies"), &mut names);
            insert_table_keys(
                manifest.get("workspace").and_then(|w| w.get("dependencies")),
                &mut names,
            );
        },
        Ecosystem::Node => {
            let manifest_path = root.join("package.json");
            if !manifest_path.is_file() {
                bail!("package.json not found at {}", manifest_path.display());
            }
            let manifest: serde_json::Value =
                serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)
                    .context("failed to parse package.json")?;

            for key in ["dependencies", "devDependencies"] {
                if let Some(table) = manifest.get(key).and_then(|v| v.as_object()) {
                    names.extend(table.keys().cloned());
                }
            }
        },
    }
    Ok(names)
}

fn insert_table_keys(value: Option<&toml::Value>, names: &mut BTreeSet<String>) {
    if let Some(table) = value.and_then(toml::Value::as_table) {
        names.extend(table.keys().cloned());
    }
}

/// `owner/name` out of a repository or homepage URL.
fn extract_owner_repo(url: &str) -> Option<String> {
    let normalized = url
        .trim()
        .trim_start_matches("git+")
        .trim_end_matches('/')
        .trim_end_matches(".git");

    let marker = "github.com/";
    let idx = normalized.find(marker)?;
    let tail = &normalized[idx + marker.len()..];

    let mut parts = tail.split('/').filter(|p| !p.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?;
    Some(format!("{owner}/{repo}"))
}
