//! Human-facing artifacts: the per-package `_SUMMARY.md` and the global
//! `_INDEX.md`.
//!
//! Both are deterministic renders of their inputs; re-running the engine
//! on identical state produces byte-identical files.

use std::fs;
use std::path::Path;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::meta::PackageMeta;
use crate::storage::{SavedPackage, INDEX_FILE};

/// Render the `_SUMMARY.md` for one package: identity, AI notes, files
/// table, and provenance.
pub fn render_summary(saved: &SavedPackage, meta: &PackageMeta, source: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}@{}\n\n", saved.name, saved.version));

    if !saved.ai_notes.trim().is_empty() {
        out.push_str("## AI Notes\n\n");
        out.push_str(saved.ai_notes.trim());
        out.push_str("\n\n");
    }

    out.push_str("## Files\n\n");
    out.push_str("| File | Source path |\n");
    out.push_str("| --- | --- |\n");
    for file in &saved.files {
        let original = file.replace("__", "/");
        out.push_str(&format!("| `{file}` | `{original}` |\n"));
    }
    out.push('\n');

    out.push_str("## Provenance\n\n");
    out.push_str(&format!("- Source: {source}\n"));
    out.push_str(&format!("- Reference: `{}`\n", saved.reference));
    out.push_str(&format!("- Fetched: {}\n", meta.fetched_at));
    if saved.is_fallback {
        out.push_str("- Note: synced from a fallback reference; content may not match the installed version.\n");
    }
    if let Some(kind) = meta.source_kind.as_deref() {
        out.push_str(&format!("- Source kind: {kind}\n"));
    }

    out
}

/// Rewrite `_INDEX.md` at the output root: one line per synced or cached
/// package, lexicographically sorted, fallback entries visibly marked.
pub fn write_index(output_dir: &Path, packages: &[SavedPackage]) -> Result<()> {
    let mut sorted: Vec<&SavedPackage> = packages.iter().collect();
    sorted.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

    let mut out = String::new();
    out.push_str("# Vendor documentation index\n\n");
    out.push_str("Maintained by aifd; do not edit by hand.\n\n");
    for package in sorted {
        let marker = if package.is_fallback { " (fallback)" } else { "" };
        out.push_str(&format!(
            "- `{}@{}`{marker} — {} file{}\n",
            package.name,
            package.version,
            package.files.len(),
            if package.files.len() == 1 { "" } else { "s" },
        ));
    }

    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(INDEX_FILE);
    let tmp = output_dir.join(format!("{INDEX_FILE}.tmp-{}", Uuid::new_v4().simple()));
    fs::write(&tmp, &out)?;
    fs::rename(&tmp, &path).map_err(|e| Error::AtomicityFail {
        path,
        message: e.to_string(),
    })?;
    Ok(())
}
