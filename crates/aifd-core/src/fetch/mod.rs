//! Source adapters: remote docs behind one fetch contract.
//!
//! Three adapters produce the same shape — an ordered list of fetched files
//! plus a resolved reference token — or a classified [`Error`]. Adapters
//! never write to disk; persistence is the orchestrator's job. Fallback
//! between adapters is driven by error classification (see
//! [`crate::error::ErrorCode::is_fallback_eligible`]).

pub mod git_host;
pub mod http;
pub mod registry;
pub mod rendered;

use crate::config::normalize_subpath;

/// One file fetched from a remote source.
#[derive(Debug, Clone)]
pub struct FetchedFile {
    /// Path as the upstream knows it, relative to the subpath scope.
    pub original_path: String,
    /// Raw content.
    pub bytes: Vec<u8>,
    /// URL the bytes came from, recorded as provenance.
    pub source_url: String,
}

/// Result of a successful adapter fetch.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Fetched files in stable order (user order for explicit lists,
    /// lexicographic for defaults).
    pub files: Vec<FetchedFile>,
    /// Reference token: tag or branch name, or the registry sentinel.
    pub reference: String,
    /// True when the exact version tag was not found and a default branch
    /// served instead.
    pub is_fallback: bool,
}

/// Which adapter produced (or was asked to produce) a result. Keys the
/// report's `sourceStats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AdapterKind {
    /// Raw files from the git host at a resolved ref.
    GitHost,
    /// Published registry archive.
    RegistryArchive,
    /// Rendered-docs service (docs.rs).
    RenderedDocs,
}

impl AdapterKind {
    /// Stable wire name used in reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GitHost => "git_host",
            Self::RegistryArchive => "registry_archive",
            Self::RenderedDocs => "rendered_docs",
        }
    }
}

/// Hard-coded high-value basenames used when a package lists no explicit
/// files. Matched case-insensitively against paths relative to the
/// configured subpath.
pub const PREFERRED_BASENAMES: &[&str] = &[
    "README.md",
    "CHANGELOG.md",
    "CHANGES.md",
    "HISTORY.md",
    "LICENSE",
    "LICENSE.md",
    "index.html",
    "docs/README.md",
];

/// Cap on default file selection; also bounds in-memory tarball iteration.
pub const MAX_DEFAULT_FILES: usize = 40;

/// Strip `scope` off the front of a normalized path. `None` when the path
/// is outside the scope.
pub(crate) fn scoped_relative(path: &str, scope: &str) -> Option<String> {
    let normalized = normalize_subpath(path);
    if scope.is_empty() {
        return Some(normalized);
    }
    normalized
        .strip_prefix(&format!("{scope}/"))
        .map(str::to_string)
}

/// Whether `relative_path` (already subpath-stripped) belongs to the
/// default selection: the preferred set plus any `docs/*.md`.
pub(crate) fn is_default_selected(relative_path: &str) -> bool {
    let lower = relative_path.to_ascii_lowercase();
    if PREFERRED_BASENAMES
        .iter()
        .any(|preferred| lower == preferred.to_ascii_lowercase())
    {
        return true;
    }
    if let Some(rest) = lower.strip_prefix("docs/") {
        return !rest.contains('/') && rest.ends_with(".md");
    }
    false
}

/// Filter an upstream path listing down to the default selection under
/// `subpath`, lexicographically sorted and capped at
/// [`MAX_DEFAULT_FILES`]. Returned paths are relative to the subpath and
/// preserve the upstream spelling.
pub fn select_default_files<'a, I>(paths: I, subpath: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let scope = normalize_subpath(subpath);
    let mut selected: Vec<String> = paths
        .into_iter()
        .filter_map(|path| {
            let relative = scoped_relative(path, &scope)?;
            is_default_selected(&relative).then_some(relative)
        })
        .collect();

    selected.sort();
    selected.dedup();
    selected.truncate(MAX_DEFAULT_FILES);
    selected
}
