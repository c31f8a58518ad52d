//! Content transformer: normalize fetched bytes into the persisted shape.
//!
//! Per file, in order: changelog trimming, the size cap, header injection,
//! filename flattening. Every step is a pure function of the input and
//! configuration, and applying the pipeline to its own output changes
//! nothing.

use crate::changelog::{is_changelog_path, trim_changelog};
use crate::fetch::FetchedFile;
use crate::util::floor_char_boundary;

/// Provenance and limits the transformer stamps into files.
#[derive(Debug, Clone)]
pub struct TransformContext<'a> {
    /// Human-readable origin, e.g. `github.com/serde-rs/serde` or the
    /// registry archive URL.
    pub source: &'a str,
    /// Resolved reference token.
    pub reference: &'a str,
    /// Whether the reference is a fallback branch rather than the version
    /// tag.
    pub is_fallback: bool,
    /// Target version, named in the fallback warning.
    pub version: &'a str,
    /// `YYYY-MM-DD` fetch date.
    pub fetched_date: &'a str,
    /// Per-file size cap in KiB.
    pub max_file_size_kb: usize,
}

/// A file ready to be persisted.
#[derive(Debug, Clone)]
pub struct TransformedFile {
    /// Flattened on-disk name.
    pub name: String,
    /// Final content.
    pub content: String,
    /// Whether the size cap fired.
    pub truncated: bool,
}

/// Run the full pipeline for one fetched file.
pub fn transform_file(file: &FetchedFile, ctx: &TransformContext<'_>) -> TransformedFile {
    let mut content = String::from_utf8_lossy(&file.bytes).into_owned();

    if is_changelog_path(&file.original_path) {
        content = trim_changelog(&content, ctx.version);
    }

    let (capped, truncated) = truncate_to_size(&content, ctx.max_file_size_kb);
    content = capped;

    if should_inject_header(&file.original_path) {
        content = inject_header(&content, &file.original_path, ctx);
    }

    TransformedFile {
        name: flatten_filename(&file.original_path),
        content,
        truncated,
    }
}

/// Replace path separators so a nested path becomes a flat, unique name.
pub fn flatten_filename(path: &str) -> String {
    path.replace(['/', '\\'], "__")
}

fn should_inject_header(path: &str) -> bool {
    let lower = path.to_ascii_lowercase();
    lower.ends_with(".md") || lower.ends_with(".html") || lower.ends_with(".htm")
}

const HEADER_PREFIX: &str = "<!-- aifd: source=";

/// Prepend the provenance comment (and the fallback warning when the tag
/// was not found). Content already carrying the header is left alone so
/// the pipeline stays idempotent.
fn inject_header(content: &str, original_path: &str, ctx: &TransformContext<'_>) -> String {
    if content.starts_with(HEADER_PREFIX) {
        return content.to_string();
    }

    let mut header = format!(
        "{HEADER_PREFIX}{} ref={} path={} fetched={} -->\n",
        ctx.source, ctx.reference, original_path, ctx.fetched_date
    );
    if ctx.is_fallback {
        header.push_str(&format!(
            "<!-- aifd warning: no tag found for version {}; fetched from '{}'. Content may not match the installed version. -->\n",
            ctx.version, ctx.reference
        ));
    }

    format!("{header}\n{content}")
}

/// Size-cap marker; its bytes do not count against the limit.
fn truncation_marker(max_size_kb: usize) -> String {
    format!("\n\n[TRUNCATED by aifd at {max_size_kb}KB]\n")
}

/// Cap `content` at `max_size_kb * 1024` bytes, cutting at a safe
/// boundary: the last paragraph break or heading before the limit, and
/// never inside a fenced code block. Exactly-at-limit content is
/// untouched.
pub fn truncate_to_size(content: &str, max_size_kb: usize) -> (String, bool) {
    let max_bytes = max_size_kb * 1024;
    if content.len() <= max_bytes {
        return (content.to_string(), false);
    }

    // Already-capped content passes through so the pipeline stays
    // idempotent; the marker is only ever appended by this function.
    if content
        .trim_end()
        .ends_with(&format!("[TRUNCATED by aifd at {max_size_kb}KB]"))
    {
        return (content.to_string(), true);
    }

    let cut = safe_cut_position(content, max_bytes);
    let truncated = content[..cut].trim_end();
    (
        format!("{truncated}{}", truncation_marker(max_size_kb)),
        true,
    )
}

/// Largest byte offset `<= max_bytes` that starts a line outside any
/// fenced code block and follows a blank line or precedes a heading.
/// Falls back to a plain char boundary when no structural cut exists.
fn safe_cut_position(content: &str, max_bytes: usize) -> usize {
    let mut best: Option<usize> = None;
    let mut in_fence = false;
    let mut offset = 0;
    let mut previous_blank = false;

    for line in content.split_inclusive('\n') {
        if offset > max_bytes {
            break;
        }

        let trimmed = line.trim();
        if !in_fence && (previous_blank || trimmed.starts_with('#')) && offset > 0 {
            best = Some(offset);
        }
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
        }
        previous_blank = trimmed.is_empty();
        offset += line.len();
    }

    best.unwrap_or_else(|| floor_char_boundary(content, max_bytes))
}
