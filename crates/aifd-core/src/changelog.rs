//! Changelog trimming: keep the entries a reader pinned to one version
//! actually cares about.
//!
//! The window is the current version's minor series plus the immediately
//! previous minor series. Content without recognizable version headings is
//! kept unchanged.

use regex::Regex;
use tracing::debug;

/// Marker appended when older entries are dropped. Stable so re-trimming
/// trimmed content is a no-op.
pub const TRUNCATION_MARKER: &str = "*[Earlier entries truncated by aifd]*";

/// Trim `content` to the current minor series plus one previous minor
/// series. Heading detection accepts `#`–`###` headings containing a
/// `X.Y.Z` version, optionally bracketed or `v`-prefixed, with an optional
/// prerelease suffix.
pub fn trim_changelog(content: &str, current_version: &str) -> String {
    let heading_re = Regex::new(r"(?m)^#{1,3}\s+.*?\[?v?(\d+\.\d+\.\d+(?:-[\w.]+)?)\]?")
        .expect("changelog heading regex is valid");

    let matches: Vec<(usize, String)> = heading_re
        .captures_iter(content)
        .filter_map(|cap| {
            let version = cap.get(1)?.as_str().to_string();
            let pos = cap.get(0)?.start();
            Some((pos, version))
        })
        .collect();

    if matches.is_empty() {
        debug!("no version headings found in changelog; keeping as-is");
        return content.to_string();
    }

    let current_minor = parse_minor(current_version);
    let mut found_current = false;
    let mut previous_minor: Option<Option<(u64, u64)>> = None;
    let mut cut_position: Option<usize> = None;

    for (pos, version) in &matches {
        let minor = parse_minor(version);

        if version == current_version {
            found_current = true;
            continue;
        }

        if found_current {
            if minor == current_minor && current_minor.is_some() {
                // Still inside the current series.
                continue;
            }
            match previous_minor {
                None => {
                    previous_minor = Some(minor);
                },
                Some(prev) if prev == minor => {},
                Some(_) => {
                    cut_position = Some(*pos);
                    break;
                },
            }
        }
    }

    // Version not present at all: keep a fixed window of the newest
    // entries rather than everything.
    if !found_current && matches.len() > 2 {
        cut_position = Some(matches[2].0);
    }

    match cut_position {
        Some(pos) => format!(
            "{}\n\n---\n\n{TRUNCATION_MARKER}\n",
            content[..pos].trim_end()
        ),
        None => content.to_string(),
    }
}

/// Whether a path's basename is changelog-class.
pub fn is_changelog_path(path: &str) -> bool {
    let basename = path.rsplit('/').next().unwrap_or(path);
    let stem = basename.split('.').next().unwrap_or(basename);
    matches!(
        stem.to_ascii_lowercase().as_str(),
        "changelog" | "changes" | "history"
    )
}

fn parse_minor(version: &str) -> Option<(u64, u64)> {
    let mut parts = version.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next()?.parse::<u64>().ok()?;
    Some((major, minor))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHANGELOG: &str = r"# Changelog

## [0.13.1] - 2024-01-15
- Fix bug

## [0.13.0] - 2024-01-01
- New feature

## [0.12.0] - 2023-12-01
- Old feature

## [0.11.0] - 2023-11-01
- Ancient feature
";

    #[test]
    fn keeps_current_and_previous_minor_series() {
        let result = trim_changelog(CHANGELOG, "0.13.1");
        assert!(result.contains("0.13.1"));
        assert!(result.contains("0.13.0"));
        assert!(result.contains("0.12.0"));
        assert!(!result.contains("0.11.0"));
        assert!(result.ends_with(&format!("{TRUNCATION_MARKER}\n")));
    }

    #[test]
    fn content_without_headings_is_untouched() {
        let content = "Just prose, no versions here.";
        assert_eq!(trim_changelog(content, "1.0.0"), content);
    }

    #[test]
    fn trimming_is_idempotent() {
        let once = trim_changelog(CHANGELOG, "0.13.1");
        let twice = trim_changelog(&once, "0.13.1");
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_version_keeps_newest_window() {
        let result = trim_changelog(CHANGELOG, "2.0.0");
        assert!(result.contains("0.13.1"));
        assert!(result.contains("0.13.0"));
        assert!(!result.contains("0.11.0"));
    }

    #[test]
    fn prerelease_headings_are_recognized() {
        let content = "## v1.1.0-beta.1\n- x\n\n## v1.0.0\n- y\n\n## v0.9.0\n- z\n\n## v0.8.0\n- w\n";
        let result = trim_changelog(content, "1.1.0-beta.1");
        assert!(result.contains("1.1.0-beta.1"));
        assert!(result.contains("1.0.0"));
        assert!(!result.contains("0.8.0"));
    }

    #[test]
    fn changelog_paths_match_case_insensitively() {
        assert!(is_changelog_path("CHANGELOG.md"));
        assert!(is_changelog_path("docs/Changes.md"));
        assert!(is_changelog_path("HISTORY"));
        assert!(is_changelog_path("history.txt"));
        assert!(!is_changelog_path("README.md"));
        assert!(!is_changelog_path("changelog-tool.md"));
    }
}
