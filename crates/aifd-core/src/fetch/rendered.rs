//! Rendered-docs adapter: one canonical docs.rs page normalized into a
//! single `API.md` artifact.
//!
//! The normalizer is deterministic: identical HTML in, identical markdown
//! out. The artifact always carries a level-1 identity heading, an
//! Overview, an API Reference module index, at least one fenced code
//! block, and a provenance footer. When the page yields neither body
//! content nor module links the output is degraded and reported as
//! [`Error::NormalizationDegraded`] instead of a rendered success.

use crate::error::{Error, Result};
use crate::fetch::http::{status_error, HttpClient};

const DOCS_RS_BASE: &str = "https://docs.rs";

/// Result of a successful rendered-docs fetch.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    /// The normalized `API.md` content.
    pub markdown: String,
    /// Page the artifact was generated from.
    pub source_url: String,
}

/// Fetches and normalizes rendered documentation pages.
pub struct RenderedDocsFetcher {
    http: HttpClient,
    base_url: String,
}

impl RenderedDocsFetcher {
    /// Production fetcher against docs.rs.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DOCS_RS_BASE)
    }

    /// Fetcher against a custom endpoint (tests point this at a mock
    /// server).
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the crate page for `name@version` and normalize it.
    pub async fn fetch_api_markdown(&self, name: &str, version: &str) -> Result<RenderedArtifact> {
        let source_url = format!("{}/crate/{name}/{version}", self.base_url);
        let response = self.http.get_with_retry(&source_url).await?;
        if !response.status().is_success() {
            return Err(status_error(&source_url, response.status()));
        }
        let html = response.text().await.map_err(|e| Error::Fetch {
            url: source_url.clone(),
            source: e,
        })?;

        let markdown = normalize_page(name, version, &html, &self.base_url);

        let body = extract_main_content(&html, &self.base_url);
        let links = extract_module_links(name, version, &html);
        if body.is_empty() && links.is_empty() {
            return Err(Error::NormalizationDegraded {
                name: name.to_string(),
                version: version.to_string(),
                missing: "documentation body".to_string(),
            });
        }

        Ok(RenderedArtifact {
            markdown,
            source_url,
        })
    }
}

/// Render the canonical `API.md` for a crate page. Pure.
fn normalize_page(name: &str, version: &str, html: &str, base_url: &str) -> String {
    let title = extract_title(html).unwrap_or_else(|| format!("{name} {version}"));
    let body = extract_main_content(html, base_url);
    let links = extract_module_links(name, version, html);

    let mut out = String::new();
    out.push_str(&format!("# {name}@{version}\n\n"));

    out.push_str("## Overview\n\n");
    out.push_str(&format!(
        "Generated from the rendered docs page **{title}** for `{name}` `{version}`.\n\n"
    ));

    if !body.is_empty() {
        out.push_str("## Documentation\n\n");
        out.push_str(&body);
        out.push_str("\n\n");
    }

    out.push_str("## API Reference\n\n");
    out.push_str(&format!("- [crate page]({base_url}/crate/{name}/{version})\n"));
    out.push_str(&format!("- [rustdoc root]({base_url}/{name}/{version}/{name}/)\n"));
    for link in links.iter().take(20) {
        out.push_str(&format!("- [{link}]({base_url}{link})\n"));
    }
    out.push('\n');

    if !body.contains("```") {
        out.push_str("## Example\n\n");
        out.push_str("```rust\n");
        out.push_str(&format!("use {} as _;\n", name.replace('-', "_")));
        out.push_str("```\n\n");
    }

    out.push_str("---\n");
    out.push_str(&format!("Source: {base_url}/crate/{name}/{version}\n"));
    out
}

fn extract_title(html: &str) -> Option<String> {
    let start = html.find("<title>")? + "<title>".len();
    let end = html[start..].find("</title>")? + start;
    Some(html[start..end].trim().to_string())
}

/// Pull the main article out of the page: `<div id="main-content">` with a
/// `<div class="docblock">` fallback, converted to markdown.
fn extract_main_content(html: &str, base_url: &str) -> String {
    for marker in ["<div id=\"main-content\"", "<div class=\"docblock\""] {
        if let Some(start) = html.find(marker) {
            let rest = &html[start..];
            if let Some(end) = find_closing_div(rest) {
                return html_to_markdown(&rest[..end], base_url);
            }
        }
    }
    String::new()
}

/// Index of the byte just past the `</div>` matching the `<div` the slice
/// starts with.
fn find_closing_div(html: &str) -> Option<usize> {
    let bytes = html.as_bytes();
    let mut depth = 0_i32;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"<div") {
            let next = bytes.get(i + 4);
            if matches!(next, None | Some(b' ') | Some(b'>')) {
                depth += 1;
                i += 4;
                continue;
            }
        }
        if bytes[i..].starts_with(b"</div>") {
            depth -= 1;
            i += 6;
            if depth == 0 {
                return Some(i);
            }
            continue;
        }
        i += 1;
    }
    None
}

/// Hrefs under `/{name}/{version}/…`, deduplicated in first-seen order.
fn extract_module_links(name: &str, version: &str, html: &str) -> Vec<String> {
    let needle = format!("href=\"/{name}/{version}/");
    let mut links = Vec::new();
    let mut idx = 0;
    while let Some(found) = html[idx..].find(&needle) {
        let start = idx + found + "href=\"".len();
        let rest = &html[start..];
        let Some(end) = rest.find('"') else { break };
        let href = &rest[..end];
        if !links.iter().any(|existing| existing == href) {
            links.push(href.to_string());
        }
        idx = start + end;
    }
    links
}

/// Tag state tracked while linearizing HTML.
struct TagScan {
    out: String,
    in_script_or_style: bool,
    in_pre: bool,
    pending_hrefs: Vec<String>,
}

/// Convert an HTML fragment to markdown: headings keep their level, `<pre>`
/// becomes a fenced block, `<code>` becomes backticks, anchors keep their
/// absolute target in parentheses, navigation/script/style content is
/// dropped.
fn html_to_markdown(html: &str, base_url: &str) -> String {
    let mut scan = TagScan {
        out: String::new(),
        in_script_or_style: false,
        in_pre: false,
        pending_hrefs: Vec::new(),
    };

    let mut rest = html;
    while let Some(open) = rest.find('<') {
        let text = &rest[..open];
        if !scan.in_script_or_style {
            push_text(&mut scan.out, text, scan.in_pre);
        }
        rest = &rest[open..];

        let Some(close) = rest.find('>') else { break };
        let tag = &rest[1..close];
        handle_tag(&mut scan, tag, base_url);
        rest = &rest[close + 1..];
    }
    if !scan.in_script_or_style {
        push_text(&mut scan.out, rest, scan.in_pre);
    }

    collapse_blank_lines(scan.out.trim())
}

fn handle_tag(scan: &mut TagScan, tag: &str, base_url: &str) {
    let tag_lower = tag.to_ascii_lowercase();
    let tag_name: String = tag_lower
        .trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    let closing = tag_lower.starts_with('/');

    if scan.in_script_or_style && !matches!(tag_name.as_str(), "script" | "style" | "nav") {
        return;
    }

    match tag_name.as_str() {
        "script" | "style" | "nav" => scan.in_script_or_style = !closing,
        "pre" => {
            if closing {
                scan.out.push_str("\n```\n");
                scan.in_pre = false;
            } else {
                scan.out.push_str("\n```rust\n");
                scan.in_pre = true;
            }
        },
        "code" if !scan.in_pre => scan.out.push('`'),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            if closing {
                scan.out.push('\n');
            } else {
                let level = tag_name.as_bytes()[1] - b'0';
                scan.out.push('\n');
                for _ in 0..level {
                    scan.out.push('#');
                }
                scan.out.push(' ');
            }
        },
        "ul" | "ol" => scan.out.push('\n'),
        "li" => {
            if !closing {
                scan.out.push_str("\n- ");
            }
        },
        "p" | "div" | "br" | "tr" | "table" => scan.out.push('\n'),
        "td" | "th" => {
            if !closing {
                scan.out.push_str(" | ");
            }
        },
        "a" => {
            if closing {
                if let Some(href) = scan.pending_hrefs.pop() {
                    scan.out.push_str(&format!(" ({href})"));
                }
            } else if let Some(href) = extract_href(tag) {
                scan.pending_hrefs.push(absolutize(&href, base_url));
            }
        },
        _ => {},
    }
}

fn push_text(out: &mut String, text: &str, in_pre: bool) {
    let decoded = decode_entities(text);
    if in_pre {
        out.push_str(&decoded);
    } else {
        // Collapse runs of whitespace outside code blocks.
        let mut last_space = out.ends_with([' ', '\n']);
        for ch in decoded.chars() {
            if ch.is_whitespace() {
                if !last_space {
                    out.push(' ');
                    last_space = true;
                }
            } else {
                out.push(ch);
                last_space = false;
            }
        }
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

fn extract_href(tag: &str) -> Option<String> {
    let lower = tag.to_ascii_lowercase();
    let at = lower.find("href=")?;
    let value = tag[at + 5..].trim_start();
    let quote = value.chars().next()?;
    if quote == '"' || quote == '\'' {
        let inner = &value[1..];
        let end = inner.find(quote)?;
        Some(inner[..end].to_string())
    } else {
        let end = value
            .find(|c: char| c.is_whitespace() || c == '>')
            .unwrap_or(value.len());
        Some(value[..end].to_string())
    }
}

/// Rewrite a relative href to an absolute one under `base_url`.
fn absolutize(href: &str, base_url: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{base_url}{href}")
    } else {
        href.to_string()
    }
}

fn collapse_blank_lines(s: &str) -> String {
    let mut out = String::new();
    let mut last_was_empty = false;
    let mut in_fence = false;
    for line in s.lines() {
        let trimmed = if in_fence { line } else { line.trim() };
        if trimmed.starts_with("```") {
            in_fence = !in_fence;
        }
        if trimmed.is_empty() && !in_fence {
            if !last_was_empty {
                out.push('\n');
                last_was_empty = true;
            }
        } else {
            out.push_str(trimmed);
            out.push('\n');
            last_was_empty = false;
        }
    }
    out.trim().to_string()
}
