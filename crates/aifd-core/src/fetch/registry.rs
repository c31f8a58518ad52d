//! Registry-archive adapter: docs straight out of the published package
//! archive.
//!
//! The version metadata endpoint yields the archive URL (and, on npm, an
//! inline README that lets the common single-file case skip the download
//! entirely). The archive is gunzipped and walked in memory; entries with
//! absolute or parent-traversing paths are discarded. The resolved
//! reference is always the [`REGISTRY_ARCHIVE_REF`] sentinel.

use std::collections::BTreeMap;
use std::io::Read;

use flate2::read::GzDecoder;
use reqwest::StatusCode;
use tar::Archive;
use tracing::{debug, warn};
use url::Url;

use crate::config::{normalize_subpath, Ecosystem};
use crate::error::{Error, Result};
use crate::fetch::http::{status_error, HttpClient};
use crate::fetch::{
    is_default_selected, scoped_relative, FetchOutcome, FetchedFile, MAX_DEFAULT_FILES,
};
use crate::meta::REGISTRY_ARCHIVE_REF;

const CRATES_IO_BASE: &str = "https://crates.io";
const NPM_REGISTRY_BASE: &str = "https://registry.npmjs.org";

/// Version metadata needed to reach the archive.
#[derive(Debug)]
struct VersionMetadata {
    tarball_url: String,
    /// README text carried inline by the registry body, when present.
    inline_readme: Option<String>,
}

/// Fetches docs from the package registry (crates.io or npm).
pub struct RegistryFetcher {
    http: HttpClient,
    ecosystem: Ecosystem,
    base_url: String,
}

impl RegistryFetcher {
    /// Production fetcher against the ecosystem's public registry.
    pub fn new(ecosystem: Ecosystem) -> Result<Self> {
        let base = match ecosystem {
            Ecosystem::Rust => CRATES_IO_BASE,
            Ecosystem::Node => NPM_REGISTRY_BASE,
        };
        Self::with_base_url(ecosystem, base)
    }

    /// Fetcher against a custom registry endpoint (tests point this at a
    /// mock server).
    pub fn with_base_url(ecosystem: Ecosystem, base_url: &str) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
            ecosystem,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, segments: &[&str]) -> Result<String> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Other(format!("bad registry base URL: {e}")))?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|()| Error::Other(format!("URL cannot be a base: {}", self.base_url)))?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url.to_string())
    }

    async fn get_json(&self, url: &str) -> Result<serde_json::Value> {
        let response = self.http.get_with_retry(url).await?;
        if !response.status().is_success() {
            return Err(status_error(url, response.status()));
        }
        response.json().await.map_err(|e| Error::MalformedBody {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    /// Resolve the latest published version: `max_stable_version` with a
    /// `max_version` fallback on crates.io, `dist-tags.latest` on npm.
    /// Prereleases are never selected here.
    pub async fn resolve_latest(&self, name: &str) -> Result<String> {
        match self.ecosystem {
            Ecosystem::Rust => {
                let url = self.build_url(&["api", "v1", "crates", name])?;
                let body = self.get_json(&url).await?;
                body.pointer("/crate/max_stable_version")
                    .and_then(|v| v.as_str())
                    .filter(|v| !v.trim().is_empty())
                    .or_else(|| body.pointer("/crate/max_version").and_then(|v| v.as_str()))
                    .map(str::to_string)
                    .ok_or_else(|| Error::MalformedBody {
                        url,
                        message: format!("registry response for '{name}' has no max version"),
                    })
            },
            Ecosystem::Node => {
                let url = self.build_url(&[name])?;
                let body = self.get_json(&url).await?;
                body.pointer("/dist-tags/latest")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| Error::MalformedBody {
                        url,
                        message: format!("registry response for '{name}' has no latest dist-tag"),
                    })
            },
        }
    }

    /// Repository (or homepage) URL the registry records for a package.
    /// Used by config bootstrap to infer `owner/name`.
    pub async fn resolve_repository(&self, name: &str) -> Result<Option<String>> {
        match self.ecosystem {
            Ecosystem::Rust => {
                let url = self.build_url(&["api", "v1", "crates", name])?;
                let body = self.get_json(&url).await?;
                Ok(body
                    .pointer("/crate/repository")
                    .and_then(|v| v.as_str())
                    .or_else(|| body.pointer("/crate/homepage").and_then(|v| v.as_str()))
                    .map(str::to_string))
            },
            Ecosystem::Node => {
                let url = self.build_url(&[name])?;
                let body = self.get_json(&url).await?;
                Ok(body
                    .pointer("/repository/url")
                    .and_then(|v| v.as_str())
                    .or_else(|| body.get("repository").and_then(|v| v.as_str()))
                    .or_else(|| body.get("homepage").and_then(|v| v.as_str()))
                    .map(str::to_string))
            },
        }
    }

    /// Fetch version metadata; a 404 means the registry has no archive for
    /// this version.
    async fn version_metadata(&self, name: &str, version: &str) -> Result<VersionMetadata> {
        match self.ecosystem {
            Ecosystem::Rust => {
                let url = self.build_url(&["api", "v1", "crates", name, version])?;
                let response = self.http.get_with_retry(&url).await?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Err(Error::TarballNotFound {
                        name: name.to_string(),
                        version: version.to_string(),
                    });
                }
                if !response.status().is_success() {
                    return Err(status_error(&url, response.status()));
                }
                let body: serde_json::Value =
                    response.json().await.map_err(|e| Error::MalformedBody {
                        url: url.clone(),
                        message: e.to_string(),
                    })?;
                let dl_path = body
                    .pointer("/version/dl_path")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        format!("/api/v1/crates/{name}/{version}/download")
                    });
                Ok(VersionMetadata {
                    tarball_url: format!("{}{dl_path}", self.base_url),
                    inline_readme: None,
                })
            },
            Ecosystem::Node => {
                let url = self.build_url(&[name])?;
                let response = self.http.get_with_retry(&url).await?;
                if response.status() == StatusCode::NOT_FOUND {
                    return Err(Error::TarballNotFound {
                        name: name.to_string(),
                        version: version.to_string(),
                    });
                }
                if !response.status().is_success() {
                    return Err(status_error(&url, response.status()));
                }
                let body: serde_json::Value =
                    response.json().await.map_err(|e| Error::MalformedBody {
                        url: url.clone(),
                        message: e.to_string(),
                    })?;
                let tarball_url = body
                    .pointer(&format!("/versions/{version}/dist/tarball"))
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| Error::TarballNotFound {
                        name: name.to_string(),
                        version: version.to_string(),
                    })?;
                let inline_readme = body
                    .get("readme")
                    .and_then(|v| v.as_str())
                    .filter(|readme| !readme.trim().is_empty())
                    .map(str::to_string);
                Ok(VersionMetadata {
                    tarball_url,
                    inline_readme,
                })
            },
        }
    }

    /// Fetch the docs set from the published archive. Explicit files are
    /// matched verbatim against archive-relative paths and are all
    /// mandatory; otherwise the preferred-set filter applies under
    /// `subpath`.
    pub async fn fetch_archive_docs(
        &self,
        name: &str,
        version: &str,
        subpath: Option<&str>,
        explicit_files: Option<&[String]>,
    ) -> Result<FetchOutcome> {
        let metadata = self.version_metadata(name, version).await?;

        // Fast path: the registry body already carries the README and the
        // README is all that was asked for.
        if let Some(readme) = metadata.inline_readme.as_deref() {
            if wants_only_readme(explicit_files) {
                debug!("serving {name}@{version} README inline from registry metadata");
                let original_path = explicit_files
                    .and_then(|files| files.first().cloned())
                    .unwrap_or_else(|| "README.md".to_string());
                return Ok(FetchOutcome {
                    files: vec![FetchedFile {
                        original_path,
                        bytes: readme.as_bytes().to_vec(),
                        source_url: self.build_url(&[name])?,
                    }],
                    reference: REGISTRY_ARCHIVE_REF.to_string(),
                    is_fallback: false,
                });
            }
        }

        let response = self.http.get_with_retry(&metadata.tarball_url).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::TarballNotFound {
                name: name.to_string(),
                version: version.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(status_error(&metadata.tarball_url, response.status()));
        }
        let bytes = response.bytes().await.map_err(|e| Error::Fetch {
            url: metadata.tarball_url.clone(),
            source: e,
        })?;

        let files = extract_docs_from_tarball(
            &bytes,
            &metadata.tarball_url,
            name,
            subpath.unwrap_or(""),
            explicit_files,
        )?;

        Ok(FetchOutcome {
            files,
            reference: REGISTRY_ARCHIVE_REF.to_string(),
            is_fallback: false,
        })
    }
}

/// Whether the request boils down to a single README.
fn wants_only_readme(explicit_files: Option<&[String]>) -> bool {
    match explicit_files {
        Some([only]) => {
            let lower = only.to_ascii_lowercase();
            lower == "readme.md" || lower == "readme"
        },
        _ => false,
    }
}

/// Walk a gzipped tar archive in memory and pull out the docs selection.
///
/// The leading archive component (`{name}-{version}/` on crates.io,
/// `package/` on npm) is stripped before matching. Entries whose stripped
/// path is absolute or escapes upward are dropped.
fn extract_docs_from_tarball(
    gz_bytes: &[u8],
    tarball_url: &str,
    name: &str,
    subpath: &str,
    explicit_files: Option<&[String]>,
) -> Result<Vec<FetchedFile>> {
    let scope = normalize_subpath(subpath);
    let mut archive = Archive::new(GzDecoder::new(gz_bytes));

    // archive path (relative, prefix-stripped) -> (source path, bytes)
    let mut matched: BTreeMap<String, (String, Vec<u8>)> = BTreeMap::new();

    let entries = archive.entries().map_err(|e| Error::ArchiveMalformed {
        name: name.to_string(),
        message: e.to_string(),
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| Error::ArchiveMalformed {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let raw_path = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        if raw_path.starts_with('/') || raw_path.split('/').any(|c| c == "..") {
            warn!("skipping unsafe archive entry: {raw_path}");
            continue;
        }

        // Drop the single top-level component the registry wraps entries in.
        let Some((_, inner)) = raw_path.split_once('/') else {
            continue;
        };
        if inner.is_empty() {
            continue;
        }

        let keep = match explicit_files {
            Some(files) => files.iter().any(|f| f == inner),
            None => scoped_relative(inner, &scope)
                .is_some_and(|relative| is_default_selected(&relative)),
        };
        if !keep {
            continue;
        }

        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| Error::ArchiveMalformed {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let relative = match explicit_files {
            Some(_) => inner.to_string(),
            None => scoped_relative(inner, &scope).unwrap_or_else(|| inner.to_string()),
        };
        matched
            .entry(relative)
            .or_insert_with(|| (format!("{tarball_url}#{raw_path}"), bytes));
    }

    if let Some(files) = explicit_files {
        for wanted in files {
            if !matched.contains_key(wanted) {
                return Err(Error::FileNotFound {
                    repo: name.to_string(),
                    path: wanted.clone(),
                    git_ref: REGISTRY_ARCHIVE_REF.to_string(),
                });
            }
        }
        // Preserve the user's ordering.
        return Ok(files
            .iter()
            .filter_map(|path| {
                matched.remove(path).map(|(source_url, bytes)| FetchedFile {
                    original_path: path.clone(),
                    bytes,
                    source_url,
                })
            })
            .collect());
    }

    // BTreeMap iteration is already lexicographic; apply the default cap.
    Ok(matched
        .into_iter()
        .take(MAX_DEFAULT_FILES)
        .map(|(path, (source_url, bytes))| FetchedFile {
            original_path: path,
            bytes,
            source_url,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
        for (entry_path, content) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder
                .append_data(&mut header, entry_path, content.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn extracts_preferred_files_and_skips_the_rest() {
        let gz = tarball(&[
            ("serde-1.0.0/README.md", "# serde"),
            ("serde-1.0.0/CHANGELOG.md", "## 1.0.0"),
            ("serde-1.0.0/src/lib.rs", "pub fn x() {}"),
            ("serde-1.0.0/docs/derive.md", "derive docs"),
        ]);

        let files = extract_docs_from_tarball(&gz, "http://t", "serde", "", None).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.original_path.as_str()).collect();
        assert_eq!(paths, vec!["CHANGELOG.md", "README.md", "docs/derive.md"]);
        assert_eq!(files[1].bytes, b"# serde");
    }

    // tar::Builder validates paths, so the traversal entry is written
    // through the raw header name field the way a hostile archive would.
    fn tarball_with_raw_name(raw_name: &str, content: &str, safe: (&str, &str)) -> Vec<u8> {
        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));

        let mut header = tar::Header::new_old();
        {
            let name_field = &mut header.as_old_mut().name;
            name_field[..raw_name.len()].copy_from_slice(raw_name.as_bytes());
        }
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, content.as_bytes()).unwrap();

        let (safe_path, safe_content) = safe;
        let mut safe_header = tar::Header::new_gnu();
        safe_header.set_size(safe_content.len() as u64);
        safe_header.set_mode(0o644);
        safe_header.set_cksum();
        builder
            .append_data(&mut safe_header, safe_path, safe_content.as_bytes())
            .unwrap();

        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn rejects_traversal_entries() {
        let gz = tarball_with_raw_name("pkg/../../evil.md", "evil", ("pkg/README.md", "# ok"));
        let files = extract_docs_from_tarball(&gz, "http://t", "pkg", "", None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].original_path, "README.md");
    }

    #[test]
    fn explicit_files_keep_user_order_and_are_mandatory() {
        let gz = tarball(&[
            ("package/docs/b.md", "b"),
            ("package/docs/a.md", "a"),
        ]);

        let wanted = vec!["docs/b.md".to_string(), "docs/a.md".to_string()];
        let files =
            extract_docs_from_tarball(&gz, "http://t", "pkg", "", Some(&wanted)).unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.original_path.as_str()).collect();
        assert_eq!(paths, vec!["docs/b.md", "docs/a.md"]);

        let missing = vec!["docs/nope.md".to_string()];
        let err =
            extract_docs_from_tarball(&gz, "http://t", "pkg", "", Some(&missing)).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }

    #[test]
    fn garbage_bytes_are_a_malformed_archive() {
        let err = extract_docs_from_tarball(b"not a tarball", "http://t", "pkg", "", None)
            .unwrap_err();
        assert!(matches!(err, Error::ArchiveMalformed { .. }));
    }

    #[tokio::test]
    async fn crates_io_flow_downloads_and_extracts() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let meta = serde_json::json!({
            "version": { "num": "1.0.0", "dl_path": "/api/v1/crates/demo/1.0.0/download" }
        });
        Mock::given(method("GET"))
            .and(path("/api/v1/crates/demo/1.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&meta))
            .mount(&server)
            .await;
        let gz = tarball(&[("demo-1.0.0/README.md", "# demo")]);
        Mock::given(method("GET"))
            .and(path("/api/v1/crates/demo/1.0.0/download"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(gz))
            .mount(&server)
            .await;

        let fetcher = RegistryFetcher::with_base_url(Ecosystem::Rust, &server.uri())?;
        let outcome = fetcher.fetch_archive_docs("demo", "1.0.0", None, None).await?;
        assert_eq!(outcome.reference, REGISTRY_ARCHIVE_REF);
        assert!(!outcome.is_fallback);
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].bytes, b"# demo");
        Ok(())
    }

    #[tokio::test]
    async fn missing_version_is_tarball_not_found() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/crates/demo/9.9.9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let fetcher = RegistryFetcher::with_base_url(Ecosystem::Rust, &server.uri())?;
        let err = fetcher
            .fetch_archive_docs("demo", "9.9.9", None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TarballNotFound { .. }));
        assert!(err.is_fallback_eligible());
        Ok(())
    }

    #[tokio::test]
    async fn npm_inline_readme_fast_path_skips_the_tarball() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let meta = serde_json::json!({
            "dist-tags": { "latest": "4.17.21" },
            "readme": "# lodash readme",
            "versions": {
                "4.17.21": { "dist": { "tarball": "http://unused.invalid/x.tgz" } }
            }
        });
        Mock::given(method("GET"))
            .and(path("/lodash"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&meta))
            .mount(&server)
            .await;

        let fetcher = RegistryFetcher::with_base_url(Ecosystem::Node, &server.uri())?;
        let wanted = vec!["README.md".to_string()];
        let outcome = fetcher
            .fetch_archive_docs("lodash", "4.17.21", None, Some(&wanted))
            .await?;
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].bytes, b"# lodash readme");
        Ok(())
    }

    #[tokio::test]
    async fn resolves_latest_versions_per_ecosystem() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let crates_body = serde_json::json!({
            "crate": { "max_stable_version": "1.0.219", "max_version": "1.0.220-rc1" }
        });
        Mock::given(method("GET"))
            .and(path("/api/v1/crates/serde"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&crates_body))
            .mount(&server)
            .await;
        let npm_body = serde_json::json!({ "dist-tags": { "latest": "18.2.0" } });
        Mock::given(method("GET"))
            .and(path("/react"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&npm_body))
            .mount(&server)
            .await;

        let rust = RegistryFetcher::with_base_url(Ecosystem::Rust, &server.uri())?;
        assert_eq!(rust.resolve_latest("serde").await?, "1.0.219");

        let node = RegistryFetcher::with_base_url(Ecosystem::Node, &server.uri())?;
        assert_eq!(node.resolve_latest("react").await?, "18.2.0");
        Ok(())
    }
}
