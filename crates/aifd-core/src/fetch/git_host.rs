//! Git-host adapter: raw files from GitHub at a resolved tag or branch.
//!
//! Reference resolution probes tag candidates in a fixed order, then the
//! default branches. File selection honors an explicit list verbatim
//! (every entry mandatory) or falls back to the preferred-set listing of
//! the repository tree, scoped to the configured subpath.

use std::env;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::normalize_subpath;
use crate::error::{Error, Result};
use crate::fetch::http::{status_error, HttpClient};
use crate::fetch::{select_default_files, FetchOutcome, FetchedFile};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Branches probed when no tag candidate matches the version.
const DEFAULT_BRANCHES: &[&str] = &["main", "master"];

/// A resolved git reference for a package version.
#[derive(Debug, Clone)]
pub struct ResolvedRef {
    /// Tag or branch name.
    pub git_ref: String,
    /// True when the ref is a default branch rather than a version tag.
    pub is_fallback: bool,
}

/// Fetches documentation files from a git host.
pub struct GitHostFetcher {
    http: HttpClient,
    api_base: String,
    raw_base: String,
}

impl GitHostFetcher {
    /// Production fetcher against the public GitHub endpoints. Reads an
    /// optional token from `GITHUB_TOKEN` / `GH_TOKEN`.
    pub fn new() -> Result<Self> {
        Self::with_base_urls(DEFAULT_API_BASE, DEFAULT_RAW_BASE)
    }

    /// Fetcher against custom endpoints (tests point this at a mock
    /// server).
    pub fn with_base_urls(api_base: &str, raw_base: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let token = env::var("GITHUB_TOKEN")
            .or_else(|_| env::var("GH_TOKEN"))
            .ok();
        match token {
            Some(token) => {
                if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {token}")) {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
            },
            None => warn!(
                "no GITHUB_TOKEN found; unauthenticated rate limit is 60 req/hr (5000 with a token)"
            ),
        }

        Ok(Self {
            http: HttpClient::with_headers(headers)?,
            api_base: api_base.trim_end_matches('/').to_string(),
            raw_base: raw_base.trim_end_matches('/').to_string(),
        })
    }

    /// Join percent-encoded path segments onto a base URL.
    fn build_url(base: &str, segments: &[&str]) -> Result<String> {
        let mut url = Url::parse(base).map_err(|e| Error::Other(format!("bad base URL: {e}")))?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|()| Error::Other(format!("URL cannot be a base: {base}")))?;
            for segment in segments {
                for piece in segment.split('/').filter(|p| !p.is_empty()) {
                    parts.push(piece);
                }
            }
        }
        Ok(url.to_string())
    }

    fn ref_url(&self, repo: &str, kind: &str, name: &str) -> Result<String> {
        Self::build_url(&self.api_base, &["repos", repo, "git", "ref", kind, name])
    }

    fn tree_url(&self, repo: &str, git_ref: &str) -> Result<String> {
        let url = Self::build_url(&self.api_base, &["repos", repo, "git", "trees", git_ref])?;
        Ok(format!("{url}?recursive=1"))
    }

    fn raw_url(&self, repo: &str, git_ref: &str, path: &str) -> Result<String> {
        Self::build_url(&self.raw_base, &[repo, git_ref, path])
    }

    /// Resolve the git ref for `version`: tag candidates in order, then the
    /// default branches, then [`Error::NoRef`].
    pub async fn resolve_ref(&self, repo: &str, name: &str, version: &str) -> Result<ResolvedRef> {
        let candidates = [
            format!("v{version}"),
            version.to_string(),
            format!("{name}-v{version}"),
            format!("{name}-{version}"),
        ];

        let mut tried = Vec::with_capacity(candidates.len() + DEFAULT_BRANCHES.len());

        for tag in &candidates {
            tried.push(tag.clone());
            let url = self.ref_url(repo, "tags", tag)?;
            let response = self.http.get_with_retry(&url).await?;
            if response.status().is_success() {
                debug!("resolved {repo}@{version} to tag {tag}");
                return Ok(ResolvedRef {
                    git_ref: tag.clone(),
                    is_fallback: false,
                });
            }
            if response.status() != StatusCode::NOT_FOUND {
                return Err(status_error(&url, response.status()));
            }
        }

        for branch in DEFAULT_BRANCHES {
            tried.push((*branch).to_string());
            let url = self.ref_url(repo, "heads", branch)?;
            let response = self.http.get_with_retry(&url).await?;
            if response.status().is_success() {
                debug!("no tag for {repo}@{version}; falling back to branch {branch}");
                return Ok(ResolvedRef {
                    git_ref: (*branch).to_string(),
                    is_fallback: true,
                });
            }
            if response.status() != StatusCode::NOT_FOUND {
                return Err(status_error(&url, response.status()));
            }
        }

        Err(Error::NoRef {
            repo: repo.to_string(),
            version: version.to_string(),
            tried,
        })
    }

    /// List blob paths of the repository tree at `git_ref`, recursively.
    async fn list_tree(&self, repo: &str, git_ref: &str) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Tree {
            #[serde(default)]
            tree: Vec<TreeEntry>,
        }

        #[derive(Deserialize)]
        struct TreeEntry {
            path: String,
            #[serde(rename = "type")]
            kind: String,
        }

        let url = self.tree_url(repo, git_ref)?;
        let response = self.http.get_with_retry(&url).await?;
        if !response.status().is_success() {
            return Err(status_error(&url, response.status()));
        }

        let tree: Tree = response.json().await.map_err(|e| Error::MalformedBody {
            url,
            message: e.to_string(),
        })?;

        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| entry.path)
            .collect())
    }

    /// Download one file at `path` (repo-root-relative). `required` decides
    /// whether a 404 is fatal or a silent skip.
    async fn fetch_file(
        &self,
        repo: &str,
        git_ref: &str,
        original_path: &str,
        full_path: &str,
        required: bool,
    ) -> Result<FetchedFile> {
        let url = self.raw_url(repo, git_ref, full_path)?;
        let response = self.http.get_with_retry(&url).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(if required {
                Error::FileNotFound {
                    repo: repo.to_string(),
                    path: full_path.to_string(),
                    git_ref: git_ref.to_string(),
                }
            } else {
                Error::OptionalFileNotFound(full_path.to_string())
            });
        }
        if !response.status().is_success() {
            return Err(status_error(&url, response.status()));
        }

        let bytes = response.bytes().await.map_err(|e| Error::Fetch {
            url: url.clone(),
            source: e,
        })?;

        Ok(FetchedFile {
            original_path: original_path.to_string(),
            bytes: bytes.to_vec(),
            source_url: url,
        })
    }

    /// Fetch the docs set for a package: explicit files verbatim (all
    /// mandatory), or the preferred-set selection of the tree under
    /// `subpath`.
    pub async fn fetch_docs(
        &self,
        repo: &str,
        name: &str,
        version: &str,
        subpath: Option<&str>,
        explicit_files: Option<&[String]>,
    ) -> Result<FetchOutcome> {
        let resolved = self.resolve_ref(repo, name, version).await?;
        let files = self
            .fetch_files_at(repo, &resolved, subpath, explicit_files)
            .await?;
        Ok(FetchOutcome {
            files,
            reference: resolved.git_ref,
            is_fallback: resolved.is_fallback,
        })
    }

    /// Fetch files at an already-resolved ref (hybrid mode resolves once
    /// and fetches twice).
    pub async fn fetch_files_at(
        &self,
        repo: &str,
        resolved: &ResolvedRef,
        subpath: Option<&str>,
        explicit_files: Option<&[String]>,
    ) -> Result<Vec<FetchedFile>> {
        let mut files = Vec::new();

        if let Some(explicit) = explicit_files {
            for path in explicit {
                let file = self
                    .fetch_file(repo, &resolved.git_ref, path, path, true)
                    .await?;
                files.push(file);
            }
            return Ok(files);
        }

        let scope = normalize_subpath(subpath.unwrap_or(""));
        let tree = self.list_tree(repo, &resolved.git_ref).await?;
        let selected = select_default_files(tree.iter().map(String::as_str), &scope);

        for relative in &selected {
            let full = if scope.is_empty() {
                relative.clone()
            } else {
                format!("{scope}/{relative}")
            };
            match self
                .fetch_file(repo, &resolved.git_ref, relative, &full, false)
                .await
            {
                Ok(file) => files.push(file),
                Err(Error::OptionalFileNotFound(path)) => {
                    debug!("tree listed {path} but raw fetch returned 404; skipping");
                },
                Err(other) => return Err(other),
            }
        }

        Ok(files)
    }
}
