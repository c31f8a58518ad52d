//! End-to-end sync engine tests against mock HTTP endpoints.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use aifd_core::fetch::git_host::GitHostFetcher;
use aifd_core::fetch::registry::RegistryFetcher;
use aifd_core::fetch::rendered::RenderedDocsFetcher;
use aifd_core::{
    Config, DocsStatus, Ecosystem, NullReporter, Report, SyncEngine, SyncOptions, META_FILE,
};

struct Project {
    #[allow(dead_code)]
    tmp: TempDir,
    root: PathBuf,
}

fn project_with_lock(lock_body: &str) -> Project {
    let tmp = tempfile::tempdir().expect("tempdir");
    let root = tmp.path().to_path_buf();
    std::fs::write(root.join("Cargo.lock"), lock_body).expect("write lockfile");
    Project { tmp, root }
}

fn cargo_lock(entries: &[(&str, &str)]) -> String {
    let mut out = String::from("version = 3\n");
    for (name, version) in entries {
        out.push_str(&format!(
            "\n[[package]]\nname = \"{name}\"\nversion = \"{version}\"\n"
        ));
    }
    out
}

fn engine(project: &Project, config_body: &str, api: &str, raw: &str, registry: &str) -> SyncEngine {
    let config = Config::parse(config_body, &project.root).expect("config parses");
    SyncEngine::with_fetchers(
        config,
        project.root.clone(),
        GitHostFetcher::with_base_urls(api, raw).expect("git fetcher"),
        RegistryFetcher::with_base_url(Ecosystem::Rust, registry).expect("registry fetcher"),
        RenderedDocsFetcher::with_base_url("http://rendered.invalid").expect("rendered fetcher"),
    )
}

async fn run(engine: SyncEngine, force: bool) -> Report {
    engine
        .sync(
            SyncOptions {
                force,
                mode_override: None,
            },
            Arc::new(NullReporter),
        )
        .await
        .expect("sync runs")
}

async fn mount_tag(server: &MockServer, repo: &str, tag: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/repos/{repo}/git/ref/tags/{tag}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .mount(server)
        .await;
}

async fn mount_tree(server: &MockServer, repo: &str, git_ref: &str, paths: &[&str]) {
    let entries: Vec<serde_json::Value> = paths
        .iter()
        .map(|p| serde_json::json!({"path": p, "type": "blob"}))
        .collect();
    Mock::given(method("GET"))
        .and(path(format!("/repos/{repo}/git/trees/{git_ref}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"tree": entries})))
        .mount(server)
        .await;
}

async fn mount_raw(server: &MockServer, repo: &str, git_ref: &str, file: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{repo}/{git_ref}/{file}")))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

fn gz_tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (entry_path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, entry_path, content.as_bytes())
            .expect("append tar entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

async fn mount_crates_io(server: &MockServer, name: &str, version: &str, tarball: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/crates/{name}/{version}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "version": {"num": version, "dl_path": format!("/api/v1/crates/{name}/{version}/download")}
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/crates/{name}/{version}/download")))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(tarball))
        .mount(server)
        .await;
}

fn read_meta(project: &Project, output_dir: &str, name: &str, version: &str) -> String {
    std::fs::read_to_string(
        project
            .root
            .join(output_dir)
            .join(format!("{name}@{version}"))
            .join(META_FILE),
    )
    .expect("meta readable")
}

fn git_host_config(extra: &str) -> String {
    format!(
        "[settings]\noutput_dir = \"fdocs/rust\"\n\n[packages.demo]\nrepo = \"owner/demo\"\n{extra}"
    )
}

#[tokio::test]
async fn happy_path_commits_files_summary_meta_and_index() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.0.0")]));

    mount_tag(&api, "owner/demo", "v1.0.0").await;
    mount_tree(&api, "owner/demo", "v1.0.0", &["README.md", "src/lib.rs"]).await;
    mount_raw(&raw, "owner/demo", "v1.0.0", "README.md", "# demo docs\n").await;

    let report = run(
        engine(&project, &git_host_config(""), &api.uri(), &raw.uri(), "http://reg.invalid"),
        false,
    )
    .await;

    assert_eq!(report.summary.total, 1);
    assert_eq!(report.summary.synced, 1);
    assert!(report.all_synced());
    assert_eq!(report.sync.unwrap().synced, 1);

    let dir = project.root.join("fdocs/rust/demo@1.0.0");
    let readme = std::fs::read_to_string(dir.join("README.md")).unwrap();
    assert!(readme.contains("# demo docs"));
    assert!(readme.starts_with("<!-- aifd: source=github.com/owner/demo ref=v1.0.0"));
    assert!(dir.join("_SUMMARY.md").is_file());

    let meta = read_meta(&project, "fdocs/rust", "demo", "1.0.0");
    assert!(meta.contains("schema_version = 2"));
    assert!(meta.contains("version = \"1.0.0\""));
    assert!(meta.contains("git_ref = \"v1.0.0\""));
    assert!(meta.contains("config_hash = "));

    let index = std::fs::read_to_string(project.root.join("fdocs/rust/_INDEX.md")).unwrap();
    assert!(index.contains("demo@1.0.0"));
}

#[tokio::test]
async fn second_sync_is_a_full_cache_hit_even_after_notes_change() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.0.0")]));

    mount_tag(&api, "owner/demo", "v1.0.0").await;
    mount_tree(&api, "owner/demo", "v1.0.0", &["README.md"]).await;
    mount_raw(&raw, "owner/demo", "v1.0.0", "README.md", "# demo\n").await;

    let config_v1 = git_host_config("ai_notes = \"v1\"\n");
    run(
        engine(&project, &config_v1, &api.uri(), &raw.uri(), "http://reg.invalid"),
        false,
    )
    .await;

    let index_before =
        std::fs::read_to_string(project.root.join("fdocs/rust/_INDEX.md")).unwrap();

    // Only the notes change; every endpoint is now unreachable, so any
    // HTTP request would fail the run.
    let config_v2 = git_host_config("ai_notes = \"v2\"\n");
    let report = run(
        engine(
            &project,
            &config_v2,
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
        ),
        false,
    )
    .await;

    let counters = report.sync.unwrap();
    assert_eq!(counters.cached, 1, "notes change must not invalidate the cache");
    assert_eq!(counters.synced, 0);
    assert_eq!(counters.errors, 0);

    let index_after = std::fs::read_to_string(project.root.join("fdocs/rust/_INDEX.md")).unwrap();
    assert_eq!(index_before, index_after);
}

#[tokio::test]
async fn git_host_rate_limit_falls_back_to_registry_archive() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let registry = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.0.0")]));

    mount_tag(&api, "owner/demo", "v1.0.0").await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/demo/git/trees/v1.0.0"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&api)
        .await;
    mount_crates_io(
        &registry,
        "demo",
        "1.0.0",
        gz_tarball(&[("demo-1.0.0/README.md", "# from the archive\n")]),
    )
    .await;

    let report = run(
        engine(&project, &git_host_config(""), &api.uri(), &raw.uri(), &registry.uri()),
        false,
    )
    .await;

    // The fallback absorbed the rate limit: the package is synced and the
    // histogram stays empty, but the transition is visible per adapter.
    assert!(report.all_synced());
    assert_eq!(report.statuses[0].status, DocsStatus::SyncedFallback);
    assert!(report.error_codes.is_empty());
    assert_eq!(report.source_stats["registry_archive"].synced, 1);
    assert_eq!(report.source_stats["git_host"].synced, 0);
    assert_eq!(report.source_stats["git_host"].errors, 1);

    let meta = read_meta(&project, "fdocs/rust", "demo", "1.0.0");
    assert!(meta.contains("git_ref = \"registry-archive\""));
    assert!(meta.contains("is_fallback = true"));
}

#[tokio::test]
async fn both_sources_failing_marks_the_package_missing() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let registry = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.0.0")]));

    mount_tag(&api, "owner/demo", "v1.0.0").await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/demo/git/trees/v1.0.0"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/crates/demo/1.0.0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&registry)
        .await;

    let report = run(
        engine(&project, &git_host_config(""), &api.uri(), &raw.uri(), &registry.uri()),
        false,
    )
    .await;

    assert!(!report.all_synced());
    assert_eq!(report.statuses[0].status, DocsStatus::Missing);
    assert_eq!(report.statuses[0].reason_code, "lockfile_missing");
    assert_eq!(report.error_codes["RATE_LIMIT"], 1);
    assert!(report.error_codes.contains_key("TARBALL_NOT_FOUND"));
    assert!(!project.root.join("fdocs/rust/demo@1.0.0").exists());
}

#[tokio::test]
async fn changelog_is_trimmed_to_the_minor_window() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "0.13.1")]));

    let changelog = "# Changelog\n\n## [0.13.1]\n- fix\n\n## [0.13.0]\n- feat\n\n## [0.12.0]\n- old\n\n## [0.11.0]\n- ancient\n";

    mount_tag(&api, "owner/demo", "v0.13.1").await;
    mount_tree(&api, "owner/demo", "v0.13.1", &["README.md", "CHANGELOG.md"]).await;
    mount_raw(&raw, "owner/demo", "v0.13.1", "README.md", "# demo\n").await;
    mount_raw(&raw, "owner/demo", "v0.13.1", "CHANGELOG.md", changelog).await;

    run(
        engine(&project, &git_host_config(""), &api.uri(), &raw.uri(), "http://reg.invalid"),
        false,
    )
    .await;

    let persisted = std::fs::read_to_string(
        project.root.join("fdocs/rust/demo@0.13.1/CHANGELOG.md"),
    )
    .unwrap();
    assert!(persisted.contains("0.13.1"));
    assert!(persisted.contains("0.13.0"));
    assert!(persisted.contains("0.12.0"));
    assert!(!persisted.contains("0.11.0"));
    assert!(persisted.contains("[Earlier entries truncated by aifd]"));
}

#[tokio::test]
async fn partial_failure_is_best_effort() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let registry = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("alpha", "1.0.0"), ("beta", "2.0.0")]));

    // alpha: rate-limited everywhere.
    mount_tag(&api, "owner/alpha", "v1.0.0").await;
    Mock::given(method("GET"))
        .and(path("/repos/owner/alpha/git/trees/v1.0.0"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&api)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/crates/alpha/1.0.0"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&registry)
        .await;

    // beta: healthy.
    mount_tag(&api, "owner/beta", "v2.0.0").await;
    mount_tree(&api, "owner/beta", "v2.0.0", &["README.md"]).await;
    mount_raw(&raw, "owner/beta", "v2.0.0", "README.md", "# beta\n").await;

    let config = "[packages.alpha]\nrepo = \"owner/alpha\"\n\n[packages.beta]\nrepo = \"owner/beta\"\n";
    let report = run(engine(&project, config, &api.uri(), &raw.uri(), &registry.uri()), false).await;

    assert_eq!(report.statuses.len(), 2);
    assert_eq!(report.statuses[0].name, "alpha");
    assert_eq!(report.statuses[0].status, DocsStatus::Missing);
    assert_eq!(report.statuses[1].name, "beta");
    assert_eq!(report.statuses[1].status, DocsStatus::Synced);

    let index = std::fs::read_to_string(project.root.join("fdocs/rust/_INDEX.md")).unwrap();
    assert!(index.contains("beta@2.0.0"));
    assert!(!index.contains("alpha@"));
}

#[tokio::test]
async fn prune_removes_stale_versions_before_syncing() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.1.0")]));

    // Previously synced 1.0.0 sits on disk.
    let stale = project.root.join("fdocs/rust/demo@1.0.0");
    std::fs::create_dir_all(&stale).unwrap();
    std::fs::write(
        stale.join(META_FILE),
        "schema_version = 2\nversion = \"1.0.0\"\ngit_ref = \"v1.0.0\"\nfetched_at = \"2026-07-01\"\n",
    )
    .unwrap();

    mount_tag(&api, "owner/demo", "v1.1.0").await;
    mount_tree(&api, "owner/demo", "v1.1.0", &["README.md"]).await;
    mount_raw(&raw, "owner/demo", "v1.1.0", "README.md", "# demo 1.1\n").await;

    run(
        engine(&project, &git_host_config(""), &api.uri(), &raw.uri(), "http://reg.invalid"),
        false,
    )
    .await;

    assert!(!stale.exists(), "stale version must be pruned");
    assert!(project.root.join("fdocs/rust/demo@1.1.0").is_dir());
}

#[tokio::test]
async fn concurrency_one_and_fifty_produce_identical_trees() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;

    for (name, version) in [("alpha", "1.0.0"), ("beta", "2.0.0"), ("gamma", "3.0.0")] {
        let repo = format!("owner/{name}");
        mount_tag(&api, &repo, &format!("v{version}")).await;
        mount_tree(&api, &repo, &format!("v{version}"), &["README.md"]).await;
        mount_raw(&raw, &repo, &format!("v{version}"), "README.md", &format!("# {name}\n")).await;
    }

    let lock = cargo_lock(&[("alpha", "1.0.0"), ("beta", "2.0.0"), ("gamma", "3.0.0")]);
    let packages =
        "[packages.alpha]\nrepo = \"owner/alpha\"\n\n[packages.beta]\nrepo = \"owner/beta\"\n\n[packages.gamma]\nrepo = \"owner/gamma\"\n";

    let mut trees = Vec::new();
    for concurrency in [1, 50] {
        let project = project_with_lock(&lock);
        let config = format!("[settings]\nsync_concurrency = {concurrency}\n\n{packages}");
        run(
            engine(&project, &config, &api.uri(), &raw.uri(), "http://reg.invalid"),
            false,
        )
        .await;
        trees.push(snapshot_tree(&project.root.join("fdocs/rust")));
    }

    assert_eq!(trees[0], trees[1]);
}

fn snapshot_tree(root: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir).unwrap().flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(root).unwrap().to_string_lossy().into_owned();
                files.push((rel, std::fs::read(&path).unwrap()));
            }
        }
    }
    files.sort();
    files
}

#[tokio::test]
async fn registry_archive_primary_has_no_automatic_fallback() {
    let registry = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.0.0")]));

    Mock::given(method("GET"))
        .and(path("/api/v1/crates/demo/1.0.0"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&registry)
        .await;

    let config = "[settings]\ndocs_source = \"registry_archive\"\n\n[packages.demo]\nrepo = \"owner/demo\"\n";
    let report = run(
        engine(
            &project,
            config,
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            &registry.uri(),
        ),
        false,
    )
    .await;

    assert_eq!(report.statuses[0].status, DocsStatus::Missing);
    assert!(report.error_codes.contains_key("TARBALL_NOT_FOUND"));
}

const RENDERED_PAGE: &str = r#"<html><head><title>demo - Rust</title></head><body>
<div id="main-content"><h1>Crate demo</h1><p>Demo docs.</p><pre>use demo;</pre></div>
<a href="/demo/1.0.0/demo/">demo</a>
</body></html>"#;

fn latest_engine(project: &Project, registry: &str, rendered: &str, git_api: &str, git_raw: &str) -> SyncEngine {
    let config = Config::parse(
        "[settings]\nsync_mode = \"latest_docs\"\noutput_dir = \"fdocs/rust\"\n\n[packages.demo]\nrepo = \"owner/demo\"\n",
        &project.root,
    )
    .expect("config parses");
    SyncEngine::with_fetchers(
        config,
        project.root.clone(),
        GitHostFetcher::with_base_urls(git_api, git_raw).expect("git fetcher"),
        RegistryFetcher::with_base_url(Ecosystem::Rust, registry).expect("registry fetcher"),
        RenderedDocsFetcher::with_base_url(rendered).expect("rendered fetcher"),
    )
}

async fn mount_latest_version(server: &MockServer, name: &str, version: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/crates/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "crate": {"max_stable_version": version, "max_version": version}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn latest_docs_syncs_renders_and_honors_ttl() {
    let registry = MockServer::start().await;
    let rendered = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let project = Project {
        root: tmp.path().to_path_buf(),
        tmp,
    };

    mount_latest_version(&registry, "demo", "1.0.0").await;
    Mock::given(method("GET"))
        .and(path("/crate/demo/1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RENDERED_PAGE))
        .mount(&rendered)
        .await;

    // First run: full rendered sync.
    let report = run(
        latest_engine(&project, &registry.uri(), &rendered.uri(), "http://127.0.0.1:9", "http://127.0.0.1:9"),
        false,
    )
    .await;
    assert_eq!(report.sync.unwrap().synced, 1);
    assert_eq!(report.statuses[0].reason_code, "latest_ok_rendered");

    let dir = project.root.join("fdocs/rust/demo@1.0.0");
    let api_md = std::fs::read_to_string(dir.join("API.md")).unwrap();
    assert!(api_md.contains("# demo@1.0.0"));
    assert!(api_md.contains("## API Reference"));

    let meta = read_meta(&project, "fdocs/rust", "demo", "1.0.0");
    assert!(meta.contains("sync_mode = \"latest_docs\""));
    assert!(meta.contains("source_kind = \"rendered\""));
    assert!(meta.contains("ttl_expires_at = "));
    assert!(meta.contains("artifact_sha256 = "));

    // Second run within the TTL: cache hit, every endpoint unreachable.
    let report = run(
        latest_engine(
            &project,
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
            "http://127.0.0.1:9",
        ),
        false,
    )
    .await;
    assert_eq!(report.sync.unwrap().cached, 1);
    assert_eq!(report.statuses[0].reason_code, "latest_cache_hit_ttl");

    // Expire the TTL by hand, move upstream to 1.1.0: full refresh.
    let meta_path = dir.join(META_FILE);
    let expired = std::fs::read_to_string(&meta_path)
        .unwrap()
        .lines()
        .map(|line| {
            if line.starts_with("ttl_expires_at") {
                "ttl_expires_at = \"2020-01-01T00:00:00+00:00\"".to_string()
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(&meta_path, expired).unwrap();

    let registry2 = MockServer::start().await;
    let rendered2 = MockServer::start().await;
    mount_latest_version(&registry2, "demo", "1.1.0").await;
    Mock::given(method("GET"))
        .and(path("/crate/demo/1.1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(RENDERED_PAGE.replace("1.0.0", "1.1.0")))
        .mount(&rendered2)
        .await;

    let report = run(
        latest_engine(&project, &registry2.uri(), &rendered2.uri(), "http://127.0.0.1:9", "http://127.0.0.1:9"),
        false,
    )
    .await;
    assert_eq!(report.sync.unwrap().synced, 1);
    let meta = read_meta(&project, "fdocs/rust", "demo", "1.1.0");
    assert!(meta.contains("upstream_latest_version = \"1.1.0\""));
}

#[tokio::test]
async fn degraded_rendered_docs_fall_back_to_the_git_host() {
    let registry = MockServer::start().await;
    let rendered = MockServer::start().await;
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let tmp = tempfile::tempdir().expect("tempdir");
    let project = Project {
        root: tmp.path().to_path_buf(),
        tmp,
    };

    mount_latest_version(&registry, "demo", "1.0.0").await;
    // Page parses but has no article body and no module links.
    Mock::given(method("GET"))
        .and(path("/crate/demo/1.0.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>nothing</body></html>"))
        .mount(&rendered)
        .await;
    mount_tag(&api, "owner/demo", "v1.0.0").await;
    mount_tree(&api, "owner/demo", "v1.0.0", &["README.md"]).await;
    mount_raw(&raw, "owner/demo", "v1.0.0", "README.md", "# demo\n").await;

    let report = run(
        latest_engine(&project, &registry.uri(), &rendered.uri(), &api.uri(), &raw.uri()),
        false,
    )
    .await;

    assert_eq!(report.statuses[0].status, DocsStatus::SyncedFallback);
    assert_eq!(report.statuses[0].reason_code, "latest_ok_fallback");
    let meta = read_meta(&project, "fdocs/rust", "demo", "1.0.0");
    assert!(meta.contains("source_kind = \"git_fallback\""));
}

#[tokio::test]
async fn hybrid_mode_mixes_archive_docs_with_git_changelog() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let registry = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.0.0")]));

    mount_crates_io(
        &registry,
        "demo",
        "1.0.0",
        gz_tarball(&[("demo-1.0.0/README.md", "# archive readme\n")]),
    )
    .await;
    mount_tag(&api, "owner/demo", "v1.0.0").await;
    mount_tree(&api, "owner/demo", "v1.0.0", &["README.md", "CHANGELOG.md"]).await;
    mount_raw(&raw, "owner/demo", "v1.0.0", "README.md", "# git readme\n").await;
    mount_raw(&raw, "owner/demo", "v1.0.0", "CHANGELOG.md", "## 1.0.0\n- first\n").await;

    let config = "[settings]\nsync_mode = \"hybrid\"\n\n[packages.demo]\nrepo = \"owner/demo\"\n";
    let report = run(engine(&project, config, &api.uri(), &raw.uri(), &registry.uri()), false).await;

    assert!(report.all_synced());
    let dir = project.root.join("fdocs/rust/demo@1.0.0");
    let readme = std::fs::read_to_string(dir.join("README.md")).unwrap();
    assert!(readme.contains("# archive readme"), "README must come from the archive");
    let changelog = std::fs::read_to_string(dir.join("CHANGELOG.md")).unwrap();
    assert!(changelog.contains("- first"), "changelog must come from the git host");

    let meta = read_meta(&project, "fdocs/rust", "demo", "1.0.0");
    assert!(meta.contains("source_kind = \"mixed\""));
}

#[tokio::test]
async fn force_refetches_despite_valid_cache() {
    let api = MockServer::start().await;
    let raw = MockServer::start().await;
    let project = project_with_lock(&cargo_lock(&[("demo", "1.0.0")]));

    mount_tag(&api, "owner/demo", "v1.0.0").await;
    mount_tree(&api, "owner/demo", "v1.0.0", &["README.md"]).await;
    mount_raw(&raw, "owner/demo", "v1.0.0", "README.md", "# demo\n").await;

    let config = git_host_config("");
    run(engine(&project, &config, &api.uri(), &raw.uri(), "http://reg.invalid"), false).await;
    let report = run(
        engine(&project, &config, &api.uri(), &raw.uri(), "http://reg.invalid"),
        true,
    )
    .await;

    let counters = report.sync.unwrap();
    assert_eq!(counters.synced, 1, "--force must bypass the cache");
    assert_eq!(counters.cached, 0);
}
