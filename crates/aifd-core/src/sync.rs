//! The sync orchestrator: drive every configured package through its state
//! machine concurrently, commit artifacts atomically, and emit the report.
//!
//! Jobs are independent; the only join point is the barrier before the
//! global index is rewritten. A package job that fails is classified and
//! reported, never allowed to abort its peers. All user-visible output
//! flows through the [`Reporter`] sink, keeping the engine silent and
//! testable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

use crate::cache::{self, CacheDecision};
use crate::changelog::is_changelog_path;
use crate::config::{Config, DocsSource, Ecosystem, PackageDoc, SyncMode};
use crate::error::{Error, ErrorCode, Result};
use crate::fetch::git_host::GitHostFetcher;
use crate::fetch::registry::RegistryFetcher;
use crate::fetch::rendered::RenderedDocsFetcher;
use crate::fetch::{AdapterKind, FetchOutcome, FetchedFile};
use crate::index::{render_summary, write_index};
use crate::lockfile::{resolve_lock_versions, VersionMap};
use crate::meta::{source_kind, PackageMeta, REGISTRY_ARCHIVE_REF, SCHEMA_VERSION};
use crate::report::{reason_code, DocsStatus, PackageStatus, Report, Summary, SyncCounters};
use crate::storage::{self, SavedPackage};
use crate::transform::{transform_file, TransformContext, TransformedFile};

/// Options for one sync invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Ignore the cache and re-fetch everything.
    pub force: bool,
    /// Override the configured sync mode.
    pub mode_override: Option<SyncMode>,
}

/// Progress events, in the order a package experiences them.
#[derive(Debug)]
pub enum SyncEvent<'a> {
    /// A stale directory was removed before scheduling.
    Pruned { name: &'a str },
    /// Cache hit; no network traffic for this package.
    CacheHit { name: &'a str, version: &'a str },
    /// Remote work started.
    Syncing { name: &'a str, version: &'a str },
    /// The primary adapter failed and the chain moved on.
    FallbackEngaged {
        name: &'a str,
        from: AdapterKind,
        to: AdapterKind,
        reason: &'a str,
    },
    /// Artifacts committed.
    Synced {
        name: &'a str,
        version: &'a str,
        fallback: bool,
    },
    /// Nothing to do, with the reason.
    Skipped { name: &'a str, reason: &'a str },
    /// Terminal failure for this package.
    Failed {
        name: &'a str,
        code: ErrorCode,
        message: &'a str,
    },
}

/// Sink for progress events. The engine never prints.
pub trait Reporter: Send + Sync {
    /// Receive one event.
    fn event(&self, event: SyncEvent<'_>);
}

/// Reporter that drops everything (JSON mode, tests).
pub struct NullReporter;

impl Reporter for NullReporter {
    fn event(&self, _event: SyncEvent<'_>) {}
}

/// Terminal result of one package job.
enum JobOutcome {
    Synced {
        saved: SavedPackage,
        adapter: AdapterKind,
        version: String,
        fallback: bool,
        kind: String,
        /// Errors absorbed by a successful fallback.
        absorbed: Vec<ErrorCode>,
    },
    Cached {
        saved: Option<SavedPackage>,
        version: String,
        fallback: bool,
        kind: Option<String>,
    },
    Skipped {
        reason: String,
        version: Option<String>,
    },
    Failed {
        codes: Vec<ErrorCode>,
        message: String,
        adapter: AdapterKind,
        version: Option<String>,
    },
}

struct JobResult {
    name: String,
    outcome: JobOutcome,
}

/// Everything a package job needs, shared immutably across workers.
struct JobContext {
    config: Config,
    mode: SyncMode,
    versions: VersionMap,
    force: bool,
    now: DateTime<Utc>,
    git: GitHostFetcher,
    registry: RegistryFetcher,
    rendered: RenderedDocsFetcher,
    reporter: Arc<dyn Reporter>,
}

/// The sync engine. Construct once per invocation and call [`Self::sync`].
pub struct SyncEngine {
    config: Config,
    project_root: std::path::PathBuf,
    git: GitHostFetcher,
    registry: RegistryFetcher,
    rendered: RenderedDocsFetcher,
}

impl SyncEngine {
    /// Engine against the public endpoints of the configured ecosystem.
    pub fn new(config: Config, project_root: std::path::PathBuf) -> Result<Self> {
        let ecosystem = config.settings.ecosystem;
        Ok(Self {
            git: GitHostFetcher::new()?,
            registry: RegistryFetcher::new(ecosystem)?,
            rendered: RenderedDocsFetcher::new()?,
            config,
            project_root,
        })
    }

    /// Engine with explicit fetchers (tests point these at mock servers).
    pub fn with_fetchers(
        config: Config,
        project_root: std::path::PathBuf,
        git: GitHostFetcher,
        registry: RegistryFetcher,
        rendered: RenderedDocsFetcher,
    ) -> Self {
        Self {
            config,
            project_root,
            git,
            registry,
            rendered,
        }
    }

    /// Run the full pipeline: resolve, prune, fetch/transform/commit under
    /// the concurrency bound, rewrite the index, and return the report.
    pub async fn sync(self, options: SyncOptions, reporter: Arc<dyn Reporter>) -> Result<Report> {
        let mode = options.mode_override.unwrap_or(self.config.settings.sync_mode);
        let output_dir = self.project_root.join(&self.config.settings.output_dir);
        let now = Utc::now();

        let versions = match mode {
            SyncMode::Lockfile | SyncMode::Hybrid => {
                resolve_lock_versions(&self.project_root, self.config.settings.ecosystem)?
            },
            // Latest mode resolves per package, inside the job.
            SyncMode::LatestDocs => VersionMap::new(),
        };

        if self.config.settings.prune && mode != SyncMode::LatestDocs {
            for removed in storage::prune(&output_dir, &self.config, &versions)? {
                reporter.event(SyncEvent::Pruned { name: &removed });
            }
        }

        let concurrency = self.config.settings.sync_concurrency;
        let context = Arc::new(JobContext {
            config: self.config,
            mode,
            versions,
            force: options.force,
            now,
            git: self.git,
            registry: self.registry,
            rendered: self.rendered,
            reporter: Arc::clone(&reporter),
        });

        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut join_set = JoinSet::new();

        for (name, package) in context.config.packages.clone() {
            let context = Arc::clone(&context);
            let semaphore = Arc::clone(&semaphore);
            let output_dir = output_dir.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore open");
                sync_package(&context, &output_dir, &name, &package).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!("sync worker panicked: {e}"),
            }
        }

        let report = assemble_report(&context, &output_dir, results)?;
        Ok(report)
    }
}

/// Join the terminal outcomes into the report and rewrite the index.
fn assemble_report(
    context: &JobContext,
    output_dir: &std::path::Path,
    mut results: Vec<JobResult>,
) -> Result<Report> {
    results.sort_by(|a, b| a.name.cmp(&b.name));

    let mut statuses = Vec::with_capacity(results.len());
    let mut counters = SyncCounters::default();
    let mut index_entries: Vec<SavedPackage> = Vec::new();
    let mut report = Report::from_statuses(Vec::new());

    let mode_str = context.mode.as_str().to_string();

    for result in results {
        let name = result.name;
        match result.outcome {
            JobOutcome::Synced {
                saved,
                adapter,
                version,
                fallback,
                kind,
                absorbed,
            } => {
                counters.synced += 1;
                report.source_stat_mut(adapter).synced += 1;
                // Errors a successful fallback absorbed stay visible per
                // adapter, not in the package-level histogram.
                report.source_stat_mut(primary_adapter(context)).errors += absorbed.len();
                statuses.push(PackageStatus {
                    name: name.clone(),
                    lock_version: Some(version.clone()),
                    docs_version: Some(version),
                    status: if fallback {
                        DocsStatus::SyncedFallback
                    } else {
                        DocsStatus::Synced
                    },
                    reason: format!("synced from {}", adapter.as_str()),
                    mode: mode_str.clone(),
                    source_kind: Some(kind),
                    reason_code: synced_reason_code(context.mode, fallback, adapter).to_string(),
                });
                index_entries.push(saved);
            },
            JobOutcome::Cached {
                saved,
                version,
                fallback,
                kind,
            } => {
                counters.cached += 1;
                statuses.push(PackageStatus {
                    name,
                    lock_version: Some(version.clone()),
                    docs_version: Some(version),
                    status: if fallback {
                        DocsStatus::SyncedFallback
                    } else {
                        DocsStatus::Synced
                    },
                    reason: "cache hit; docs already current".to_string(),
                    mode: mode_str.clone(),
                    source_kind: kind,
                    reason_code: cached_reason_code(context.mode).to_string(),
                });
                if let Some(saved) = saved {
                    index_entries.push(saved);
                }
            },
            JobOutcome::Skipped { reason, version } => {
                counters.skipped += 1;
                statuses.push(PackageStatus {
                    name,
                    lock_version: version,
                    docs_version: None,
                    status: DocsStatus::Missing,
                    reason,
                    mode: mode_str.clone(),
                    source_kind: None,
                    reason_code: missing_reason_code(context.mode).to_string(),
                });
            },
            JobOutcome::Failed {
                codes,
                message,
                adapter,
                version,
            } => {
                counters.errors += 1;
                report.source_stat_mut(adapter).errors += 1;
                for code in &codes {
                    report.count_error(*code);
                }
                statuses.push(PackageStatus {
                    name,
                    lock_version: version,
                    docs_version: None,
                    status: DocsStatus::Missing,
                    reason: message,
                    mode: mode_str.clone(),
                    source_kind: None,
                    reason_code: missing_reason_code(context.mode).to_string(),
                });
            },
        }
    }

    // Chain members always appear in sourceStats, zeros included.
    for adapter in chain_adapters(context) {
        report.source_stat_mut(adapter);
    }

    write_index(output_dir, &index_entries)?;

    report.summary = Summary::of(&statuses);
    report.issues = crate::report::issues_of(&statuses);
    report.statuses = statuses;
    report.sync = Some(counters);
    Ok(report)
}

fn primary_adapter(context: &JobContext) -> AdapterKind {
    match context.mode {
        SyncMode::LatestDocs => match context.config.settings.ecosystem {
            Ecosystem::Rust => AdapterKind::RenderedDocs,
            Ecosystem::Node => AdapterKind::RegistryArchive,
        },
        SyncMode::Hybrid => AdapterKind::RegistryArchive,
        SyncMode::Lockfile => match context.config.settings.docs_source {
            DocsSource::GitHost => AdapterKind::GitHost,
            DocsSource::RegistryArchive => AdapterKind::RegistryArchive,
        },
    }
}

fn chain_adapters(context: &JobContext) -> Vec<AdapterKind> {
    match context.mode {
        SyncMode::LatestDocs => match context.config.settings.ecosystem {
            Ecosystem::Rust => vec![AdapterKind::RenderedDocs, AdapterKind::GitHost],
            Ecosystem::Node => vec![AdapterKind::RegistryArchive, AdapterKind::GitHost],
        },
        SyncMode::Hybrid => vec![AdapterKind::RegistryArchive, AdapterKind::GitHost],
        SyncMode::Lockfile => match context.config.settings.docs_source {
            DocsSource::GitHost => vec![AdapterKind::GitHost, AdapterKind::RegistryArchive],
            DocsSource::RegistryArchive => vec![AdapterKind::RegistryArchive],
        },
    }
}

fn synced_reason_code(mode: SyncMode, fallback: bool, adapter: AdapterKind) -> &'static str {
    match mode {
        SyncMode::LatestDocs => {
            if fallback {
                reason_code::LATEST_OK_FALLBACK
            } else if adapter == AdapterKind::RenderedDocs {
                reason_code::LATEST_OK_RENDERED
            } else {
                reason_code::LATEST_OK_REGISTRY_ARCHIVE
            }
        },
        _ => {
            if fallback {
                reason_code::LOCKFILE_OK_FALLBACK
            } else {
                reason_code::LOCKFILE_OK
            }
        },
    }
}

const fn cached_reason_code(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::LatestDocs => reason_code::LATEST_CACHE_HIT_TTL,
        _ => reason_code::LOCKFILE_OK,
    }
}

const fn missing_reason_code(mode: SyncMode) -> &'static str {
    match mode {
        SyncMode::LatestDocs => reason_code::LATEST_MISSING,
        _ => reason_code::LOCKFILE_MISSING,
    }
}

/// Drive one package through `Planned → … → Committed` (or a terminal
/// skip/failure).
async fn sync_package(
    context: &JobContext,
    output_dir: &std::path::Path,
    name: &str,
    package: &PackageDoc,
) -> JobResult {
    let outcome = match context.mode {
        SyncMode::LatestDocs => sync_package_latest(context, output_dir, name, package).await,
        SyncMode::Lockfile | SyncMode::Hybrid => {
            sync_package_locked(context, output_dir, name, package).await
        },
    };
    JobResult {
        name: name.to_string(),
        outcome,
    }
}

/// Lockfile and hybrid modes: version pinned by the lock.
async fn sync_package_locked(
    context: &JobContext,
    output_dir: &std::path::Path,
    name: &str,
    package: &PackageDoc,
) -> JobOutcome {
    let Some(version) = context.versions.get(name).cloned() else {
        let reason = "package missing from the lockfile".to_string();
        context.reporter.event(SyncEvent::Skipped {
            name,
            reason: &reason,
        });
        return JobOutcome::Skipped {
            reason,
            version: None,
        };
    };

    let fingerprint = package.fingerprint();
    if !context.force {
        let check = cache::check(
            output_dir,
            name,
            &version,
            &fingerprint,
            context.mode,
            context.config.settings.latest_ttl_hours,
            context.now,
        );
        match check.decision {
            CacheDecision::Hit => {
                context.reporter.event(SyncEvent::CacheHit {
                    name,
                    version: &version,
                });
                let meta = check.meta;
                return JobOutcome::Cached {
                    saved: storage::read_saved(output_dir, name, &version, &package.ai_notes),
                    version,
                    fallback: meta.as_ref().is_some_and(|m| m.is_fallback),
                    kind: meta.and_then(|m| m.source_kind),
                };
            },
            CacheDecision::Corrupted => {
                warn!("{name}@{version}: corrupted metadata, forcing refresh");
            },
            CacheDecision::Miss(_) | CacheDecision::Revalidate => {},
        }
    }

    context.reporter.event(SyncEvent::Syncing {
        name,
        version: &version,
    });

    let fetched = match context.mode {
        SyncMode::Hybrid => fetch_hybrid(context, name, package, &version).await,
        _ => fetch_locked_chain(context, name, package, &version).await,
    };

    match fetched {
        Ok(fetched) if fetched.outcome.files.is_empty() => {
            let reason = format!("no documentation files found for {name}@{version}");
            context.reporter.event(SyncEvent::Skipped {
                name,
                reason: &reason,
            });
            JobOutcome::Skipped {
                reason,
                version: Some(version),
            }
        },
        Ok(fetched) => {
            commit_fetched(context, output_dir, name, package, &version, &fingerprint, fetched)
        },
        Err(failure) => {
            let message = failure.message;
            context.reporter.event(SyncEvent::Failed {
                name,
                code: *failure.codes.last().unwrap_or(&ErrorCode::Unknown),
                message: &message,
            });
            JobOutcome::Failed {
                codes: failure.codes,
                message,
                adapter: failure.adapter,
                version: Some(version),
            }
        },
    }
}

/// A fetch that made it through the chain, with its provenance.
struct ChainFetch {
    outcome: FetchOutcome,
    adapter: AdapterKind,
    /// `source_kind` recorded in metadata.
    kind: String,
    /// Human-readable origin for injected headers.
    source_label: String,
    /// Package-level fallback flag (ref fallback or adapter fallback).
    fallback: bool,
    /// Errors a successful fallback absorbed.
    absorbed: Vec<ErrorCode>,
}

/// A chain that ran out of adapters.
struct ChainFailure {
    codes: Vec<ErrorCode>,
    message: String,
    adapter: AdapterKind,
}

/// Lockfile-mode chain: primary adapter, then the configured fallback.
async fn fetch_locked_chain(
    context: &JobContext,
    name: &str,
    package: &PackageDoc,
    version: &str,
) -> std::result::Result<ChainFetch, ChainFailure> {
    let subpath = package.subpath.as_deref();
    let explicit = package.effective_files();

    match context.config.settings.docs_source {
        DocsSource::GitHost => {
            let repo = package.effective_repo().unwrap_or_default().to_string();
            let primary = context
                .git
                .fetch_docs(&repo, name, version, subpath, explicit.as_deref())
                .await;

            match primary {
                Ok(outcome) if !outcome.files.is_empty() => Ok(ChainFetch {
                    fallback: outcome.is_fallback,
                    kind: if outcome.is_fallback {
                        source_kind::GIT_FALLBACK.to_string()
                    } else {
                        source_kind::GIT_HOST.to_string()
                    },
                    source_label: format!("github.com/{repo}"),
                    adapter: AdapterKind::GitHost,
                    outcome,
                    absorbed: Vec::new(),
                }),
                // Empty listing and fallback-eligible failures both hand
                // over to the registry archive.
                Ok(_) => {
                    let message = format!("git host returned no files for {name}@{version}");
                    registry_fallback(context, name, package, version, ErrorCode::NotFound, message)
                        .await
                },
                Err(e) if e.is_fallback_eligible() => {
                    let code = e.code();
                    let message = e.to_string();
                    registry_fallback(context, name, package, version, code, message).await
                },
                Err(e) => Err(ChainFailure {
                    codes: vec![e.code()],
                    message: e.to_string(),
                    adapter: AdapterKind::GitHost,
                }),
            }
        },
        DocsSource::RegistryArchive => {
            // No automatic fallback behind the registry archive.
            match context
                .registry
                .fetch_archive_docs(name, version, subpath, explicit.as_deref())
                .await
            {
                Ok(outcome) => Ok(ChainFetch {
                    fallback: false,
                    kind: source_kind::REGISTRY_ARCHIVE.to_string(),
                    source_label: REGISTRY_ARCHIVE_REF.to_string(),
                    adapter: AdapterKind::RegistryArchive,
                    outcome,
                    absorbed: Vec::new(),
                }),
                Err(e) => Err(ChainFailure {
                    codes: vec![e.code()],
                    message: e.to_string(),
                    adapter: AdapterKind::RegistryArchive,
                }),
            }
        },
    }
}

/// Second link of the lockfile git-host chain.
async fn registry_fallback(
    context: &JobContext,
    name: &str,
    package: &PackageDoc,
    version: &str,
    primary_code: ErrorCode,
    primary_message: String,
) -> std::result::Result<ChainFetch, ChainFailure> {
    context.reporter.event(SyncEvent::FallbackEngaged {
        name,
        from: AdapterKind::GitHost,
        to: AdapterKind::RegistryArchive,
        reason: &primary_message,
    });

    match context
        .registry
        .fetch_archive_docs(
            name,
            version,
            package.subpath.as_deref(),
            package.effective_files().as_deref(),
        )
        .await
    {
        Ok(outcome) if !outcome.files.is_empty() => Ok(ChainFetch {
            fallback: true,
            kind: source_kind::REGISTRY_ARCHIVE.to_string(),
            source_label: REGISTRY_ARCHIVE_REF.to_string(),
            adapter: AdapterKind::RegistryArchive,
            outcome,
            absorbed: vec![primary_code],
        }),
        Ok(_) => Err(ChainFailure {
            codes: vec![primary_code, ErrorCode::NotFound],
            message: format!("{primary_message}; registry archive had no documentation either"),
            adapter: AdapterKind::RegistryArchive,
        }),
        Err(e) => Err(ChainFailure {
            codes: vec![primary_code, e.code()],
            message: format!("{primary_message}; registry archive fallback failed: {e}"),
            adapter: AdapterKind::RegistryArchive,
        }),
    }
}

/// Hybrid mode: registry archive for README and docs, git host for
/// changelog-class files; entire-git fallback when the archive fails.
async fn fetch_hybrid(
    context: &JobContext,
    name: &str,
    package: &PackageDoc,
    version: &str,
) -> std::result::Result<ChainFetch, ChainFailure> {
    let subpath = package.subpath.as_deref();
    let explicit = package.effective_files();
    let repo = package.effective_repo().unwrap_or_default().to_string();

    let (archive_wanted, git_wanted) = split_hybrid_files(explicit.as_deref());
    let explicit_given = explicit.is_some();

    // An explicit list made of changelog-class files only leaves nothing
    // for the archive to do.
    let archive = if explicit_given && archive_wanted.is_none() {
        Ok(FetchOutcome {
            files: Vec::new(),
            reference: REGISTRY_ARCHIVE_REF.to_string(),
            is_fallback: false,
        })
    } else {
        context
            .registry
            .fetch_archive_docs(name, version, subpath, archive_wanted.as_deref())
            .await
    };

    let mut archive_outcome = match archive {
        Ok(outcome) => outcome,
        Err(e) if e.is_fallback_eligible() => {
            // Archive down: the whole set comes from the git host.
            let message = e.to_string();
            context.reporter.event(SyncEvent::FallbackEngaged {
                name,
                from: AdapterKind::RegistryArchive,
                to: AdapterKind::GitHost,
                reason: &message,
            });
            return match context
                .git
                .fetch_docs(&repo, name, version, subpath, explicit.as_deref())
                .await
            {
                Ok(outcome) if !outcome.files.is_empty() => Ok(ChainFetch {
                    fallback: true,
                    kind: source_kind::GIT_FALLBACK.to_string(),
                    source_label: format!("github.com/{repo}"),
                    adapter: AdapterKind::GitHost,
                    outcome,
                    absorbed: vec![e.code()],
                }),
                Ok(_) => Err(ChainFailure {
                    codes: vec![e.code(), ErrorCode::NotFound],
                    message: format!("{message}; git host had no documentation either"),
                    adapter: AdapterKind::GitHost,
                }),
                Err(git_err) => Err(ChainFailure {
                    codes: vec![e.code(), git_err.code()],
                    message: format!("{message}; git host fallback failed: {git_err}"),
                    adapter: AdapterKind::GitHost,
                }),
            };
        },
        Err(e) => {
            return Err(ChainFailure {
                codes: vec![e.code()],
                message: e.to_string(),
                adapter: AdapterKind::RegistryArchive,
            });
        },
    };

    // Changelog-class files come from the git host; a miss there degrades
    // the artifact but does not fail the package.
    let mut degraded = false;
    if explicit_given && git_wanted.is_none() {
        return Ok(ChainFetch {
            fallback: false,
            kind: source_kind::MIXED.to_string(),
            source_label: format!("github.com/{repo} + {REGISTRY_ARCHIVE_REF}"),
            adapter: AdapterKind::RegistryArchive,
            outcome: archive_outcome,
            absorbed: Vec::new(),
        });
    }
    match context
        .git
        .fetch_docs(&repo, name, version, subpath, git_wanted.as_deref())
        .await
    {
        Ok(git_outcome) => {
            let changelog_files: Vec<FetchedFile> = git_outcome
                .files
                .into_iter()
                .filter(|f| is_changelog_path(&f.original_path))
                .collect();
            archive_outcome.files.extend(changelog_files);
        },
        Err(e) if e.is_fallback_eligible() => {
            warn!("{name}@{version}: changelog fetch failed, emitting partial artifact: {e}");
            degraded = true;
        },
        Err(e) => {
            return Err(ChainFailure {
                codes: vec![e.code()],
                message: e.to_string(),
                adapter: AdapterKind::GitHost,
            });
        },
    }

    Ok(ChainFetch {
        fallback: degraded,
        kind: source_kind::MIXED.to_string(),
        source_label: format!("github.com/{repo} + {REGISTRY_ARCHIVE_REF}"),
        adapter: AdapterKind::RegistryArchive,
        outcome: archive_outcome,
        absorbed: Vec::new(),
    })
}

/// Split an explicit file list for hybrid mode: changelog-class paths go
/// to the git host, the rest to the archive. `None` keeps default
/// selection on both sides.
fn split_hybrid_files(
    explicit: Option<&[String]>,
) -> (Option<Vec<String>>, Option<Vec<String>>) {
    match explicit {
        None => (None, None),
        Some(files) => {
            let (git, archive): (Vec<String>, Vec<String>) = files
                .iter()
                .cloned()
                .partition(|path| is_changelog_path(path));
            (
                (!archive.is_empty()).then_some(archive),
                (!git.is_empty()).then_some(git),
            )
        },
    }
}

/// Latest-docs mode: registry-resolved version, TTL-guarded cache,
/// rendered docs (rust) or registry archive (node) with a git fallback.
async fn sync_package_latest(
    context: &JobContext,
    output_dir: &std::path::Path,
    name: &str,
    package: &PackageDoc,
) -> JobOutcome {
    let ttl_hours = context.config.settings.latest_ttl_hours;

    // TTL gate first: a fresh artifact means no network at all.
    if !context.force {
        if let Some((version, dir)) = storage::best_existing_versions(output_dir).remove(name) {
            if let Ok(Some(meta)) = PackageMeta::load(&dir) {
                if meta.is_supported_schema() && !meta.ttl_expired(context.now, ttl_hours) {
                    context.reporter.event(SyncEvent::CacheHit {
                        name,
                        version: &version,
                    });
                    return JobOutcome::Cached {
                        saved: storage::read_saved(output_dir, name, &version, &package.ai_notes),
                        fallback: meta.is_fallback,
                        kind: meta.source_kind,
                        version,
                    };
                }
            }
        }
    }

    let version = match context.registry.resolve_latest(name).await {
        Ok(version) => version,
        Err(e) => {
            let reason = format!("could not resolve latest version: {e}");
            context.reporter.event(SyncEvent::Skipped {
                name,
                reason: &reason,
            });
            return JobOutcome::Skipped {
                reason,
                version: None,
            };
        },
    };

    // Revalidation: upstream unchanged means a metadata refresh, not a
    // re-fetch.
    if !context.force {
        let dir = cache::package_dir(output_dir, name, &version);
        if let Ok(Some(mut meta)) = PackageMeta::load(&dir) {
            if meta.is_supported_schema() && meta.version == version {
                meta.upstream_latest_version = Some(version.clone());
                meta.upstream_checked_at = Some(context.now.to_rfc3339());
                meta.ttl_expires_at =
                    Some((context.now + Duration::hours(ttl_hours as i64)).to_rfc3339());
                if let Err(e) = storage::refresh_meta(output_dir, name, &version, &meta) {
                    warn!("{name}@{version}: failed to refresh TTL metadata: {e}");
                }
                context.reporter.event(SyncEvent::CacheHit {
                    name,
                    version: &version,
                });
                return JobOutcome::Cached {
                    saved: storage::read_saved(output_dir, name, &version, &package.ai_notes),
                    fallback: meta.is_fallback,
                    kind: meta.source_kind,
                    version,
                };
            }
        }
    }

    context.reporter.event(SyncEvent::Syncing {
        name,
        version: &version,
    });

    let fetched = fetch_latest_chain(context, name, package, &version).await;
    match fetched {
        Ok(fetched) if fetched.outcome.files.is_empty() => {
            let reason = format!("no documentation files found for {name}@{version}");
            context.reporter.event(SyncEvent::Skipped {
                name,
                reason: &reason,
            });
            JobOutcome::Skipped {
                reason,
                version: Some(version),
            }
        },
        Ok(fetched) => commit_fetched(
            context,
            output_dir,
            name,
            package,
            &version,
            &package.fingerprint(),
            fetched,
        ),
        Err(failure) => {
            let message = failure.message;
            context.reporter.event(SyncEvent::Failed {
                name,
                code: *failure.codes.last().unwrap_or(&ErrorCode::Unknown),
                message: &message,
            });
            JobOutcome::Failed {
                codes: failure.codes,
                message,
                adapter: failure.adapter,
                version: Some(version),
            }
        },
    }
}

/// Latest-docs chain: rendered docs (rust) or registry archive (node),
/// then the git host.
async fn fetch_latest_chain(
    context: &JobContext,
    name: &str,
    package: &PackageDoc,
    version: &str,
) -> std::result::Result<ChainFetch, ChainFailure> {
    let primary = match context.config.settings.ecosystem {
        Ecosystem::Rust => {
            match context.rendered.fetch_api_markdown(name, version).await {
                Ok(artifact) => {
                    return Ok(ChainFetch {
                        fallback: false,
                        kind: source_kind::RENDERED.to_string(),
                        source_label: artifact.source_url.clone(),
                        adapter: AdapterKind::RenderedDocs,
                        outcome: FetchOutcome {
                            files: vec![FetchedFile {
                                original_path: "API.md".to_string(),
                                bytes: artifact.markdown.into_bytes(),
                                source_url: artifact.source_url,
                            }],
                            reference: format!("docs.rs@{version}"),
                            is_fallback: false,
                        },
                        absorbed: Vec::new(),
                    });
                },
                Err(e) => (AdapterKind::RenderedDocs, e),
            }
        },
        Ecosystem::Node => {
            match context
                .registry
                .fetch_archive_docs(
                    name,
                    version,
                    package.subpath.as_deref(),
                    package.effective_files().as_deref(),
                )
                .await
            {
                Ok(outcome) if !outcome.files.is_empty() => {
                    return Ok(ChainFetch {
                        fallback: false,
                        kind: source_kind::REGISTRY_ARCHIVE.to_string(),
                        source_label: REGISTRY_ARCHIVE_REF.to_string(),
                        adapter: AdapterKind::RegistryArchive,
                        outcome,
                        absorbed: Vec::new(),
                    });
                },
                Ok(_) => (
                    AdapterKind::RegistryArchive,
                    Error::Other(format!("registry archive had no documentation for {name}")),
                ),
                Err(e) => (AdapterKind::RegistryArchive, e),
            }
        },
    };

    let (failed_adapter, primary_error) = primary;
    let eligible = primary_error.is_fallback_eligible()
        || matches!(primary_error, Error::NormalizationDegraded { .. })
        || matches!(primary_error, Error::Other(_));
    if !eligible {
        return Err(ChainFailure {
            codes: vec![primary_error.code()],
            message: primary_error.to_string(),
            adapter: failed_adapter,
        });
    }

    let Some(repo) = package.effective_repo().map(str::to_string) else {
        return Err(ChainFailure {
            codes: vec![primary_error.code()],
            message: format!(
                "{primary_error}; no `repo` configured for a git fallback"
            ),
            adapter: failed_adapter,
        });
    };

    let message = primary_error.to_string();
    context.reporter.event(SyncEvent::FallbackEngaged {
        name,
        from: failed_adapter,
        to: AdapterKind::GitHost,
        reason: &message,
    });

    match context
        .git
        .fetch_docs(
            &repo,
            name,
            version,
            package.subpath.as_deref(),
            package.effective_files().as_deref(),
        )
        .await
    {
        Ok(outcome) if !outcome.files.is_empty() => Ok(ChainFetch {
            fallback: true,
            kind: source_kind::GIT_FALLBACK.to_string(),
            source_label: format!("github.com/{repo}"),
            adapter: AdapterKind::GitHost,
            outcome,
            absorbed: vec![primary_error.code()],
        }),
        Ok(_) => Err(ChainFailure {
            codes: vec![primary_error.code(), ErrorCode::NotFound],
            message: format!("{message}; git host had no documentation either"),
            adapter: AdapterKind::GitHost,
        }),
        Err(git_err) => Err(ChainFailure {
            codes: vec![primary_error.code(), git_err.code()],
            message: format!("{message}; git host fallback failed: {git_err}"),
            adapter: AdapterKind::GitHost,
        }),
    }
}

/// `Fetched → Transformed → Committed`: run the transformer, build the
/// metadata record, and swap the directory in.
fn commit_fetched(
    context: &JobContext,
    output_dir: &std::path::Path,
    name: &str,
    package: &PackageDoc,
    version: &str,
    fingerprint: &str,
    fetched: ChainFetch,
) -> JobOutcome {
    let fetched_date = context.now.format("%Y-%m-%d").to_string();
    let transform_ctx = TransformContext {
        source: &fetched.source_label,
        reference: &fetched.outcome.reference,
        is_fallback: fetched.outcome.is_fallback,
        version,
        fetched_date: &fetched_date,
        max_file_size_kb: context.config.settings.max_file_size_kb,
    };

    let mut any_truncated = false;
    let transformed: Vec<TransformedFile> = fetched
        .outcome
        .files
        .iter()
        .map(|file| {
            let out = transform_file(file, &transform_ctx);
            any_truncated |= out.truncated;
            out
        })
        .collect();

    let artifact_bytes: u64 = transformed.iter().map(|f| f.content.len() as u64).sum();
    let artifact_sha256 = transformed.first().map(|f| {
        let mut hasher = Sha256::new();
        hasher.update(f.content.as_bytes());
        format!("{:x}", hasher.finalize())
    });

    let is_latest = context.mode == SyncMode::LatestDocs;
    let meta = PackageMeta {
        schema_version: SCHEMA_VERSION,
        version: version.to_string(),
        git_ref: fetched.outcome.reference.clone(),
        is_fallback: fetched.fallback || fetched.outcome.is_fallback,
        fetched_at: fetched_date.clone(),
        config_hash: Some(fingerprint.to_string()),
        sync_mode: Some(context.mode.as_str().to_string()),
        source_kind: Some(fetched.kind.clone()),
        upstream_latest_version: is_latest.then(|| version.to_string()),
        upstream_checked_at: is_latest.then(|| context.now.to_rfc3339()),
        ttl_expires_at: is_latest.then(|| {
            (context.now + Duration::hours(context.config.settings.latest_ttl_hours as i64))
                .to_rfc3339()
        }),
        artifact_format: Some("markdown".to_string()),
        artifact_bytes: Some(artifact_bytes),
        artifact_sha256,
        truncated: Some(any_truncated),
    };

    let saved_shape = SavedPackage {
        name: name.to_string(),
        version: version.to_string(),
        reference: fetched.outcome.reference.clone(),
        is_fallback: meta.is_fallback,
        files: transformed.iter().map(|f| f.name.clone()).collect(),
        ai_notes: package.ai_notes.clone(),
    };
    let summary = render_summary(&saved_shape, &meta, &fetched.source_label);

    match storage::commit_package(
        output_dir,
        name,
        version,
        &transformed,
        &meta,
        &summary,
        &package.ai_notes,
    ) {
        Ok(saved) => {
            context.reporter.event(SyncEvent::Synced {
                name,
                version,
                fallback: meta.is_fallback,
            });
            JobOutcome::Synced {
                saved,
                adapter: fetched.adapter,
                version: version.to_string(),
                fallback: meta.is_fallback,
                kind: fetched.kind,
                absorbed: fetched.absorbed,
            }
        },
        Err(e) => {
            let message = format!("failed to commit artifacts: {e}");
            context.reporter.event(SyncEvent::Failed {
                name,
                code: e.code(),
                message: &message,
            });
            JobOutcome::Failed {
                codes: vec![e.code()],
                message,
                adapter: fetched.adapter,
                version: Some(version.to_string()),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_split_partitions_changelog_class_files() {
        let files = vec![
            "README.md".to_string(),
            "CHANGELOG.md".to_string(),
            "docs/guide.md".to_string(),
            "HISTORY.md".to_string(),
        ];
        let (archive, git) = split_hybrid_files(Some(&files));
        assert_eq!(
            archive,
            Some(vec!["README.md".to_string(), "docs/guide.md".to_string()])
        );
        assert_eq!(
            git,
            Some(vec!["CHANGELOG.md".to_string(), "HISTORY.md".to_string()])
        );

        assert_eq!(split_hybrid_files(None), (None, None));
    }

    #[test]
    fn reason_codes_follow_mode_and_adapter() {
        assert_eq!(
            synced_reason_code(SyncMode::Lockfile, false, AdapterKind::GitHost),
            reason_code::LOCKFILE_OK
        );
        assert_eq!(
            synced_reason_code(SyncMode::Lockfile, true, AdapterKind::RegistryArchive),
            reason_code::LOCKFILE_OK_FALLBACK
        );
        assert_eq!(
            synced_reason_code(SyncMode::LatestDocs, false, AdapterKind::RenderedDocs),
            reason_code::LATEST_OK_RENDERED
        );
        assert_eq!(
            synced_reason_code(SyncMode::LatestDocs, true, AdapterKind::GitHost),
            reason_code::LATEST_OK_FALLBACK
        );
        assert_eq!(cached_reason_code(SyncMode::Lockfile), reason_code::LOCKFILE_OK);
        assert_eq!(
            cached_reason_code(SyncMode::LatestDocs),
            reason_code::LATEST_CACHE_HIT_TTL
        );
    }
}
