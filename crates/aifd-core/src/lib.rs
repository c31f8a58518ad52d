//! aifd-core: the sync engine behind `aifd`.
//!
//! Mirrors dependency documentation into a local directory whose shape is
//! a deterministic function of the project's lock state and its on-disk
//! configuration. The engine resolves target versions, consults a
//! fingerprint-keyed cache, fetches from remote adapters with retry and
//! fallback, transforms content under size and provenance rules, and
//! commits versioned directories atomically together with a structured
//! report.

pub mod cache;
pub mod changelog;
pub mod config;
pub mod error;
pub mod fetch;
pub mod index;
pub mod lockfile;
pub mod meta;
pub mod report;
pub mod status;
pub mod storage;
pub mod sync;
pub mod transform;
pub mod util;

pub use cache::{CacheCheck, CacheDecision, MissReason};
pub use config::{Config, DocsSource, Ecosystem, PackageDoc, Settings, SyncMode};
pub use error::{Error, ErrorCode, Result};
pub use fetch::{AdapterKind, FetchOutcome, FetchedFile};
pub use lockfile::{resolve_lock_versions, VersionMap};
pub use meta::{PackageMeta, META_FILE, SCHEMA_VERSION};
pub use report::{DocsStatus, PackageStatus, Report, Summary, SyncCounters};
pub use status::{collect_status, collect_status_latest};
pub use storage::{SavedPackage, INDEX_FILE, SUMMARY_FILE};
pub use sync::{NullReporter, Reporter, SyncEngine, SyncEvent, SyncOptions};
