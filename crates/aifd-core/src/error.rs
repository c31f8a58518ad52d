//! Error types for the aifd sync engine.
//!
//! Every failure that can surface from the engine is a variant of [`Error`].
//! Variants are grouped into a closed set of [`ErrorCode`]s used by the sync
//! report's histogram and by the adapter fallback logic: a package job that
//! fails with a fallback-eligible code may be retried against the next
//! adapter in the chain, while config/lockfile errors abort the run before
//! any job is scheduled.

use std::path::PathBuf;

use thiserror::Error;

/// Convenience alias used across aifd-core.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for aifd-core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file exists but is not valid.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Configuration file is absent.
    #[error("config file not found at: {0}")]
    ConfigNotFound(PathBuf),

    /// No supported lockfile exists at the project root.
    #[error("no lockfile found: {0}")]
    LockfileNotFound(String),

    /// A lockfile exists but could not be parsed.
    #[error("failed to parse {path}: {message}")]
    LockfileParse {
        /// Lockfile path.
        path: PathBuf,
        /// Parser diagnostic.
        message: String,
    },

    /// A configured package is absent from the resolved version map.
    #[error("package '{0}' is not in the lockfile")]
    NotInLock(String),

    /// Transport-level HTTP failure (connect, timeout, TLS).
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Transport failure attributed to a specific request.
    #[error("request failed for {url}: {source}")]
    Fetch {
        /// Request URL.
        url: String,
        /// Underlying transport error.
        source: reqwest::Error,
    },

    /// Server rejected the credentials (401) or forbade access (403 without
    /// rate-limit semantics).
    #[error("authentication failed for {url}: HTTP {status}")]
    Auth {
        /// Request URL.
        url: String,
        /// HTTP status.
        status: u16,
    },

    /// Rate limit exhausted. Set `GITHUB_TOKEN`/`GH_TOKEN` for a higher quota.
    #[error("rate limit exceeded for {url}: HTTP {status}")]
    RateLimit {
        /// Request URL.
        url: String,
        /// HTTP status.
        status: u16,
    },

    /// Any other non-success HTTP status.
    #[error("request failed for {url}: status {status}")]
    HttpStatus {
        /// Request URL.
        url: String,
        /// HTTP status.
        status: u16,
    },

    /// Response body did not match the expected shape.
    #[error("malformed response from {url}: {message}")]
    MalformedBody {
        /// Request URL.
        url: String,
        /// Parser diagnostic.
        message: String,
    },

    /// No tag candidate or default branch could be resolved for a version.
    #[error("no git ref found for {repo} at version {version} (tried: {tried:?})")]
    NoRef {
        /// `owner/name` repository.
        repo: String,
        /// Target version.
        version: String,
        /// Tag names probed before giving up.
        tried: Vec<String>,
    },

    /// An explicitly requested file is absent at the resolved ref.
    #[error("file not found: {repo} / {path} at {git_ref}")]
    FileNotFound {
        /// `owner/name` repository.
        repo: String,
        /// Requested path.
        path: String,
        /// Ref the path was probed at.
        git_ref: String,
    },

    /// A default-selection file was absent; never counted as a job failure.
    #[error("optional file not found: {0}")]
    OptionalFileNotFound(String),

    /// The registry has no downloadable archive for this version.
    #[error("no published archive for {name}@{version}")]
    TarballNotFound {
        /// Package name.
        name: String,
        /// Target version.
        version: String,
    },

    /// The downloaded archive could not be decoded or contained unsafe paths.
    #[error("malformed archive for {name}: {message}")]
    ArchiveMalformed {
        /// Package name.
        name: String,
        /// Decoder diagnostic.
        message: String,
    },

    /// The rendered-docs normalizer produced output missing a mandatory
    /// section; the artifact must not be reported as a rendered success.
    #[error("rendered docs for {name}@{version} degraded: missing {missing}")]
    NormalizationDegraded {
        /// Package name.
        name: String,
        /// Target version.
        version: String,
        /// First mandatory section that was absent.
        missing: String,
    },

    /// Storage-layer failure outside plain IO (serialization, layout).
    #[error("storage error: {0}")]
    Storage(String),

    /// The atomic directory swap could not be completed; the previous
    /// committed state is left untouched.
    #[error("atomic commit failed for {path}: {message}")]
    AtomicityFail {
        /// Final directory the swap targeted.
        path: PathBuf,
        /// OS diagnostic.
        message: String,
    },

    /// Catch-all for conditions without a dedicated variant.
    #[error("{0}")]
    Other(String),
}

/// Closed classification used for the report histogram and fallback policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum ErrorCode {
    InvalidConfig,
    FileNotFound,
    LockfileNotFound,
    NotInLock,
    Auth,
    RateLimit,
    NotFound,
    Network,
    Parse,
    Server,
    NoRef,
    Io,
    AtomicityFail,
    ArchiveMalformed,
    TarballNotFound,
    NormalizationDegraded,
    Unknown,
}

impl ErrorCode {
    /// Stable wire name, used as the `errorCodes` histogram key.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::LockfileNotFound => "LOCKFILE_NOT_FOUND",
            Self::NotInLock => "NOT_IN_LOCK",
            Self::Auth => "AUTH",
            Self::RateLimit => "RATE_LIMIT",
            Self::NotFound => "NOT_FOUND",
            Self::Network => "NETWORK",
            Self::Parse => "PARSE",
            Self::Server => "SERVER",
            Self::NoRef => "NO_REF",
            Self::Io => "IO",
            Self::AtomicityFail => "ATOMICITY_FAIL",
            Self::ArchiveMalformed => "ARCHIVE_MALFORMED",
            Self::TarballNotFound => "TARBALL_NOT_FOUND",
            Self::NormalizationDegraded => "NORMALIZATION_DEGRADED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether a failure with this code lets the next adapter in the chain
    /// take over. Auth and local failures never do: retrying a bad token or
    /// a full disk against a different host cannot help.
    pub const fn is_fallback_eligible(self) -> bool {
        matches!(
            self,
            Self::RateLimit
                | Self::NotFound
                | Self::Network
                | Self::Parse
                | Self::Server
                | Self::NoRef
                | Self::TarballNotFound
                | Self::ArchiveMalformed
        )
    }
}

impl Error {
    /// Classify this error into the closed [`ErrorCode`] set.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) | Self::Storage(_) => ErrorCode::Io,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::ConfigNotFound(_) => ErrorCode::FileNotFound,
            Self::LockfileNotFound(_) => ErrorCode::LockfileNotFound,
            Self::LockfileParse { .. } | Self::MalformedBody { .. } => ErrorCode::Parse,
            Self::NotInLock(_) => ErrorCode::NotInLock,
            Self::Http(_) | Self::Fetch { .. } => ErrorCode::Network,
            Self::Auth { .. } => ErrorCode::Auth,
            Self::RateLimit { .. } => ErrorCode::RateLimit,
            Self::HttpStatus { status, .. } if *status == 404 => ErrorCode::NotFound,
            Self::HttpStatus { status, .. } if *status >= 500 => ErrorCode::Server,
            Self::HttpStatus { .. } => ErrorCode::Unknown,
            Self::NoRef { .. } => ErrorCode::NoRef,
            Self::FileNotFound { .. } | Self::OptionalFileNotFound(_) => ErrorCode::NotFound,
            Self::TarballNotFound { .. } => ErrorCode::TarballNotFound,
            Self::ArchiveMalformed { .. } => ErrorCode::ArchiveMalformed,
            Self::NormalizationDegraded { .. } => ErrorCode::NormalizationDegraded,
            Self::AtomicityFail { .. } => ErrorCode::AtomicityFail,
            Self::Other(_) => ErrorCode::Unknown,
        }
    }

    /// Shorthand for `self.code().is_fallback_eligible()`.
    pub fn is_fallback_eligible(&self) -> bool {
        self.code().is_fallback_eligible()
    }
}
