//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use aifd_core::SyncMode;

pub const DEFAULT_CONFIG_PATH: &str = "aifd.toml";

#[derive(Debug, Parser)]
#[command(name = "aifd")]
#[command(version, about = "Version-locked dependency docs for AI coding assistants")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a starter config from the project manifest.
    Init {
        /// Path to the config file to write.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Overwrite an existing config file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Download or update vendor documentation.
    Sync {
        /// Path to the config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Sync mode override.
        #[arg(long, value_enum)]
        mode: Option<SyncModeArg>,
        /// Ignore the local cache and re-fetch configured docs.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Report format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        report_format: OutputFormat,
    },
    /// Show documentation sync status for configured packages.
    Status {
        /// Path to the config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Sync mode override for status evaluation.
        #[arg(long, value_enum)]
        mode: Option<SyncModeArg>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
    /// Exit non-zero if any package docs are not synced.
    Check {
        /// Path to the config file.
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
        /// Sync mode override for check evaluation.
        #[arg(long, value_enum)]
        mode: Option<SyncModeArg>,
        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum SyncModeArg {
    Lockfile,
    LatestDocs,
    Hybrid,
}

impl SyncModeArg {
    pub const fn to_sync_mode(self) -> SyncMode {
        match self {
            Self::Lockfile => SyncMode::Lockfile,
            Self::LatestDocs => SyncMode::LatestDocs,
            Self::Hybrid => SyncMode::Hybrid,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
