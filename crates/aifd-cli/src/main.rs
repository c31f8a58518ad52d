//! aifd CLI - version-locked dependency docs for AI coding assistants.
//!
//! Thin wrapper over the `aifd-core` sync engine: argument parsing, output
//! formatting, and exit-code mapping live here; everything else is the
//! engine's business.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod output;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    initialize_logging();

    // Also usable as an external subcommand (`cargo aifd …`): drop the
    // duplicated subcommand name argv[1] if present.
    let args: Vec<String> = std::env::args()
        .enumerate()
        .filter(|(i, arg)| !(*i == 1 && arg == "aifd"))
        .map(|(_, arg)| arg)
        .collect();

    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) => {
            e.print().expect("failed to print clap error");
            std::process::exit(2);
        },
    };

    match run(cli).await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        },
    }
}

fn initialize_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aifd=warn,aifd_core=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Init { config, force } => {
            commands::init::run(&config, force).await?;
            Ok(0)
        },
        Commands::Sync {
            config,
            mode,
            force,
            report_format,
        } => commands::sync::run(&config, mode, force, report_format).await,
        Commands::Status {
            config,
            mode,
            format,
        } => commands::status::run(&config, mode, format).await,
        Commands::Check {
            config,
            mode,
            format,
        } => commands::check::run(&config, mode, format).await,
    }
}
