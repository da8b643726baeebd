//! # blocksync
//!
//! Synchronize a file or block device into a destination, locally or on a
//! remote host over ssh, sending only the blocks that differ.
//!
//! ## Commands
//!
//! - `sync`: compare a source with a destination and copy differing blocks
//! - `agent`: serve the destination side of one session on stdin/stdout
//!
//! ## Example
//!
//! ```bash
//! # Local copy with four workers
//! blocksync sync -w 4 /dev/sdb localhost /backup/sdb.img
//!
//! # Remote copy through ssh, using sudo on the far side
//! blocksync sync -s -i ~/.ssh/backup /dev/vg0/data backup@vault /dev/vg1/data
//!
//! # Only count differences
//! blocksync sync -n /dev/sdb localhost /backup/sdb.img
//! ```

use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod remote;

use commands::{agent, sync};

/// Parallel block-level synchronization of files and devices.
#[derive(Parser, Debug)]
#[command(name = "blocksync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides it
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Synchronize a source into a local or remote destination
    Sync(sync::SyncArgs),

    /// Serve the destination side of a session on stdin/stdout
    Agent(agent::AgentArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // The agent's stdout carries the protocol, so logs always go to stderr.
    let default_level = match cli.verbose {
        0 if matches!(cli.command, Commands::Agent(_)) => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    init_logging(default_level);

    let result: Result<bool> = match cli.command {
        Commands::Sync(args) => sync::run(args).await,
        Commands::Agent(args) => agent::run(args).await.map(|()| true),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
