//! Serve the destination side of a session.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use blocksync::sync::Agent;
use blocksync::{AgentConfig, HashConfig, HashStrength, DEFAULT_BLOCK_SIZE};

#[derive(Args, Debug)]
pub struct AgentArgs {
    /// Destination file or device
    pub dest: PathBuf,

    /// Block size in bytes
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub blocksize: u64,

    /// Use two message digests when comparing blocks
    #[arg(short = '2', long)]
    pub additional_hash: bool,

    /// Use weaker but faster message digests
    #[arg(short = 'W', long)]
    pub weak_hash: bool,

    /// Delete the agent executable when done
    #[arg(long)]
    pub transient: bool,
}

/// Run the agent on stdin/stdout.
pub async fn run(args: AgentArgs) -> Result<()> {
    let strength = if args.weak_hash {
        HashStrength::Weak
    } else {
        HashStrength::Strong
    };
    let mut config = AgentConfig::new(&args.dest, args.blocksize)
        .with_hash(HashConfig::new(strength, args.additional_hash));
    if args.transient {
        let exe = std::env::current_exe().context("locating agent executable")?;
        config = config.with_transient(exe);
    }

    let report = Agent::new(config)
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
        .with_context(|| format!("agent for {}", args.dest.display()))?;

    tracing::info!(
        same = report.same_blocks,
        written = report.written_blocks,
        bytes = report.written_bytes,
        "agent finished"
    );
    Ok(())
}
