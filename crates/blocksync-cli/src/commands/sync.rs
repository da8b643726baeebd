//! Synchronize a source into a destination.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;

use blocksync::{
    HashConfig, HashStrength, Session, SessionConfig, SessionReport, SyncConfig,
    DEFAULT_BLOCK_SIZE,
};

use crate::remote::{self, AgentInvocation, Launch};

/// Grace period before a destructive run starts.
const CONFIRM_DELAY: Duration = Duration::from_secs(5);

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Source file or device
    pub source: PathBuf,

    /// Destination host, [user@]host, or "localhost"
    pub host: String,

    /// Destination file or device (defaults to the source path)
    pub dest: Option<String>,

    /// Number of concurrent workers
    #[arg(short, long, default_value_t = 1)]
    pub workers: usize,

    /// Block size in bytes
    #[arg(short, long, default_value_t = DEFAULT_BLOCK_SIZE)]
    pub blocksize: u64,

    /// Use two message digests when comparing blocks
    #[arg(short = '2', long)]
    pub additional_hash: bool,

    /// Use weaker but faster message digests
    #[arg(short = 'W', long)]
    pub weak_hash: bool,

    /// Pause between blocks, in milliseconds
    #[arg(short, long, default_value_t = 0)]
    pub pause: u64,

    /// Seconds between progress reports (0 disables them)
    #[arg(short = 't', long, default_value_t = 1)]
    pub interval: u64,

    /// Only report differences; write nothing
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Create or extend the destination to the source size
    #[arg(short = 'T', long)]
    pub create_dest: bool,

    /// ssh cipher specification
    #[arg(short, long)]
    pub cipher: Option<String>,

    /// Enable ssh compression
    #[arg(short = 'C', long)]
    pub compress: bool,

    /// ssh identity file
    #[arg(short = 'i', long = "id")]
    pub key_file: Option<PathBuf>,

    /// Environment variable holding the ssh password (requires sshpass)
    #[arg(short = 'P', long = "pass")]
    pub pass_env: Option<String>,

    /// Run the agent under sudo
    #[arg(short, long)]
    pub sudo: bool,

    /// Agent program on the destination host
    #[arg(short = 'S', long)]
    pub agent_path: Option<String>,

    /// Make the agent delete its executable when done (needs --agent-path)
    #[arg(long)]
    pub transient: bool,

    /// Skip the grace period before writing
    #[arg(short, long)]
    pub yes: bool,

    /// Print the session report as JSON on stdout
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    fn dest(&self) -> String {
        self.dest
            .clone()
            .unwrap_or_else(|| self.source.display().to_string())
    }

    fn session_config(&self) -> SessionConfig {
        let strength = if self.weak_hash {
            HashStrength::Weak
        } else {
            HashStrength::Strong
        };
        SessionConfig {
            workers: self.workers,
            sync: SyncConfig {
                block_size: self.blocksize,
                hash: HashConfig::new(strength, self.additional_hash),
                dry_run: self.dry_run,
                create_dest: self.create_dest,
                pause: Duration::from_millis(self.pause),
                progress_interval: Duration::from_secs(self.interval),
            },
        }
    }

    /// Reject flag combinations that cannot run safely.
    fn check(&self) -> Result<()> {
        if !self.transient {
            return Ok(());
        }
        if remote::is_local(&self.host) {
            bail!("--transient would delete the local blocksync executable");
        }
        if self.agent_path.is_none() {
            bail!("--transient needs --agent-path naming a copy of the agent to delete");
        }
        Ok(())
    }

    /// Whether the agent can run as a task in this process.
    fn in_process(&self) -> bool {
        remote::is_local(&self.host) && !self.sudo && self.agent_path.is_none()
    }
}

/// Run the sync command. Returns whether every worker succeeded.
pub async fn run(args: SyncArgs) -> Result<bool> {
    args.check()?;
    let dest = args.dest();
    let config = args.session_config();

    if args.dry_run {
        tracing::info!("dry run, will only report differences, no data will be written");
    } else if !args.yes {
        tracing::warn!(
            "destination {} on {} will be permanently changed, press ctrl-c within {} s to abort",
            dest,
            args.host,
            CONFIRM_DELAY.as_secs()
        );
        tokio::time::sleep(CONFIRM_DELAY).await;
    }

    let report = if args.in_process() {
        Session::local(&args.source, Path::new(&dest), config)
            .run()
            .await?
    } else {
        let password = match &args.pass_env {
            Some(var) => Some(
                std::env::var(var).with_context(|| format!("reading ssh password from ${var}"))?,
            ),
            None => None,
        };
        let launch = Launch {
            cipher: args.cipher.clone(),
            compress: args.compress,
            key_file: args.key_file.clone(),
            password,
            sudo: args.sudo,
            agent_path: args.agent_path.clone(),
        };
        let invocation = AgentInvocation {
            dest: dest.clone(),
            block_size: config.sync.block_size,
            hash: config.sync.hash,
            transient: args.transient,
        };
        let local_agent = std::env::current_exe()
            .context("locating blocksync executable")?
            .display()
            .to_string();
        let connector = launch.connector(&args.host, &invocation, &local_agent);
        Session::new(&args.source, dest, connector, config)
            .run()
            .await?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(report.is_success())
}

fn print_summary(report: &SessionReport) {
    for outcome in &report.workers {
        match (&outcome.report, &outcome.error) {
            (Some(r), _) => println!(
                "worker #{}: same {}, diff {}, {} bytes",
                outcome.worker, r.same_blocks, r.diff_blocks, r.bytes_processed
            ),
            (None, error) => println!(
                "worker #{}: failed: {}",
                outcome.worker,
                error.as_deref().unwrap_or("unknown error")
            ),
        }
    }
    println!(
        "total: same {}, diff {}, {} of {} workers succeeded",
        report.same_blocks(),
        report.diff_blocks(),
        report.workers.len() - report.failures().count(),
        report.workers.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Wrapper {
        #[command(flatten)]
        args: SyncArgs,
    }

    fn parse(argv: &[&str]) -> SyncArgs {
        let mut full = vec!["sync"];
        full.extend_from_slice(argv);
        Wrapper::try_parse_from(full).unwrap().args
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["/dev/sda", "localhost"]);
        assert_eq!(args.dest(), "/dev/sda");
        assert!(args.in_process());

        assert_eq!(args.session_config(), SessionConfig::default());
    }

    #[test]
    fn test_flags_map_to_config() {
        let args = parse(&[
            "-w", "3", "-b", "65536", "-W", "-p", "20", "-t", "0", "-T", "/dev/sda", "vault",
            "/dev/sdb",
        ]);
        assert!(!args.in_process());

        let config = args.session_config();
        assert_eq!(config.workers, 3);
        assert_eq!(config.sync.block_size, 65536);
        assert_eq!(config.sync.hash, HashConfig::new(HashStrength::Weak, false));
        assert_eq!(config.sync.pause, Duration::from_millis(20));
        assert_eq!(config.sync.progress_interval, Duration::ZERO);
        assert!(config.sync.create_dest);
    }

    #[test]
    fn test_sudo_needs_a_process() {
        assert!(!parse(&["-s", "/dev/sda", "localhost"]).in_process());
        assert!(!parse(&["-S", "/tmp/agent", "/dev/sda", "localhost"]).in_process());
    }

    #[test]
    fn test_transient_needs_remote_agent_copy() {
        let local = parse(&["--transient", "-S", "/tmp/agent", "/dev/sda", "localhost"]);
        assert!(local.check().is_err());

        let installed = parse(&["--transient", "/dev/sda", "vault"]);
        let err = installed.check().unwrap_err();
        assert!(err.to_string().contains("--agent-path"));

        let copy = parse(&["--transient", "-S", "/tmp/agent", "/dev/sda", "vault"]);
        assert!(copy.check().is_ok());
        assert!(parse(&["/dev/sda", "localhost"]).check().is_ok());
    }

    #[tokio::test]
    async fn test_transient_local_run_is_refused() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("source.img");
        tokio::fs::write(&source, b"AAAABBBB").await.unwrap();

        let args = parse(&[
            "--transient",
            "--yes",
            source.to_str().unwrap(),
            "localhost",
        ]);
        assert!(run(args).await.is_err());
        assert!(std::env::current_exe().unwrap().exists());
    }

    #[tokio::test]
    async fn test_local_run() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("source.img");
        let dest = dir.path().join("dest.img");
        tokio::fs::write(&source, b"AAAABBBB").await.unwrap();
        tokio::fs::write(&dest, b"AAAACCCC").await.unwrap();

        let args = parse(&[
            "-b",
            "4",
            "-t",
            "0",
            "--yes",
            source.to_str().unwrap(),
            "localhost",
            dest.to_str().unwrap(),
        ]);
        assert!(run(args).await.unwrap());
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"AAAABBBB");
    }
}
