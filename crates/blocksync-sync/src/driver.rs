//! Sync driver state machine.
//!
//! Runs on the side holding the source extent, for one worker's range:
//! connect, negotiate, then compare every block and ship the ones that
//! differ.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use blocksync_core::{
    range_for, AgentIdentity, Decision, HashConfig, Range, DEFAULT_BLOCK_SIZE, READY_MARKER,
};
use blocksync_device::{DeviceError, Extent, OpenMode};

use crate::error::{Result, SyncError};
use crate::progress::{format_duration, mib_per_sec, Progress};
use crate::transport::Connector;
use crate::wire::Wire;

const MIB: f64 = 1024.0 * 1024.0;

/// How long a broken channel waits for the agent to report why.
const PEER_GRACE: Duration = Duration::from_secs(5);

/// Configuration for sync behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Block size in bytes.
    pub block_size: u64,
    /// Digest policy.
    pub hash: HashConfig,
    /// Only count differences; never write to the destination.
    pub dry_run: bool,
    /// Ask the agent to create/resize the destination to the source size.
    pub create_dest: bool,
    /// Pause after every block.
    pub pause: Duration,
    /// How often progress is logged; zero disables it.
    pub progress_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            hash: HashConfig::default(),
            dry_run: false,
            create_dest: false,
            pause: Duration::ZERO,
            progress_interval: Duration::from_secs(1),
        }
    }
}

/// Result of one driver session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Worker index.
    pub worker: usize,
    /// The range this worker covered.
    pub range: Range,
    /// Blocks found identical.
    pub same_blocks: u64,
    /// Blocks found different (and sent, unless dry-run).
    pub diff_blocks: u64,
    /// Source bytes compared.
    pub bytes_processed: u64,
    /// Wall time of the block exchange.
    pub elapsed: Duration,
    /// Whether differences were only counted.
    pub dry_run: bool,
}

impl SyncReport {
    /// Blocks processed.
    pub fn total_blocks(&self) -> u64 {
        self.same_blocks + self.diff_blocks
    }

    /// Bytes per second over the whole exchange.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_processed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Drives one worker's range against one agent.
pub struct SyncDriver<C: Connector> {
    worker: usize,
    workers: usize,
    source: PathBuf,
    dest: String,
    connector: Arc<C>,
    config: SyncConfig,
}

impl<C: Connector> SyncDriver<C> {
    /// Create a driver for worker `worker` of `workers`.
    ///
    /// `dest` is the destination path the agent is expected to report.
    pub fn new(
        worker: usize,
        workers: usize,
        source: impl Into<PathBuf>,
        dest: impl Into<String>,
        connector: Arc<C>,
        config: SyncConfig,
    ) -> Self {
        Self {
            worker,
            workers,
            source: source.into(),
            dest: dest.into(),
            connector,
            config,
        }
    }

    /// Worker index.
    pub fn worker(&self) -> usize {
        self.worker
    }

    /// Run the session to completion.
    pub async fn run(&self) -> Result<SyncReport> {
        let worker = self.worker;
        tracing::info!(
            worker,
            pid = std::process::id(),
            "starting worker, block size is {:.1} MB",
            self.config.block_size as f64 / MIB
        );

        let mut source = Extent::open(&self.source, OpenMode::Read).await?;
        let range = range_for(source.size(), self.config.block_size, self.workers, worker)?;
        tracing::info!(
            worker,
            "chunk size is {:.1} MB, offset is {}",
            range.len as f64 / MIB,
            range.offset
        );
        if !self.config.pause.is_zero() {
            tracing::info!(
                worker,
                "slowing down for {} ms/block",
                self.config.pause.as_millis()
            );
        }

        let channel = self.connector.connect(worker).await?;
        let (reader, writer, peer) = channel.into_parts();
        let mut wire = Wire::new(reader, writer);

        match self.session(&mut wire, &mut source, range).await {
            Ok(report) => {
                if let Err(e) = wire.shutdown().await {
                    tracing::debug!(worker, "closing channel: {}", e);
                }
                drop(wire);
                peer.wait().await?;
                Ok(report)
            }
            Err(e @ (SyncError::Channel(_) | SyncError::Protocol(_))) => {
                // Prefer the agent's own error over the broken channel it
                // left behind.
                drop(wire);
                match tokio::time::timeout(PEER_GRACE, peer.wait()).await {
                    Ok(Err(cause)) => Err(cause),
                    _ => Err(e),
                }
            }
            Err(e) => {
                drop(wire);
                peer.abort().await;
                Err(e)
            }
        }
    }

    async fn session<R, W>(
        &self,
        wire: &mut Wire<R, W>,
        source: &mut Extent,
        range: Range,
    ) -> Result<SyncReport>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.handshake(wire, source.size()).await?;

        source.seek(range.offset).await?;
        wire.send_line(range.offset).await?;
        wire.send_line(range.block_count).await?;
        wire.send_line(range.len).await?;

        tracing::info!(worker = self.worker, "start syncing {} blocks", range.block_count);
        self.exchange(wire, source, range).await
    }

    async fn handshake<R, W>(&self, wire: &mut Wire<R, W>, source_size: u64) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let marker = wire
            .recv_line("ready marker")
            .await
            .map_err(|e| SyncError::Connect(format!("agent never became ready: {e}")))?;
        if marker != READY_MARKER {
            return Err(SyncError::Connect(format!(
                "expected {READY_MARKER:?} from agent, got {marker:?}"
            )));
        }

        // A dry run never resizes the destination.
        let requested = if self.config.create_dest && !self.config.dry_run {
            source_size
        } else {
            0
        };
        wire.send_line(requested).await?;

        let identity: AgentIdentity = wire.recv_line("destination identity").await?.parse()?;
        if identity.path != self.dest {
            return Err(SyncError::DestinationMismatch {
                expected: self.dest.clone(),
                peer: identity.path,
            });
        }
        if identity.block_size != self.config.block_size {
            return Err(SyncError::BlockSizeMismatch {
                local: self.config.block_size,
                peer: identity.block_size,
            });
        }

        let dest_size = wire.recv_number("destination size").await?;
        if source_size > dest_size {
            return Err(SyncError::Capacity {
                required: source_size,
                available: dest_size,
            });
        }
        if source_size < dest_size {
            tracing::warn!(
                worker = self.worker,
                "source size ({}) is smaller than destination size ({}), proceeding anyway",
                source_size,
                dest_size
            );
        }
        Ok(())
    }

    async fn exchange<R, W>(
        &self,
        wire: &mut Wire<R, W>,
        source: &mut Extent,
        range: Range,
    ) -> Result<SyncReport>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let worker = self.worker;
        let hash = self.config.hash;
        let source_path = source.path().to_path_buf();
        let mut progress = Progress::new(range.block_count, self.config.progress_interval);
        let mut blocks = source.blocks(self.config.block_size, range.end());
        let mut peer_frame = vec![0u8; hash.wire_len()];

        while !progress.is_complete() {
            let block = blocks.next().await?.ok_or_else(|| {
                SyncError::Access(DeviceError::Io {
                    path: source_path.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!(
                            "source ended after {} of {} blocks",
                            progress.done_blocks(),
                            range.block_count
                        ),
                    ),
                })
            })?;

            let local = hash.digest_block(&block.data);
            wire.recv_exact(&mut peer_frame, "block digest").await?;
            let remote = hash
                .split_wire(&peer_frame)
                .ok_or_else(|| SyncError::Channel("digest frame has the wrong length".into()))?;

            let same = local.matches(&remote);
            let decision = if same {
                progress.record_same(block.len());
                Decision::Same
            } else {
                progress.record_diff(block.len());
                if self.config.dry_run {
                    Decision::Same
                } else {
                    Decision::Diff
                }
            };

            wire.send_frame(&[decision.as_byte()]).await?;
            if decision == Decision::Diff {
                wire.send_frame(&block.data).await?;
            }
            wire.flush().await?;

            tracing::debug!(
                worker,
                index = block.index,
                offset = block.offset,
                same,
                "block compared"
            );

            if !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }

            if let Some(snap) = progress.tick() {
                tracing::info!(
                    worker,
                    "same: {}, diff: {}, {}/{}, {:5.1} MB/s ({} remaining)",
                    snap.same_blocks,
                    snap.diff_blocks,
                    snap.done_blocks,
                    snap.total_blocks,
                    snap.rate_mib_s,
                    snap.remaining
                        .map(format_duration)
                        .unwrap_or_else(|| "unknown".into())
                );
            }
        }

        let elapsed = progress.elapsed();
        tracing::info!(
            worker,
            "same: {}, diff: {}, {}/{}, {:5.1} MB/s",
            progress.same_blocks(),
            progress.diff_blocks(),
            progress.done_blocks(),
            range.block_count,
            mib_per_sec(progress.bytes(), elapsed)
        );
        tracing::info!(worker, "completed in {}", format_duration(elapsed));

        Ok(SyncReport {
            worker,
            range,
            same_blocks: progress.same_blocks(),
            diff_blocks: progress.diff_blocks(),
            bytes_processed: progress.bytes(),
            elapsed,
            dry_run: self.config.dry_run,
        })
    }
}
