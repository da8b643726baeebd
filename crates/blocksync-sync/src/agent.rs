//! Target agent.
//!
//! Runs on the side holding the destination extent. It hashes its blocks,
//! sends the digests and applies the replacement blocks the driver decides
//! to send. The agent never decides anything itself; the driver is the
//! authority on the range and on every block verdict.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};

use blocksync_core::{AgentIdentity, Decision, HashConfig, Range, DECISION_LEN, READY_MARKER};
use blocksync_device::{DeviceError, Extent, OpenMode};

use crate::error::{Result, SyncError};
use crate::wire::Wire;

/// Configuration of one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Destination extent.
    pub dest: PathBuf,
    /// Block size; must equal the driver's.
    pub block_size: u64,
    /// Digest policy; must equal the driver's.
    pub hash: HashConfig,
    /// Executable to delete when the agent exits.
    pub transient: Option<PathBuf>,
}

impl AgentConfig {
    /// Agent for `dest` with the default hash policy.
    pub fn new(dest: impl Into<PathBuf>, block_size: u64) -> Self {
        Self {
            dest: dest.into(),
            block_size,
            hash: HashConfig::default(),
            transient: None,
        }
    }

    /// Use a different hash policy.
    pub fn with_hash(mut self, hash: HashConfig) -> Self {
        self.hash = hash;
        self
    }

    /// Delete `artifact` when the agent exits.
    pub fn with_transient(mut self, artifact: impl Into<PathBuf>) -> Self {
        self.transient = Some(artifact.into());
        self
    }
}

/// What an agent did during its session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AgentReport {
    /// The range the driver asked for.
    pub range: Option<Range>,
    /// Blocks left untouched.
    pub same_blocks: u64,
    /// Blocks overwritten.
    pub written_blocks: u64,
    /// Bytes overwritten.
    pub written_bytes: u64,
}

/// The target agent state machine.
#[derive(Debug, Clone)]
pub struct Agent {
    config: AgentConfig,
}

impl Agent {
    /// Create an agent.
    pub fn new(config: AgentConfig) -> Self {
        Self { config }
    }

    /// Serve one session on `reader`/`writer`.
    pub async fn run<R, W>(&self, reader: R, writer: W) -> Result<AgentReport>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let _cleanup = self.config.transient.as_deref().map(ArtifactCleanup::new);
        let mut wire = Wire::new(reader, writer);
        let mut report = AgentReport::default();

        wire.send_line(READY_MARKER).await?;

        let requested = wire.recv_number("requested size").await?;
        if requested > 0 {
            Extent::create(&self.config.dest, requested).await?;
        }

        let mut extent = Extent::open(&self.config.dest, OpenMode::ReadWrite).await?;
        let identity = AgentIdentity {
            path: self.config.dest.display().to_string(),
            block_size: self.config.block_size,
        };
        wire.send_line(&identity).await?;
        wire.send_line(extent.size()).await?;

        let range = self.recv_range(&mut wire, extent.size()).await?;
        report.range = Some(range);
        tracing::debug!(
            offset = range.offset,
            len = range.len,
            blocks = range.block_count,
            "agent range accepted"
        );

        extent.seek(range.offset).await?;
        self.exchange(&mut wire, &mut extent, range, &mut report)
            .await?;
        extent.flush().await?;

        Ok(report)
    }

    async fn recv_range<R, W>(&self, wire: &mut Wire<R, W>, dest_size: u64) -> Result<Range>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let offset = wire.recv_number("range offset").await?;
        let block_count = wire.recv_number("block count").await?;
        let len = wire.recv_number("range length").await?;

        let range = Range {
            offset,
            len,
            block_count,
        };
        range
            .verify(self.config.block_size)
            .map_err(|e| SyncError::RangeRejected(e.to_string()))?;

        let end = offset
            .checked_add(len)
            .ok_or_else(|| SyncError::RangeRejected(format!("range {offset}+{len} overflows")))?;
        if end > dest_size {
            return Err(SyncError::Capacity {
                required: end,
                available: dest_size,
            });
        }
        Ok(range)
    }

    async fn exchange<R, W>(
        &self,
        wire: &mut Wire<R, W>,
        extent: &mut Extent,
        range: Range,
        report: &mut AgentReport,
    ) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let hash = self.config.hash;
        let mut blocks = extent.blocks(self.config.block_size, range.end());
        let mut frame = Vec::with_capacity(hash.wire_len());
        let mut decision = [0u8; DECISION_LEN];

        for index in 0..range.block_count {
            let block = blocks.next().await?.ok_or_else(|| {
                let offset = range.offset + index * self.config.block_size;
                SyncError::Access(DeviceError::Io {
                    path: self.config.dest.clone(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("destination ended before block {index} at offset {offset}"),
                    ),
                })
            })?;

            frame.clear();
            hash.digest_block(&block.data).write_wire(&mut frame);
            wire.send_frame(&frame).await?;
            wire.flush().await?;

            wire.recv_exact(&mut decision, "decision").await?;
            match Decision::from_byte(decision[0])? {
                Decision::Same => report.same_blocks += 1,
                Decision::Diff => {
                    let mut replacement = vec![0u8; block.len()];
                    wire.recv_exact(&mut replacement, "replacement block")
                        .await?;

                    let extent = blocks.extent();
                    extent.seek(block.offset).await?;
                    extent.write(&replacement).await?;

                    report.written_blocks += 1;
                    report.written_bytes += replacement.len() as u64;
                }
            }
        }

        Ok(())
    }
}

/// Deletes a transient agent artifact when dropped.
///
/// Failure to delete is logged and otherwise ignored.
struct ArtifactCleanup<'a> {
    path: &'a Path,
}

impl<'a> ArtifactCleanup<'a> {
    fn new(path: &'a Path) -> Self {
        Self { path }
    }
}

impl Drop for ArtifactCleanup<'_> {
    fn drop(&mut self) {
        match std::fs::remove_file(self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "removed agent artifact"),
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                "failed to remove agent artifact: {}",
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocksync_core::HashStrength;
    use tempfile::TempDir;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    /// Drives an agent by hand, byte for byte as the protocol table says.
    struct ScriptedDriver {
        reader: BufReader<tokio::io::ReadHalf<tokio::io::DuplexStream>>,
        writer: tokio::io::WriteHalf<tokio::io::DuplexStream>,
    }

    impl ScriptedDriver {
        async fn line(&mut self) -> String {
            let mut line = String::new();
            self.reader.read_line(&mut line).await.unwrap();
            line.trim_end().to_string()
        }

        async fn send(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
            self.writer.flush().await.unwrap();
        }

        async fn digest(&mut self, len: usize) -> Vec<u8> {
            let mut buf = vec![0u8; len];
            self.reader.read_exact(&mut buf).await.unwrap();
            buf
        }
    }

    fn start(
        config: AgentConfig,
    ) -> (
        ScriptedDriver,
        tokio::task::JoinHandle<Result<AgentReport>>,
    ) {
        let (driver_end, agent_end) = tokio::io::duplex(64 * 1024);
        let (agent_reader, agent_writer) = tokio::io::split(agent_end);
        let (driver_reader, driver_writer) = tokio::io::split(driver_end);
        let handle = tokio::spawn(async move {
            Agent::new(config)
                .run(agent_reader, agent_writer)
                .await
        });
        (
            ScriptedDriver {
                reader: BufReader::new(driver_reader),
                writer: driver_writer,
            },
            handle,
        )
    }

    #[tokio::test]
    async fn test_agent_transcript() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.img");
        tokio::fs::write(&dest, b"AAAABBBBCC").await.unwrap();

        let hash = HashConfig::new(HashStrength::Strong, false);
        let (mut driver, handle) = start(AgentConfig::new(&dest, 4).with_hash(hash));

        assert_eq!(driver.line().await, "init");
        driver.send(b"0\n").await;
        assert_eq!(driver.line().await, format!("{} 4", dest.display()));
        assert_eq!(driver.line().await, "10");
        driver.send(b"0\n3\n10\n").await;

        // Block 0 is unchanged.
        let d0 = driver.digest(hash.wire_len()).await;
        assert_eq!(d0, hash.digest_block(b"AAAA").primary.0);
        driver.send(&[Decision::Same.as_byte()]).await;

        // Block 1 is replaced.
        let d1 = driver.digest(hash.wire_len()).await;
        assert_eq!(d1, hash.digest_block(b"BBBB").primary.0);
        driver.send(b"1XXXX").await;

        // The short last block takes a short payload.
        let d2 = driver.digest(hash.wire_len()).await;
        assert_eq!(d2, hash.digest_block(b"CC").primary.0);
        driver.send(b"1YY").await;

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.same_blocks, 1);
        assert_eq!(report.written_blocks, 2);
        assert_eq!(report.written_bytes, 6);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"AAAAXXXXYY");
    }

    #[tokio::test]
    async fn test_agent_sends_secondary_digest() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.img");
        tokio::fs::write(&dest, b"AAAA").await.unwrap();

        let hash = HashConfig::new(HashStrength::Weak, true);
        let (mut driver, handle) = start(AgentConfig::new(&dest, 4).with_hash(hash));

        driver.line().await;
        driver.send(b"0\n").await;
        driver.line().await;
        driver.line().await;
        driver.send(b"0\n1\n4\n").await;

        let mut expected = Vec::new();
        hash.digest_block(b"AAAA").write_wire(&mut expected);
        assert_eq!(driver.digest(hash.wire_len()).await, expected);
        driver.send(b"0").await;

        assert_eq!(handle.await.unwrap().unwrap().same_blocks, 1);
    }

    #[tokio::test]
    async fn test_agent_creates_destination() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("new.img");

        let (mut driver, handle) = start(AgentConfig::new(&dest, 4));
        driver.line().await;
        driver.send(b"8\n").await;
        driver.line().await;
        assert_eq!(driver.line().await, "8");
        driver.send(b"0\n0\n0\n").await;

        let report = handle.await.unwrap().unwrap();
        assert_eq!(report.range.unwrap().block_count, 0);
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), vec![0u8; 8]);
    }

    #[tokio::test]
    async fn test_agent_rejects_inconsistent_range() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.img");
        tokio::fs::write(&dest, vec![0u8; 16]).await.unwrap();

        let (mut driver, handle) = start(AgentConfig::new(&dest, 4));
        driver.line().await;
        driver.send(b"0\n").await;
        driver.line().await;
        driver.line().await;
        driver.send(b"0\n2\n16\n").await;

        assert!(matches!(
            handle.await.unwrap(),
            Err(SyncError::RangeRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_agent_rejects_range_past_end() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.img");
        tokio::fs::write(&dest, vec![0u8; 16]).await.unwrap();

        let (mut driver, handle) = start(AgentConfig::new(&dest, 4));
        driver.line().await;
        driver.send(b"0\n").await;
        driver.line().await;
        driver.line().await;
        driver.send(b"8\n3\n12\n").await;

        assert!(matches!(
            handle.await.unwrap(),
            Err(SyncError::Capacity {
                required: 20,
                available: 16
            })
        ));
    }

    #[tokio::test]
    async fn test_agent_missing_destination() {
        let dir = TempDir::new().unwrap();
        let (mut driver, handle) = start(AgentConfig::new(dir.path().join("missing"), 4));
        driver.line().await;
        driver.send(b"0\n").await;

        assert!(matches!(
            handle.await.unwrap(),
            Err(SyncError::Access(DeviceError::Open { .. }))
        ));
    }

    #[tokio::test]
    async fn test_agent_disconnect_mid_payload() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.img");
        tokio::fs::write(&dest, b"AAAA").await.unwrap();

        let (mut driver, handle) = start(AgentConfig::new(&dest, 4));
        driver.line().await;
        driver.send(b"0\n").await;
        driver.line().await;
        driver.line().await;
        driver.send(b"0\n1\n4\n").await;
        driver.digest(HashConfig::default().wire_len()).await;
        driver.send(b"1XX").await;
        drop(driver);

        assert!(matches!(handle.await.unwrap(), Err(SyncError::Channel(_))));
        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"AAAA");
    }

    #[tokio::test]
    async fn test_transient_artifact_removed() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.img");
        let artifact = dir.path().join("agent.bin");
        tokio::fs::write(&dest, b"AAAA").await.unwrap();
        tokio::fs::write(&artifact, b"#!").await.unwrap();

        let (mut driver, handle) =
            start(AgentConfig::new(&dest, 4).with_transient(&artifact));
        driver.line().await;
        driver.send(b"0\n").await;
        driver.line().await;
        driver.line().await;
        driver.send(b"0\n0\n0\n").await;

        handle.await.unwrap().unwrap();
        assert!(!artifact.exists());
    }

    #[tokio::test]
    async fn test_missing_artifact_does_not_fail_session() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("dest.img");
        tokio::fs::write(&dest, b"AAAA").await.unwrap();

        let (mut driver, handle) =
            start(AgentConfig::new(&dest, 4).with_transient(dir.path().join("gone")));
        driver.line().await;
        driver.send(b"0\n").await;
        driver.line().await;
        driver.line().await;
        driver.send(b"0\n0\n0\n").await;

        assert!(handle.await.unwrap().is_ok());
    }
}
