//! Test fixtures and helpers.
//!
//! Common setup code for tests that need extents on disk.

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tempfile::TempDir;

use blocksync_sync::{AgentConfig, MemoryConnector, SyncConfig};

/// A temporary directory holding test extents.
pub struct ExtentFixture {
    dir: TempDir,
}

impl ExtentFixture {
    /// Create a fixture in a fresh temporary directory.
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Path of `name` inside the fixture.
    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write `data` as extent `name`.
    pub fn write(&self, name: &str, data: &[u8]) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, data).expect("write extent");
        path
    }

    /// Create extent `name` of `len` zero bytes.
    pub fn zeroed(&self, name: &str, len: usize) -> PathBuf {
        self.write(name, &vec![0u8; len])
    }

    /// Read an extent back.
    pub fn read(&self, path: &Path) -> Vec<u8> {
        std::fs::read(path).expect("read extent")
    }
}

impl Default for ExtentFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A connector running in-process agents for `dest` with `config`'s block
/// size and hash policy.
pub fn local_connector(dest: &Path, config: &SyncConfig) -> MemoryConnector {
    MemoryConnector::new(AgentConfig::new(dest, config.block_size).with_hash(config.hash))
}

/// Deterministic pseudo-random bytes.
pub fn patterned(len: usize, seed: u64) -> Vec<u8> {
    let mut data = vec![0u8; len];
    StdRng::seed_from_u64(seed).fill_bytes(&mut data);
    data
}

/// Invert the first byte of each listed block.
pub fn mutate_blocks(data: &mut [u8], block_size: usize, blocks: &[usize]) {
    for &block in blocks {
        if let Some(byte) = data.get_mut(block * block_size) {
            *byte = !*byte;
        }
    }
}

/// Number of blocks holding at least one nonzero byte.
pub fn nonzero_blocks(data: &[u8], block_size: usize) -> u64 {
    data.chunks(block_size)
        .filter(|chunk| chunk.iter().any(|&b| b != 0))
        .count() as u64
}

/// Number of blocks where `a` and `b` differ, over `a`'s length.
pub fn differing_blocks(a: &[u8], b: &[u8], block_size: usize) -> u64 {
    a.chunks(block_size)
        .zip(b.chunks(block_size))
        .filter(|(x, y)| x != y)
        .count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patterned_is_deterministic() {
        assert_eq!(patterned(64, 1), patterned(64, 1));
        assert_ne!(patterned(64, 1), patterned(64, 2));
    }

    #[test]
    fn test_fixture_roundtrip() {
        let fixture = ExtentFixture::new();
        let path = fixture.write("a.img", b"hello");
        assert_eq!(fixture.read(&path), b"hello");
        assert_eq!(fixture.read(&fixture.zeroed("z.img", 3)), vec![0, 0, 0]);
    }

    #[test]
    fn test_block_helpers() {
        let mut data = vec![0u8; 10];
        mutate_blocks(&mut data, 4, &[0, 2, 9]);
        assert_eq!(nonzero_blocks(&data, 4), 2);
        assert_eq!(differing_blocks(&data, &[0u8; 10], 4), 2);
    }

    #[tokio::test]
    async fn test_local_connector_serves_dest() {
        use blocksync_sync::{Connector, Wire};

        let fixture = ExtentFixture::new();
        let dest = fixture.zeroed("dest.img", 8);
        let connector = local_connector(&dest, &SyncConfig::default());
        let (reader, writer, peer) = connector.connect(0).await.unwrap().into_parts();
        let mut wire = Wire::new(reader, writer);
        assert_eq!(wire.recv_line("marker").await.unwrap(), "init");
        drop(wire);
        peer.abort().await;
    }
}
