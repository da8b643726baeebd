//! # blocksync
//!
//! Parallel block-level synchronization of a source file or block device
//! into a destination, local or remote, transferring only the blocks whose
//! digests differ.
//!
//! ## Overview
//!
//! - **Extents**: the source and destination, opened as files of a fixed size
//! - **Ranges**: each worker covers a contiguous, block-aligned slice
//! - **Agents**: the destination side; hashes blocks and writes replacements
//! - **Drivers**: the source side; compares digests and ships differing blocks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use blocksync::{Session, SessionConfig};
//!
//! async fn example() -> blocksync::Result<()> {
//!     let config = SessionConfig {
//!         workers: 4,
//!         ..SessionConfig::default()
//!     };
//!
//!     let session = Session::local("/dev/sdb", Path::new("/backup/sdb.img"), config);
//!     let report = session.run().await?;
//!     println!("same: {}, diff: {}", report.same_blocks(), report.diff_blocks());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `blocksync::core` - Digests, partitioning and protocol values
//! - `blocksync::device` - Extent access
//! - `blocksync::sync` - Wire protocol, agent, driver and connectors

pub mod error;
pub mod session;

pub use blocksync_core as core;
pub use blocksync_device as device;
pub use blocksync_sync as sync;

pub use error::{BlocksyncError, Result};
pub use session::{Session, SessionConfig, SessionReport, WorkerOutcome};

pub use blocksync_core::{HashConfig, HashStrength, Range, DEFAULT_BLOCK_SIZE};
pub use blocksync_sync::{
    AgentConfig, CommandConnector, Connector, MemoryConnector, SyncConfig, SyncReport,
};
