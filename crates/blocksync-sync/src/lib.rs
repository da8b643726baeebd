//! # blocksync sync
//!
//! The block comparison protocol between a sync driver (holding the
//! source) and a target agent (holding the destination).
//!
//! ## Overview
//!
//! A driver and an agent strictly alternate: the agent sends the digest of
//! one block, the driver answers with a verdict and, if the block differs,
//! the replacement bytes. Neither side can run more than one block ahead,
//! which is all the flow control the protocol needs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use blocksync_sync::{AgentConfig, MemoryConnector, SyncConfig, SyncDriver};
//!
//! async fn example() -> blocksync_sync::Result<()> {
//!     let config = SyncConfig::default();
//!     let agent = AgentConfig::new("/tmp/dest.img", config.block_size);
//!     let connector = Arc::new(MemoryConnector::new(agent));
//!
//!     let driver = SyncDriver::new(0, 1, "/tmp/source.img", "/tmp/dest.img", connector, config);
//!     let report = driver.run().await?;
//!     println!("same: {}, diff: {}", report.same_blocks, report.diff_blocks);
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Driver                              Agent
//!   |<------- "init" ------------------|
//!   |-------- requested size --------->|
//!   |<------- "<dest> <block size>" ---|
//!   |<------- destination size --------|
//!   |-------- offset/count/length ---->|
//!   |<------- digests ----------------|  \
//!   |-------- '0' | '1' + block ----->|  /  once per block
//! ```

pub mod agent;
pub mod driver;
pub mod error;
pub mod progress;
pub mod transport;
pub mod wire;

pub use agent::{Agent, AgentConfig, AgentReport};
pub use driver::{SyncConfig, SyncDriver, SyncReport};
pub use error::{Result, SyncError};
pub use progress::{Progress, ProgressSnapshot};
pub use transport::{
    memory::MemoryConnector, process::CommandConnector, BoxReader, BoxWriter, Channel, Connector,
    Peer,
};
pub use wire::Wire;
