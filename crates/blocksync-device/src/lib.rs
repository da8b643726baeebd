//! # blocksync device
//!
//! Access to the byte extents being synchronized: a block device, a disk
//! image or any other seekable file.
//!
//! ## Key Types
//!
//! - [`Extent`] - An open extent with a known size and a cursor
//! - [`OpenMode`] - Read-only (source side) or read-write (agent side)
//! - [`Block`] - One block read from an extent
//! - [`Blocks`] - Lazy, non-restartable block reader
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blocksync_device::{Extent, OpenMode};
//!
//! async fn example() -> blocksync_device::Result<()> {
//!     let mut extent = Extent::open("/dev/sdb", OpenMode::Read).await?;
//!     let end = extent.size();
//!     let mut blocks = extent.blocks(1024 * 1024, end);
//!     while let Some(block) = blocks.next().await? {
//!         println!("block {} at {}: {} bytes", block.index, block.offset, block.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Size by seeking**: block devices report a metadata length of zero,
//!   so the size is taken from seeking to the end.
//! - **No locking**: exclusive ownership of a destination range is the
//!   caller's obligation.

pub mod block;
pub mod error;
pub mod extent;

pub use block::{Block, Blocks};
pub use error::{DeviceError, Result};
pub use extent::{Extent, OpenMode};
