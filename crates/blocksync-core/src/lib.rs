//! # blocksync core
//!
//! Pure primitives for block-level device synchronization: digest policy,
//! partition planning and the protocol vocabulary shared by both peers.
//!
//! This crate contains no I/O, no processes, no networking. It is pure
//! computation over block contents and byte ranges.
//!
//! ## Key Types
//!
//! - [`HashConfig`] - Which digest pair to use and whether to send both
//! - [`DigestPair`] - The primary (and optional secondary) digest of one block
//! - [`Range`] - One worker's contiguous slice of an extent
//! - [`Decision`] - The per-block SAME/DIFF verdict sent back to the agent
//!
//! ## Partitioning
//!
//! [`plan`] splits an extent of `total_size` bytes between `workers` workers.
//! The last worker absorbs the remainder, and the final block of every range
//! is clamped to the range end so ranges never overlap.

pub mod digest;
pub mod error;
pub mod partition;
pub mod protocol;

pub use digest::{Digest, DigestAlgorithm, DigestPair, HashConfig, HashPair, HashStrength};
pub use error::{CoreError, Result};
pub use partition::{block_count, plan, range_for, Range};
pub use protocol::{AgentIdentity, Decision, DECISION_LEN, DEFAULT_BLOCK_SIZE, READY_MARKER};
