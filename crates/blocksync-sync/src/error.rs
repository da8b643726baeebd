//! Error types for the sync protocol.

use thiserror::Error;

use blocksync_core::CoreError;
use blocksync_device::DeviceError;

/// Errors that can end a driver or agent session.
///
/// Every variant is fatal to the session that raised it and to nothing else.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An extent could not be opened, created, read or written.
    #[error("access error: {0}")]
    Access(#[from] DeviceError),

    /// The channel could not be established or the agent never became ready.
    #[error("connect error: {0}")]
    Connect(String),

    /// Driver and agent disagree on the block size.
    #[error("block size mismatch: local={local}, peer={peer}")]
    BlockSizeMismatch { local: u64, peer: u64 },

    /// The agent is serving a different destination than expected.
    #[error("destination mismatch: expected {expected}, peer serves {peer}")]
    DestinationMismatch { expected: String, peer: String },

    /// The agent rejected the declared range.
    #[error("range rejected: {0}")]
    RangeRejected(String),

    /// The destination is too small for the data sent to it.
    #[error("capacity error: {required} bytes needed but destination holds {available}")]
    Capacity { required: u64, available: u64 },

    /// The peer went away or the stream ended mid-frame.
    #[error("channel error: {0}")]
    Channel(String),

    /// The peer sent something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(#[from] CoreError),

    /// The agent finished with a failure.
    #[error("agent failed: {0}")]
    Agent(String),
}

impl SyncError {
    /// Short category name, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Access(_) => "access",
            SyncError::Connect(_) => "connect",
            SyncError::BlockSizeMismatch { .. }
            | SyncError::DestinationMismatch { .. }
            | SyncError::RangeRejected(_) => "negotiation",
            SyncError::Capacity { .. } => "capacity",
            SyncError::Channel(_) | SyncError::Protocol(_) => "channel",
            SyncError::Agent(_) => "agent",
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
