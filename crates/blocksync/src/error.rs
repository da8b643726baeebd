//! Error types for blocksync sessions.

use blocksync_core::CoreError;
use blocksync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur while setting up or running a session.
#[derive(Debug, Error)]
pub enum BlocksyncError {
    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Partitioning or protocol value error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The session configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for blocksync operations.
pub type Result<T> = std::result::Result<T, BlocksyncError>;
