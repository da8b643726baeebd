//! Error types for blocksync core.

use thiserror::Error;

/// Errors raised by the pure planning and protocol primitives.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("block size must be greater than zero")]
    ZeroBlockSize,

    #[error("worker count must be greater than zero")]
    NoWorkers,

    #[error("worker {worker} is out of range for {workers} workers")]
    WorkerOutOfRange { worker: usize, workers: usize },

    #[error("invalid decision byte: {0:#04x}")]
    InvalidDecision(u8),

    #[error("malformed protocol line: {0:?}")]
    MalformedLine(String),

    #[error("range declares {declared} blocks but {len} bytes need {expected} blocks of {block_size}")]
    BlockCountMismatch {
        declared: u64,
        expected: u64,
        len: u64,
        block_size: u64,
    },
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
