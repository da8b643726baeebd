//! Error types for extent access.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while accessing an extent.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// The extent could not be opened in the requested mode.
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The extent could not be created or resized.
    #[error("cannot create {path} with {size} bytes: {source}")]
    Create {
        path: PathBuf,
        size: u64,
        source: std::io::Error,
    },

    /// Read, write, seek or flush failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for extent operations.
pub type Result<T> = std::result::Result<T, DeviceError>;
