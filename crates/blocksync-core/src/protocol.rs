//! Protocol vocabulary shared by driver and agent.
//!
//! The session starts with a line-oriented handshake and then switches to
//! fixed-length binary frames:
//!
//! ```text
//! Agent                                Driver
//!   |-------- "init" ------------------->|
//!   |<------- requested size ------------|
//!   |-------- "<dest> <block size>" ---->|
//!   |-------- destination size --------->|
//!   |<------- offset, count, length -----|
//!   |-------- digests (block 0) -------->|
//!   |<------- '0' | '1' + block bytes ---|
//!   |              ...                   |
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// First line emitted by a ready agent.
pub const READY_MARKER: &str = "init";

/// Default block size (1 MiB).
pub const DEFAULT_BLOCK_SIZE: u64 = 1024 * 1024;

/// Length of a decision frame.
pub const DECISION_LEN: usize = 1;

/// Per-block verdict sent from driver to agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Block is unchanged; nothing follows.
    Same,
    /// Block differs; the replacement bytes follow.
    Diff,
}

impl Decision {
    /// Wire byte.
    pub const fn as_byte(self) -> u8 {
        match self {
            Decision::Same => b'0',
            Decision::Diff => b'1',
        }
    }

    /// Parse a wire byte.
    pub fn from_byte(byte: u8) -> Result<Self, CoreError> {
        match byte {
            b'0' => Ok(Decision::Same),
            b'1' => Ok(Decision::Diff),
            other => Err(CoreError::InvalidDecision(other)),
        }
    }
}

/// The agent's `<destPath> <blockSize>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub path: String,
    pub block_size: u64,
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path, self.block_size)
    }
}

impl FromStr for AgentIdentity {
    type Err = CoreError;

    // The block size is the last field, so paths may contain spaces.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = || CoreError::MalformedLine(line.to_string());
        let (path, block_size) = line.trim_end().rsplit_once(' ').ok_or_else(malformed)?;
        if path.is_empty() {
            return Err(malformed());
        }
        let block_size = block_size.parse().map_err(|_| malformed())?;
        Ok(Self {
            path: path.to_string(),
            block_size,
        })
    }
}
