//! Block digest policy.
//!
//! Both peers must hash every block with the same [`HashPair`] and agree on
//! whether the secondary digest is sent. The wire protocol carries digests
//! with no length prefix, so every algorithm has a fixed output length.

use serde::{Deserialize, Serialize};
use sha2::Digest as _;
use std::fmt;

/// A fixed-output hash function usable for block comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha512,
    Sha384,
    Sha256,
    Blake3,
}

impl DigestAlgorithm {
    /// Digest length in bytes.
    pub const fn output_len(self) -> usize {
        match self {
            DigestAlgorithm::Sha512 => 64,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Blake3 => 32,
        }
    }

    /// Short lowercase name, used in logs.
    pub const fn name(self) -> &'static str {
        match self {
            DigestAlgorithm::Sha512 => "sha512",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Blake3 => "blake3",
        }
    }

    /// Hash a block.
    pub fn digest(self, data: &[u8]) -> Digest {
        let bytes = match self {
            DigestAlgorithm::Sha512 => sha2::Sha512::digest(data).to_vec(),
            DigestAlgorithm::Sha384 => sha2::Sha384::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => sha2::Sha256::digest(data).to_vec(),
            DigestAlgorithm::Blake3 => blake3::hash(data).as_bytes().to_vec(),
        };
        Digest(bytes)
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Speed/strength knob for digest selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashStrength {
    /// Collision-resistant digests (SHA-512, SHA-384).
    #[default]
    Strong,
    /// Cheaper digests (BLAKE3, SHA-256).
    Weak,
}

/// The (primary, secondary) digest functions for one strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashPair {
    pub primary: DigestAlgorithm,
    pub secondary: DigestAlgorithm,
}

impl HashPair {
    /// Pick the digest pair for a strength.
    pub const fn select(strength: HashStrength) -> Self {
        match strength {
            HashStrength::Strong => Self {
                primary: DigestAlgorithm::Sha512,
                secondary: DigestAlgorithm::Sha384,
            },
            HashStrength::Weak => Self {
                primary: DigestAlgorithm::Blake3,
                secondary: DigestAlgorithm::Sha256,
            },
        }
    }
}

/// Hash configuration shared by driver and agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HashConfig {
    /// Which digest pair to use.
    pub strength: HashStrength,
    /// Whether the secondary digest is computed and exchanged.
    pub double: bool,
}

impl HashConfig {
    /// Create a config.
    pub const fn new(strength: HashStrength, double: bool) -> Self {
        Self { strength, double }
    }

    /// The digest pair for this config.
    pub const fn pair(&self) -> HashPair {
        HashPair::select(self.strength)
    }

    /// Primary digest length on the wire.
    pub const fn primary_len(&self) -> usize {
        self.pair().primary.output_len()
    }

    /// Secondary digest length on the wire (0 when single-hash).
    pub const fn secondary_len(&self) -> usize {
        if self.double {
            self.pair().secondary.output_len()
        } else {
            0
        }
    }

    /// Total digest bytes sent per block.
    pub const fn wire_len(&self) -> usize {
        self.primary_len() + self.secondary_len()
    }

    /// Hash one block according to this config.
    pub fn digest_block(&self, data: &[u8]) -> DigestPair {
        let pair = self.pair();
        DigestPair {
            primary: pair.primary.digest(data),
            secondary: self.double.then(|| pair.secondary.digest(data)),
        }
    }

    /// Split a received digest frame of exactly [`wire_len`](Self::wire_len)
    /// bytes into its parts.
    pub fn split_wire(&self, frame: &[u8]) -> Option<DigestPair> {
        if frame.len() != self.wire_len() {
            return None;
        }
        let (primary, secondary) = frame.split_at(self.primary_len());
        Some(DigestPair {
            primary: Digest(primary.to_vec()),
            secondary: self.double.then(|| Digest(secondary.to_vec())),
        })
    }
}

/// Raw digest bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest(pub Vec<u8>);

impl Digest {
    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "Digest({})", &hex[..hex.len().min(16)])
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Digests of one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestPair {
    pub primary: Digest,
    pub secondary: Option<Digest>,
}

impl DigestPair {
    /// Whether two blocks are considered identical.
    ///
    /// Primaries must match; secondaries must match when both are present.
    /// A pair with a secondary never matches one without.
    pub fn matches(&self, other: &DigestPair) -> bool {
        if self.primary != other.primary {
            return false;
        }
        match (&self.secondary, &other.secondary) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }

    /// Append the wire encoding (primary then secondary) to `out`.
    pub fn write_wire(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.primary.as_bytes());
        if let Some(secondary) = &self.secondary {
            out.extend_from_slice(secondary.as_bytes());
        }
    }
}
