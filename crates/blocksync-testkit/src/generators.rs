//! Proptest generators for property-based testing.

use proptest::prelude::*;

use blocksync_core::{HashConfig, HashStrength};

/// Generate a small block size.
pub fn block_size() -> impl Strategy<Value = u64> {
    1u64..=64
}

/// Generate a worker count.
pub fn workers() -> impl Strategy<Value = usize> {
    1usize..=6
}

/// Generate a hash policy.
pub fn hash_config() -> impl Strategy<Value = HashConfig> {
    (
        prop_oneof![Just(HashStrength::Strong), Just(HashStrength::Weak)],
        any::<bool>(),
    )
        .prop_map(|(strength, double)| HashConfig::new(strength, double))
}

/// A source and a destination that starts out partly different.
///
/// The destination is never shorter than the source; any extra tail must
/// survive a sync untouched.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub source: Vec<u8>,
    pub dest: Vec<u8>,
    pub block_size: u64,
    pub workers: usize,
    pub hash: HashConfig,
}

impl Scenario {
    /// The destination contents a correct sync produces.
    pub fn expected(&self) -> Vec<u8> {
        let mut expected = self.dest.clone();
        expected[..self.source.len()].copy_from_slice(&self.source);
        expected
    }
}

impl Arbitrary for Scenario {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (
            prop::collection::vec(any::<u8>(), 0..=512),
            prop::collection::vec(any::<prop::sample::Index>(), 0..8),
            prop::collection::vec(any::<u8>(), 0..=16),
            block_size(),
            workers(),
            hash_config(),
        )
            .prop_map(|(source, flips, tail, block_size, workers, hash)| {
                let mut dest = source.clone();
                if !dest.is_empty() {
                    for flip in flips {
                        let at = flip.index(dest.len());
                        dest[at] = dest[at].wrapping_add(1);
                    }
                }
                dest.extend_from_slice(&tail);
                Scenario {
                    source,
                    dest,
                    block_size,
                    workers,
                    hash,
                }
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn scenario_dest_covers_source(scenario: Scenario) {
            prop_assert!(scenario.dest.len() >= scenario.source.len());
            let expected = scenario.expected();
            prop_assert_eq!(&expected[..scenario.source.len()], &scenario.source[..]);
            prop_assert_eq!(expected.len(), scenario.dest.len());
        }
    }
}
