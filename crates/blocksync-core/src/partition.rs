//! Partition planning.
//!
//! Splits `[0, total_size)` into one contiguous range per worker. Every
//! worker but the last gets `floor(total_size / workers)` bytes; the last
//! one also takes the remainder.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// One worker's slice of an extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    /// First byte of the range.
    pub offset: u64,
    /// Length of the range in bytes.
    pub len: u64,
    /// Number of blocks covering `len`.
    pub block_count: u64,
}

impl Range {
    /// Build a range, deriving its block count.
    pub fn new(offset: u64, len: u64, block_size: u64) -> Result<Self> {
        if block_size == 0 {
            return Err(CoreError::ZeroBlockSize);
        }
        Ok(Self {
            offset,
            len,
            block_count: block_count(len, block_size),
        })
    }

    /// One past the last byte of the range.
    pub const fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// Length of block `index`; only the final block may be short.
    pub fn block_len(&self, index: u64, block_size: u64) -> u64 {
        let start = index.saturating_mul(block_size);
        self.len.saturating_sub(start).min(block_size)
    }

    /// Check a peer-declared block count against the range length.
    pub fn verify(&self, block_size: u64) -> Result<()> {
        if block_size == 0 {
            return Err(CoreError::ZeroBlockSize);
        }
        let expected = block_count(self.len, block_size);
        if expected != self.block_count {
            return Err(CoreError::BlockCountMismatch {
                declared: self.block_count,
                expected,
                len: self.len,
                block_size,
            });
        }
        Ok(())
    }
}

/// Number of `block_size` blocks needed to cover `len` bytes.
pub fn block_count(len: u64, block_size: u64) -> u64 {
    len.div_ceil(block_size)
}

/// Plan the ranges of all workers, indexed by worker.
pub fn plan(total_size: u64, block_size: u64, workers: usize) -> Result<Vec<Range>> {
    if block_size == 0 {
        return Err(CoreError::ZeroBlockSize);
    }
    if workers == 0 {
        return Err(CoreError::NoWorkers);
    }

    let count = workers as u64;
    let base = total_size / count;
    let remainder = total_size - base * count;

    (0..workers)
        .map(|worker| {
            let offset = worker as u64 * base;
            let len = if worker == workers - 1 {
                base + remainder
            } else {
                base
            };
            Range::new(offset, len, block_size)
        })
        .collect()
}

/// Plan the range of a single worker.
pub fn range_for(total_size: u64, block_size: u64, workers: usize, worker: usize) -> Result<Range> {
    if worker >= workers {
        return Err(CoreError::WorkerOutOfRange { worker, workers });
    }
    let mut ranges = plan(total_size, block_size, workers)?;
    Ok(ranges.swap_remove(worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_single_worker() {
        let ranges = plan(10 * MIB, MIB, 1).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].offset, 0);
        assert_eq!(ranges[0].len, 10 * MIB);
        assert_eq!(ranges[0].block_count, 10);
    }

    #[test]
    fn test_last_worker_absorbs_remainder() {
        let ranges = plan(103, 10, 4).unwrap();
        assert_eq!(
            ranges.iter().map(|r| (r.offset, r.len)).collect::<Vec<_>>(),
            vec![(0, 25), (25, 25), (50, 25), (75, 28)]
        );
        assert_eq!(ranges[0].block_count, 3);
        assert_eq!(ranges[3].block_count, 3);
        assert_eq!(ranges[0].block_len(2, 10), 5);
        assert_eq!(ranges[3].block_len(2, 10), 8);
    }

    #[test]
    fn test_more_workers_than_bytes() {
        let ranges = plan(3, 4, 5).unwrap();
        assert_eq!(ranges.iter().map(|r| r.block_count).sum::<u64>(), 1);
        assert_eq!(ranges[4].offset, 0);
        assert_eq!(ranges[4].len, 3);
    }

    #[test]
    fn test_empty_extent() {
        let ranges = plan(0, 4, 2).unwrap();
        assert!(ranges.iter().all(|r| r.block_count == 0));
    }

    #[test]
    fn test_rejects_zero_inputs() {
        assert!(matches!(plan(10, 0, 1), Err(CoreError::ZeroBlockSize)));
        assert!(matches!(plan(10, 4, 0), Err(CoreError::NoWorkers)));
        assert!(matches!(
            range_for(10, 4, 2, 2),
            Err(CoreError::WorkerOutOfRange { worker: 2, workers: 2 })
        ));
    }

    #[test]
    fn test_verify_block_count() {
        let mut range = Range::new(0, 9, 4).unwrap();
        assert!(range.verify(4).is_ok());
        range.block_count = 2;
        assert!(matches!(
            range.verify(4),
            Err(CoreError::BlockCountMismatch { declared: 2, expected: 3, .. })
        ));
    }

    proptest! {
        #[test]
        fn ranges_cover_extent_exactly(
            total in 0u64..1_000_000,
            block_size in 64u64..100_000,
            workers in 1usize..32,
        ) {
            let ranges = plan(total, block_size, workers).unwrap();
            prop_assert_eq!(ranges.len(), workers);

            let mut cursor = 0;
            for range in &ranges {
                prop_assert_eq!(range.offset, cursor);

                let covered: u64 = (0..range.block_count)
                    .map(|b| range.block_len(b, block_size))
                    .sum();
                prop_assert_eq!(covered, range.len);
                if range.block_count > 0 {
                    prop_assert!(range.block_len(range.block_count - 1, block_size) > 0);
                }
                cursor = range.end();
            }
            prop_assert_eq!(cursor, total);
        }

        #[test]
        fn range_for_matches_plan(
            total in 0u64..1_000_000,
            block_size in 1u64..10_000,
            workers in 1usize..16,
        ) {
            let ranges = plan(total, block_size, workers).unwrap();
            for worker in 0..workers {
                prop_assert_eq!(range_for(total, block_size, workers, worker).unwrap(), ranges[worker]);
            }
        }
    }
}
