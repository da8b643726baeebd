//! Sequential block reads.

use bytes::Bytes;

use crate::error::Result;
use crate::extent::Extent;

/// One block read from an extent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Zero-based index within the reader that produced it.
    pub index: u64,
    /// Absolute offset of the first byte.
    pub offset: u64,
    /// Block contents; shorter than the block size only at the end.
    pub data: Bytes,
}

impl Block {
    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the block is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Lazy reader of consecutive blocks.
///
/// Starts at the extent's cursor and stops at `end` or at the end of the
/// extent, whichever comes first. The last block may be short.
pub struct Blocks<'a> {
    extent: &'a mut Extent,
    block_size: u64,
    end: u64,
    index: u64,
}

impl<'a> Blocks<'a> {
    pub(crate) fn new(extent: &'a mut Extent, block_size: u64, end: u64) -> Self {
        Self {
            extent,
            block_size,
            end,
            index: 0,
        }
    }

    /// Read the next block.
    pub async fn next(&mut self) -> Result<Option<Block>> {
        let offset = self.extent.position();
        if offset >= self.end || self.block_size == 0 {
            return Ok(None);
        }
        let len = (self.end - offset).min(self.block_size) as usize;
        let data = self.extent.read(len).await?;
        if data.is_empty() {
            return Ok(None);
        }

        let block = Block {
            index: self.index,
            offset,
            data,
        };
        self.index += 1;
        Ok(Some(block))
    }

    /// Number of blocks produced so far.
    pub fn produced(&self) -> u64 {
        self.index
    }

    /// The underlying extent.
    pub fn extent(&mut self) -> &mut Extent {
        &mut *self.extent
    }
}
