//! Open extents.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::block::Blocks;
use crate::error::{DeviceError, Result};

/// How an extent is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Source side.
    Read,
    /// Agent side; blocks are overwritten in place.
    ReadWrite,
}

/// An open byte extent with a cursor.
#[derive(Debug)]
pub struct Extent {
    path: PathBuf,
    file: File,
    mode: OpenMode,
    size: u64,
    position: u64,
}

impl Extent {
    /// Open an extent and measure its size.
    ///
    /// The cursor starts at offset 0.
    pub async fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| DeviceError::Open {
            path: path.clone(),
            source,
        };

        let mut file = OpenOptions::new()
            .read(true)
            .write(mode == OpenMode::ReadWrite)
            .open(&path)
            .await
            .map_err(open_error)?;

        let size = file.seek(SeekFrom::End(0)).await.map_err(open_error)?;
        file.seek(SeekFrom::Start(0)).await.map_err(open_error)?;

        tracing::debug!(path = %path.display(), size, ?mode, "opened extent");

        Ok(Self {
            path,
            file,
            mode,
            size,
            position: 0,
        })
    }

    /// Make sure `path` exists and is exactly `size` bytes long.
    ///
    /// Missing files are created; longer files are truncated and shorter
    /// ones are zero-extended.
    pub async fn create(path: impl AsRef<Path>, size: u64) -> Result<()> {
        let path = path.as_ref();
        let create_error = |source| DeviceError::Create {
            path: path.to_path_buf(),
            size,
            source,
        };

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .await
            .map_err(create_error)?;
        file.set_len(size).await.map_err(create_error)?;

        tracing::debug!(path = %path.display(), size, "created extent");
        Ok(())
    }

    /// Path the extent was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes, measured when opened.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current cursor offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Mode the extent was opened in.
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Move the cursor to an absolute offset.
    pub async fn seek(&mut self, offset: u64) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .await
            .map_err(|source| self.io_error(source))?;
        self.position = offset;
        Ok(())
    }

    /// Read up to `len` bytes at the cursor, stopping early only at the end
    /// of the extent.
    pub async fn read(&mut self, len: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(len);
        let mut filled = 0;
        while filled < len {
            let n = self
                .file
                .read(&mut buf[filled..])
                .await
                .map_err(|source| self.io_error(source))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        self.position += filled as u64;
        Ok(buf.freeze())
    }

    /// Overwrite `data.len()` bytes at the cursor and advance past them.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.file
            .write_all(data)
            .await
            .map_err(|source| self.io_error(source))?;
        // Surface the write error on this block rather than at close.
        self.file
            .flush()
            .await
            .map_err(|source| self.io_error(source))?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// Durably flush written data.
    pub async fn flush(&mut self) -> Result<()> {
        if self.mode == OpenMode::Read {
            return Ok(());
        }
        self.file
            .flush()
            .await
            .map_err(|source| self.io_error(source))?;
        self.file
            .sync_data()
            .await
            .map_err(|source| self.io_error(source))
    }

    /// Read sequential blocks from the cursor up to `end`.
    pub fn blocks(&mut self, block_size: u64, end: u64) -> Blocks<'_> {
        Blocks::new(self, block_size, end)
    }

    fn io_error(&self, source: std::io::Error) -> DeviceError {
        DeviceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}
