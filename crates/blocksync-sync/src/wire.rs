//! Wire codec.
//!
//! The handshake is newline-terminated text; the block exchange is raw
//! fixed-length frames with no length prefix. Both share one buffered
//! reader, so bytes buffered while reading a line are not lost to the
//! frame reads that follow.

use std::fmt::Display;
use std::io::ErrorKind;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

use blocksync_core::CoreError;

use crate::error::{Result, SyncError};

/// Longest accepted handshake line, newline included.
pub const MAX_LINE_LEN: u64 = 8192;

/// One end of a protocol channel.
pub struct Wire<R, W> {
    reader: BufReader<R>,
    writer: W,
}

impl<R, W> Wire<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Wrap a reader/writer pair.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Send one line and flush it.
    pub async fn send_line(&mut self, line: impl Display) -> Result<()> {
        let line = format!("{line}\n");
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| channel_error("sending line", e))?;
        self.flush().await
    }

    /// Receive one line, without its terminator.
    ///
    /// `what` names the expected line in errors.
    pub async fn recv_line(&mut self, what: &str) -> Result<String> {
        let mut line = String::new();
        let n = (&mut self.reader)
            .take(MAX_LINE_LEN)
            .read_line(&mut line)
            .await
            .map_err(|e| channel_error(what, e))?;

        if n == 0 {
            return Err(SyncError::Channel(format!(
                "peer closed the channel while awaiting {what}"
            )));
        }
        if !line.ends_with('\n') {
            if n as u64 >= MAX_LINE_LEN {
                let message = format!("{what} exceeds {MAX_LINE_LEN} bytes");
                return Err(CoreError::MalformedLine(message).into());
            }
            return Err(SyncError::Channel(format!(
                "peer closed the channel in the middle of {what}"
            )));
        }

        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(line)
    }

    /// Receive one line holding a decimal number.
    pub async fn recv_number(&mut self, what: &str) -> Result<u64> {
        let line = self.recv_line(what).await?;
        line.trim()
            .parse()
            .map_err(|_| CoreError::MalformedLine(format!("{what}: {line:?}")).into())
    }

    /// Queue raw frame bytes; call [`flush`](Self::flush) to send them.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.writer
            .write_all(frame)
            .await
            .map_err(|e| channel_error("sending frame", e))
    }

    /// Fill `buf` completely from the channel.
    pub async fn recv_exact(&mut self, buf: &mut [u8], what: &str) -> Result<()> {
        self.reader
            .read_exact(buf)
            .await
            .map(|_| ())
            .map_err(|e| channel_error(what, e))
    }

    /// Flush queued output.
    pub async fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .await
            .map_err(|e| channel_error("flushing", e))
    }

    /// Close the sending half so the peer observes end-of-stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|e| channel_error("closing", e))
    }
}

fn channel_error(what: &str, error: std::io::Error) -> SyncError {
    match error.kind() {
        ErrorKind::UnexpectedEof => {
            SyncError::Channel(format!("short read from peer while awaiting {what}"))
        }
        ErrorKind::BrokenPipe => SyncError::Channel(format!("peer went away while {what}")),
        _ => SyncError::Channel(format!("{what}: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_over(input: &[u8]) -> Wire<&[u8], Vec<u8>> {
        Wire::new(input, Vec::new())
    }

    #[tokio::test]
    async fn test_lines_then_frames() {
        let mut wire = wire_over(b"init\n42\nABCD");
        assert_eq!(wire.recv_line("marker").await.unwrap(), "init");
        assert_eq!(wire.recv_number("size").await.unwrap(), 42);

        let mut frame = [0u8; 4];
        wire.recv_exact(&mut frame, "digest").await.unwrap();
        assert_eq!(&frame, b"ABCD");
    }

    #[tokio::test]
    async fn test_crlf_is_trimmed() {
        let mut wire = wire_over(b"init\r\n");
        assert_eq!(wire.recv_line("marker").await.unwrap(), "init");
    }

    #[tokio::test]
    async fn test_eof_is_channel_error() {
        let mut wire = wire_over(b"");
        assert!(matches!(
            wire.recv_line("marker").await,
            Err(SyncError::Channel(_))
        ));

        let mut wire = wire_over(b"partial");
        assert!(matches!(
            wire.recv_line("marker").await,
            Err(SyncError::Channel(_))
        ));
    }

    #[tokio::test]
    async fn test_short_frame_is_channel_error() {
        let mut wire = wire_over(b"AB");
        let mut frame = [0u8; 4];
        assert!(matches!(
            wire.recv_exact(&mut frame, "digest").await,
            Err(SyncError::Channel(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_number() {
        let mut wire = wire_over(b"lots\n");
        assert!(matches!(
            wire.recv_number("size").await,
            Err(SyncError::Protocol(CoreError::MalformedLine(_)))
        ));
    }

    #[tokio::test]
    async fn test_overlong_line() {
        let input = vec![b'x'; MAX_LINE_LEN as usize + 10];
        let mut wire = Wire::new(input.as_slice(), Vec::new());
        assert!(matches!(
            wire.recv_line("identity").await,
            Err(SyncError::Protocol(CoreError::MalformedLine(_)))
        ));
    }

    #[tokio::test]
    async fn test_send_line_and_frame() {
        let mut wire = wire_over(b"");
        wire.send_line(7).await.unwrap();
        wire.send_frame(b"1").await.unwrap();
        wire.send_frame(b"DATA").await.unwrap();
        wire.flush().await.unwrap();
        assert_eq!(wire.writer, b"7\n1DATA");
    }
}
