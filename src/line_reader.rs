//! Line Reader: FIFO access to a live text stream
//!
//! A background task splits the stream into lines and pushes them into an
//! unbounded channel; the channel is the buffer. `next_line` returns the head
//! of the buffer immediately when one is waiting and otherwise suspends until
//! the next line arrives or the stream ends.
//!
//! ## Closing
//!
//! Once the stream ends (EOF, read error, or `close()`), a pending or future
//! `next_line` fails with `HarnessError::LineReaderClosed`. Lines buffered
//! before the close are still handed out first.

use crate::error::{HarnessError, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Async line-at-a-time view over a stream
pub struct LineReader {
    rx: UnboundedReceiver<String>,
    pump: Option<JoinHandle<()>>,
}

impl LineReader {
    /// Start pumping lines out of `reader`. Must be called inside a tokio runtime.
    pub fn new<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = unbounded_channel();
        let pump = tokio::spawn(pump_lines(reader, tx));
        Self {
            rx,
            pump: Some(pump),
        }
    }

    /// Take the oldest unread line, waiting for one if the buffer is empty
    pub async fn next_line(&mut self) -> Result<String> {
        self.rx.recv().await.ok_or(HarnessError::LineReaderClosed)
    }

    /// Stop reading the underlying stream.
    ///
    /// Already-buffered lines can still be drained; after that every read
    /// fails with `LineReaderClosed`.
    pub fn close(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        self.rx.close();
    }

    /// Number of lines received but not yet consumed
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// True once no further lines can arrive (EOF, read error, or `close()`).
    /// Lines already buffered may still be read.
    pub fn is_closed(&self) -> bool {
        self.rx.is_closed()
    }
}

impl Drop for LineReader {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Split `reader` into lines until EOF, an I/O error, or the receiver goes away.
///
/// Terminators (`\n` and `\r\n`) are stripped. Invalid UTF-8 is replaced
/// rather than treated as fatal.
async fn pump_lines<R>(reader: R, tx: UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                trace!(line = %line, "<<");
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("output stream read failed: {}", e);
                break;
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_lines_arrive_in_order() {
        let mock = tokio_test::io::Builder::new()
            .read(b"first\nsecond\n")
            .read(b"third\n")
            .build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.next_line().await.unwrap(), "first");
        assert_eq!(reader.next_line().await.unwrap(), "second");
        assert_eq!(reader.next_line().await.unwrap(), "third");
    }

    #[tokio::test]
    async fn test_eof_fails_with_closed() {
        let mock = tokio_test::io::Builder::new().read(b"only\n").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.next_line().await.unwrap(), "only");
        let err = reader.next_line().await.unwrap_err();
        assert!(matches!(err, HarnessError::LineReaderClosed));
    }

    #[tokio::test]
    async fn test_partial_lines_are_joined() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Found 0 err")
            .read(b"ors. Watching for file changes.\r\n")
            .build();
        let mut reader = LineReader::new(mock);

        assert_eq!(
            reader.next_line().await.unwrap(),
            "Found 0 errors. Watching for file changes."
        );
    }

    #[tokio::test]
    async fn test_is_closed_after_eof() {
        let mock = tokio_test::io::Builder::new().read(b"last\n").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.next_line().await.unwrap(), "last");
        assert!(reader.next_line().await.is_err());
        assert!(reader.is_closed());
    }

    #[tokio::test]
    async fn test_open_stream_is_not_closed() {
        let (_writer, stream) = tokio::io::duplex(64);
        let reader = LineReader::new(stream);
        assert!(!reader.is_closed());
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let mock = tokio_test::io::Builder::new().read(b"a\ntail").build();
        let mut reader = LineReader::new(mock);

        assert_eq!(reader.next_line().await.unwrap(), "a");
        assert_eq!(reader.next_line().await.unwrap(), "tail");
        assert!(reader.next_line().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let mock = tokio_test::io::Builder::new().read(b"ok \xff bytes\n").build();
        let mut reader = LineReader::new(mock);

        let line = reader.next_line().await.unwrap();
        assert!(line.starts_with("ok "));
        assert!(line.ends_with(" bytes"));
    }

    #[tokio::test]
    async fn test_buffered_lines_returned_without_waiting() {
        let (mut writer, stream) = tokio::io::duplex(64);
        let mut reader = LineReader::new(stream);

        writer.write_all(b"one\ntwo\n").await.unwrap();
        // Wait for the pump to drain the pipe
        while reader.buffered() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(reader.next_line().await.unwrap(), "one");
        assert_eq!(reader.buffered(), 1);
        assert_eq!(reader.next_line().await.unwrap(), "two");
        assert_eq!(reader.buffered(), 0);
    }

    #[tokio::test]
    async fn test_pending_read_fails_when_stream_closes() {
        let (writer, stream) = tokio::io::duplex(64);
        let mut reader = LineReader::new(stream);

        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(writer);
        });

        let err = reader.next_line().await.unwrap_err();
        assert!(matches!(err, HarnessError::LineReaderClosed));
        closer.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_keeps_buffered_lines() {
        let (mut writer, stream) = tokio::io::duplex(64);
        let mut reader = LineReader::new(stream);

        writer.write_all(b"kept\n").await.unwrap();
        while reader.buffered() < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        reader.close();
        assert!(reader.is_closed());
        assert_eq!(reader.next_line().await.unwrap(), "kept");
        assert!(matches!(
            reader.next_line().await,
            Err(HarnessError::LineReaderClosed)
        ));
    }

    #[tokio::test]
    async fn test_close_with_open_writer_does_not_hang() {
        let (_writer, stream) = tokio::io::duplex(64);
        let mut reader = LineReader::new(stream);

        reader.close();
        let res = tokio::time::timeout(Duration::from_secs(1), reader.next_line()).await;
        assert!(matches!(res, Ok(Err(HarnessError::LineReaderClosed))));
    }
}
