//! Async line reader and response emitter.
//!
//! The reader owns the inbound half of the protocol stream; the emitter is
//! cloned into every in-flight request task and serializes writes so that
//! each message lands as one complete, flushed line.
//!
//! # Wire Format
//!
//! - Each message is serialized as a single line of JSON
//! - Lines are terminated by `\n` (a trailing `\r` on input is tolerated)
//! - Blank input lines are ignored
//! - UTF-8 encoding is required

use std::collections::VecDeque;
use std::sync::Arc;

use serde::Serialize;
use sensormcp_core::logging::{targets, trace};
use sensormcp_protocol::{JsonRpcRequest, JsonRpcResponse};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{CodecError, LineCodec, TransportError};

const READ_CHUNK: usize = 8 * 1024;

/// Reads framed lines from an async byte stream.
pub struct LineReader<R> {
    reader: R,
    codec: LineCodec,
    pending: VecDeque<Result<String, CodecError>>,
    chunk: Box<[u8]>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    /// Creates a reader with the default line limit.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, LineCodec::new())
    }

    /// Creates a reader with a custom codec.
    #[must_use]
    pub fn with_codec(reader: R, codec: LineCodec) -> Self {
        Self {
            reader,
            codec,
            pending: VecDeque::new(),
            chunk: vec![0; READ_CHUNK].into_boxed_slice(),
            eof: false,
        }
    }

    /// Returns the next line, or `Ok(None)` at end of stream.
    ///
    /// A line-level fault (oversized, invalid UTF-8) is returned as an error
    /// for that line only; the next call continues with the following line.
    ///
    /// # Cancel-Safety
    ///
    /// Dropping the future between lines loses no data: bytes are only
    /// consumed into the codec after a read completes.
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                let line = line?;
                trace!(target: targets::TRANSPORT, "<- {}", line);
                return Ok(Some(line));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                self.eof = true;
                self.pending.extend(self.codec.finish());
            } else {
                let lines = self.codec.decode(&self.chunk[..n]);
                self.pending.extend(lines);
            }
        }
    }
}

impl LineReader<tokio::io::Stdin> {
    /// Creates a reader over the process's standard input.
    #[must_use]
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

/// Writes protocol messages as single flushed lines.
///
/// Cloning is cheap; all clones share one writer. Lines from concurrent
/// tasks never interleave, and their order follows completion order.
pub struct ResponseEmitter<W> {
    writer: Arc<Mutex<W>>,
    codec: Arc<LineCodec>,
}

impl<W> Clone for ResponseEmitter<W> {
    fn clone(&self) -> Self {
        Self {
            writer: Arc::clone(&self.writer),
            codec: Arc::clone(&self.codec),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send + 'static> ResponseEmitter<W> {
    /// Creates an emitter over the given writer.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
            codec: Arc::new(LineCodec::new()),
        }
    }

    /// Writes a response line.
    pub async fn send_response(&self, response: &JsonRpcResponse) -> Result<(), TransportError> {
        self.write_message(response).await
    }

    /// Writes a server-initiated notification line.
    pub async fn send_notification(
        &self,
        notification: &JsonRpcRequest,
    ) -> Result<(), TransportError> {
        self.write_message(notification).await
    }

    /// Flushes the underlying writer.
    pub async fn flush(&self) -> Result<(), TransportError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }

    /// Writes one line.
    ///
    /// Once the writer lock is held, the write and flush run in their own
    /// task. Aborting the caller then cannot leave half a line on the wire,
    /// and a later [`flush`](Self::flush) waits for that line to land.
    async fn write_message<T: Serialize>(&self, message: &T) -> Result<(), TransportError> {
        let bytes = self.codec.encode(message)?;
        let writer = Arc::clone(&self.writer).lock_owned().await;
        match tokio::spawn(write_line(writer, bytes)).await {
            Ok(result) => result,
            Err(e) => Err(TransportError::Io(std::io::Error::other(e))),
        }
    }
}

async fn write_line<W>(mut writer: OwnedMutexGuard<W>, bytes: Vec<u8>) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!(
        target: targets::TRANSPORT,
        "-> {}",
        String::from_utf8_lossy(&bytes[..bytes.len() - 1])
    );
    Ok(())
}

impl ResponseEmitter<tokio::io::Stdout> {
    /// Creates an emitter over the process's standard output.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}
