//! Transport layer for the sensor MCP server.
//!
//! - [`LineCodec`] splits a byte stream into lines and encodes messages as
//!   single lines
//! - [`LineReader`] pulls lines from any [`tokio::io::AsyncRead`]
//! - [`ResponseEmitter`] writes one flushed line per message to any
//!   [`tokio::io::AsyncWrite`], shared between concurrent request tasks

#![forbid(unsafe_code)]

mod codec;
mod stdio;

pub use codec::{CodecError, DEFAULT_MAX_LINE_SIZE, LineCodec};
pub use stdio::{LineReader, ResponseEmitter};

/// Transport error types.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A line could not be framed or a message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl TransportError {
    /// Returns true for per-line faults that leave the stream usable.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Codec(CodecError::LineTooLarge(_) | CodecError::InvalidUtf8)
        )
    }
}
