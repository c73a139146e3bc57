//! Line framing for JSON-RPC messages.
//!
//! MCP over stdio uses newline-delimited JSON (NDJSON): each line is exactly
//! one message. The codec only frames; it does not interpret JSON.

use serde::Serialize;

/// Default maximum line length in bytes (10 MiB).
pub const DEFAULT_MAX_LINE_SIZE: usize = 10 * 1024 * 1024;

/// Threshold for compacting the buffer.
const COMPACT_THRESHOLD: usize = 4096;

/// Splits bytes into lines and encodes messages as lines.
#[derive(Debug)]
pub struct LineCodec {
    /// Buffer for incomplete lines.
    buffer: Vec<u8>,
    /// Read position in buffer (data before this has been consumed).
    read_pos: usize,
    /// Maximum allowed line size in bytes.
    max_line_size: usize,
    /// Set while skipping the remainder of an oversized line.
    discarding: bool,
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LineCodec {
    /// Creates a codec with the default line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line_size(DEFAULT_MAX_LINE_SIZE)
    }

    /// Creates a codec with a custom line limit.
    #[must_use]
    pub fn with_max_line_size(max_line_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            read_pos: 0,
            max_line_size,
            discarding: false,
        }
    }

    /// Returns the maximum allowed line size in bytes.
    #[must_use]
    pub fn max_line_size(&self) -> usize {
        self.max_line_size
    }

    /// Encodes a message as one line, appending `\n`.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<Vec<u8>, CodecError> {
        let mut bytes = serde_json::to_vec(message)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Feeds bytes and returns every line they complete, in order.
    ///
    /// Each item is one input line: either its text (without the line
    /// terminator) or the fault that made it unusable. Blank lines are
    /// skipped. Incomplete data is buffered for the next call.
    pub fn decode(&mut self, data: &[u8]) -> Vec<Result<String, CodecError>> {
        if self.read_pos >= COMPACT_THRESHOLD {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);

        let mut lines = Vec::new();
        while let Some(offset) = self.buffer[self.read_pos..].iter().position(|&b| b == b'\n') {
            let end = self.read_pos + offset;
            let start = std::mem::replace(&mut self.read_pos, end + 1);
            if std::mem::take(&mut self.discarding) {
                // Tail of a line that was already reported as oversized.
                continue;
            }
            if let Some(line) = self.frame(start, end) {
                lines.push(line);
            }
        }

        let unread = self.buffer.len() - self.read_pos;
        if unread > self.max_line_size {
            if !self.discarding {
                lines.push(Err(CodecError::LineTooLarge(unread)));
            }
            self.discarding = true;
            self.clear_buffer();
        }

        lines
    }

    /// Flushes a final unterminated line at end of stream.
    pub fn finish(&mut self) -> Option<Result<String, CodecError>> {
        let end = self.buffer.len();
        let start = self.read_pos;
        let discarding = std::mem::take(&mut self.discarding);
        let line = if discarding {
            None
        } else {
            self.frame(start, end)
        };
        self.clear_buffer();
        line
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.clear_buffer();
        self.discarding = false;
    }

    fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }

    fn frame(&self, start: usize, end: usize) -> Option<Result<String, CodecError>> {
        let mut raw = &self.buffer[start..end];
        if let [head @ .., b'\r'] = raw {
            raw = head;
        }
        if raw.len() > self.max_line_size {
            return Some(Err(CodecError::LineTooLarge(raw.len())));
        }
        if raw.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(
            std::str::from_utf8(raw)
                .map(str::to_owned)
                .map_err(|_| CodecError::InvalidUtf8),
        )
    }
}

/// Codec error types.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A line exceeded the configured limit.
    #[error("Line too large: {0} bytes")]
    LineTooLarge(usize),
    /// A line was not valid UTF-8.
    #[error("Line is not valid UTF-8")]
    InvalidUtf8,
}
