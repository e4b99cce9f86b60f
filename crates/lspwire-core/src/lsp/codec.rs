//! LSP base-protocol framing.
//!
//! Outgoing messages are written as:
//! ```text
//! Content-Length: 123\r\n
//! \r\n
//! {"jsonrpc":"2.0",...}
//! ```
//! Incoming frames are read either with proper header framing or, for servers
//! that need it, line by line where every line starting with `{` is a body.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::{debug, trace, warn};

use crate::error::Result;

/// How incoming frames are delimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    /// Header lines up to a blank line, then exactly `Content-Length` bytes.
    #[default]
    Headers,
    /// One JSON body per line; lines not starting with `{` are skipped.
    Lines,
}

/// Unit in which the outgoing `Content-Length` is counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// UTF-8 bytes, as conforming servers expect.
    #[default]
    Bytes,
    /// Unicode scalar values.
    Chars,
}

/// Failure while reading one frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The underlying stream failed. Terminal for the read loop.
    #[error("I/O error while reading frame: {0}")]
    Io(#[from] std::io::Error),

    /// A header block ended without a `Content-Length` header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// The `Content-Length` value is not a non-negative integer.
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),

    /// A line grew past its limit before a terminator was seen. The line was
    /// skipped without being buffered.
    #[error("line exceeds limit of {limit} bytes")]
    LineTooLong {
        /// Limit that was hit.
        limit: usize,
    },

    /// The announced body exceeds the configured limit and was discarded.
    #[error("message of {length} bytes exceeds limit of {limit} bytes")]
    TooLarge {
        /// Announced or observed body length.
        length: usize,
        /// Configured limit.
        limit: usize,
    },
}

/// Longest header line accepted before the line is skipped.
pub const MAX_HEADER_LINE_BYTES: usize = 8 * 1024;

impl FrameError {
    /// Whether the reader can continue after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Compute the `Content-Length` of `body` in the given unit.
#[must_use]
pub fn content_length(body: &str, unit: LengthUnit) -> usize {
    match unit {
        LengthUnit::Bytes => body.len(),
        LengthUnit::Chars => body.chars().count(),
    }
}

/// Serialize a message and prefix it with its `Content-Length` header.
///
/// # Errors
///
/// Returns an error if the message cannot be serialized.
pub fn encode_frame<T: Serialize + ?Sized>(message: &T, unit: LengthUnit) -> Result<Vec<u8>> {
    let body = serde_json::to_string(message)?;
    let length = content_length(&body, unit);

    let mut frame = format!("Content-Length: {length}\r\n\r\n").into_bytes();
    frame.extend_from_slice(body.as_bytes());
    Ok(frame)
}

/// Parse a frame body as JSON.
///
/// Malformed bodies are logged and yield `None`.
#[must_use]
pub fn decode(body: &[u8]) -> Option<Value> {
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(
                error = %e,
                body = %String::from_utf8_lossy(body),
                "discarding malformed JSON body"
            );
            None
        }
    }
}

/// Reads frame bodies from a buffered byte stream.
#[derive(Debug)]
pub struct FrameReader<R> {
    reader: R,
    mode: FramingMode,
    max_message_bytes: usize,
}

impl<R> FrameReader<R>
where
    R: AsyncBufRead + Unpin,
{
    /// Create a frame reader over `reader`.
    #[must_use]
    pub const fn new(reader: R, mode: FramingMode, max_message_bytes: usize) -> Self {
        Self {
            reader,
            mode,
            max_message_bytes,
        }
    }

    /// Read the next frame body.
    ///
    /// Returns `Ok(None)` once the stream reaches EOF, including EOF in the
    /// middle of a frame.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::Io`] if the stream fails; other variants describe
    /// a single bad frame and the next call resumes with the following one.
    pub async fn next_frame(&mut self) -> std::result::Result<Option<Vec<u8>>, FrameError> {
        match self.mode {
            FramingMode::Headers => self.read_headered().await,
            FramingMode::Lines => self.read_line_body().await,
        }
    }

    async fn read_headered(&mut self) -> std::result::Result<Option<Vec<u8>>, FrameError> {
        let Some(length) = self.read_headers().await? else {
            return Ok(None);
        };

        if length > self.max_message_bytes {
            let mut oversized = (&mut self.reader).take(length as u64);
            tokio::io::copy(&mut oversized, &mut tokio::io::sink()).await?;
            return Err(FrameError::TooLarge {
                length,
                limit: self.max_message_bytes,
            });
        }

        let mut body = vec![0u8; length];
        match self.reader.read_exact(&mut body).await {
            Ok(_) => {
                trace!(length, "read frame body");
                Ok(Some(body))
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!(length, "stream closed in the middle of a frame body");
                Ok(None)
            }
            Err(e) => Err(FrameError::Io(e)),
        }
    }

    /// Read headers until the blank line and extract the body length.
    async fn read_headers(&mut self) -> std::result::Result<Option<usize>, FrameError> {
        let mut content_length = None;
        let mut saw_header = false;
        let mut line = Vec::new();

        loop {
            match self.read_line_capped(&mut line, MAX_HEADER_LINE_BYTES).await? {
                Line::Eof => {
                    if saw_header {
                        debug!("stream closed in the middle of a header block");
                    }
                    return Ok(None);
                }
                Line::TooLong => {
                    return Err(FrameError::LineTooLong {
                        limit: MAX_HEADER_LINE_BYTES,
                    });
                }
                Line::Complete => {}
            }

            let text = String::from_utf8_lossy(&line);
            let trimmed = text.trim();
            if trimmed.is_empty() {
                // Blank lines between frames are tolerated.
                if saw_header {
                    break;
                }
                continue;
            }
            saw_header = true;

            match trimmed.split_once(':') {
                Some((key, value)) if key.trim().eq_ignore_ascii_case("content-length") => {
                    content_length = Some(value.trim().to_string());
                }
                Some(_) => {}
                None => warn!(header = %trimmed, "malformed header"),
            }
        }

        let value = content_length.ok_or(FrameError::MissingContentLength)?;
        value
            .parse::<usize>()
            .map(Some)
            .map_err(|e| FrameError::InvalidContentLength(format!("{value}: {e}")))
    }

    async fn read_line_body(&mut self) -> std::result::Result<Option<Vec<u8>>, FrameError> {
        // Room for the line terminator.
        let cap = self.max_message_bytes.saturating_add(2);
        let mut line = Vec::new();

        loop {
            match self.read_line_capped(&mut line, cap).await? {
                Line::Eof => return Ok(None),
                Line::TooLong => {
                    return Err(FrameError::LineTooLong {
                        limit: self.max_message_bytes,
                    });
                }
                Line::Complete => {}
            }

            let body = line.trim_ascii();
            if !body.starts_with(b"{") {
                trace!(line = %String::from_utf8_lossy(body), "skipping non-body line");
                continue;
            }
            if body.len() > self.max_message_bytes {
                return Err(FrameError::TooLarge {
                    length: body.len(),
                    limit: self.max_message_bytes,
                });
            }
            return Ok(Some(body.to_vec()));
        }
    }

    /// Read one `\n`-terminated line into `line`, buffering at most `cap`
    /// bytes. A longer line is skipped up to its terminator.
    async fn read_line_capped(&mut self, line: &mut Vec<u8>, cap: usize) -> std::io::Result<Line> {
        line.clear();

        loop {
            let (used, terminated, too_long) = {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    return Ok(if line.is_empty() {
                        Line::Eof
                    } else {
                        Line::Complete
                    });
                }
                let newline = available.iter().position(|&b| b == b'\n');
                let used = newline.map_or(available.len(), |i| i + 1);
                let too_long = line.len() + used > cap;
                if !too_long {
                    line.extend_from_slice(&available[..used]);
                }
                (used, newline.is_some(), too_long)
            };
            self.reader.consume(used);

            if too_long {
                line.clear();
                if !terminated {
                    self.skip_line().await?;
                }
                warn!(limit = cap, "skipping overlong line");
                return Ok(Line::TooLong);
            }
            if terminated {
                return Ok(Line::Complete);
            }
        }
    }

    /// Discard input up to and including the next `\n`.
    async fn skip_line(&mut self) -> std::io::Result<()> {
        loop {
            let (used, terminated) = {
                let available = self.reader.fill_buf().await?;
                if available.is_empty() {
                    return Ok(());
                }
                match available.iter().position(|&b| b == b'\n') {
                    Some(i) => (i + 1, true),
                    None => (available.len(), false),
                }
            };
            self.reader.consume(used);
            if terminated {
                return Ok(());
            }
        }
    }
}

/// Outcome of a capped line read.
enum Line {
    Complete,
    TooLong,
    Eof,
}
