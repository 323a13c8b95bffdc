use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::trace;

// Wire framing constants
pub const MAX_LINE_BYTES: usize = 64 * 1024;
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(6);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(6);

/// Configuration for line framing
#[derive(Debug, Clone)]
pub struct WireConfig {
    /// Maximum accepted length of a single line, newline excluded
    pub max_line_bytes: usize,
    /// Timeout applied by [`LineCodec::read_frame_timed`]
    pub read_timeout: Duration,
    /// Timeout applied by [`LineCodec::write_frame_timed`]
    pub write_timeout: Duration,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: MAX_LINE_BYTES,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Errors that can occur while framing messages on the wire
#[derive(Error, Debug)]
pub enum WireError {
    /// The peer closed the stream cleanly, before any byte of a new line
    #[error("connection closed")]
    ConnectionClosed,

    /// The stream ended in the middle of a line
    #[error("stream ended mid-line after {got} bytes")]
    TruncatedLine { got: usize },

    /// A line exceeded the configured maximum
    #[error("line exceeds maximum length of {max} bytes")]
    LineTooLong { max: usize },

    /// An outgoing message rendered to more than one line
    #[error("message contains an embedded newline")]
    EmbeddedNewline,

    /// An incoming line was not a well-formed message
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// An outgoing message failed to serialize
    #[error("message encoding failed: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("read timed out after {timeout:?}")]
    ReadTimeout { timeout: Duration },

    #[error("write timed out after {timeout:?}")]
    WriteTimeout { timeout: Duration },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Whether this error is a transport fault, as opposed to a framing or
    /// encoding fault. Transport faults are the ones worth retrying on a
    /// fresh connection.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            WireError::ConnectionClosed
                | WireError::TruncatedLine { .. }
                | WireError::ReadTimeout { .. }
                | WireError::WriteTimeout { .. }
                | WireError::Io(_)
        )
    }
}

/// Newline-delimited message framing over any async byte stream.
///
/// Each message is one UTF-8 text line terminated by `\n`; writes are
/// flushed immediately so a frame is never left sitting in a buffer.
#[derive(Debug, Clone, Default)]
pub struct LineCodec {
    config: WireConfig,
}

impl LineCodec {
    pub fn new(config: WireConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WireConfig {
        &self.config
    }

    /// Render a message to its single-line form, newline excluded.
    pub fn encode<T: Serialize>(&self, message: &T) -> Result<String, WireError> {
        let line = serde_json::to_string(message).map_err(WireError::Encode)?;
        if line.contains('\n') {
            return Err(WireError::EmbeddedNewline);
        }
        if line.len() > self.config.max_line_bytes {
            return Err(WireError::LineTooLong {
                max: self.config.max_line_bytes,
            });
        }
        Ok(line)
    }

    /// Write one message as one line and flush it.
    pub async fn write_frame<W, T>(&self, writer: &mut W, message: &T) -> Result<(), WireError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        let line = self.encode(message)?;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        trace!(bytes = line.len() + 1, "wrote frame");
        Ok(())
    }

    /// Read one line and decode it into a message.
    ///
    /// Returns [`WireError::ConnectionClosed`] when the stream ends before
    /// the first byte of a line, which is the peer's normal way of hanging
    /// up between messages.
    pub async fn read_frame<R, T>(&self, reader: &mut R) -> Result<T, WireError>
    where
        R: AsyncBufRead + Unpin,
        T: DeserializeOwned,
    {
        let max = self.config.max_line_bytes;
        let mut line = String::new();
        // Reading through a cap keeps a hostile peer from growing the
        // buffer without bound before the length check runs.
        let mut limited = reader.take(max as u64 + 1);
        let n = limited.read_line(&mut line).await?;
        if n == 0 {
            return Err(WireError::ConnectionClosed);
        }
        if !line.ends_with('\n') {
            if line.len() > max {
                return Err(WireError::LineTooLong { max });
            }
            return Err(WireError::TruncatedLine { got: line.len() });
        }
        let text = line.trim_end_matches('\n').trim_end_matches('\r');
        trace!(bytes = n, "read frame");
        serde_json::from_str(text).map_err(WireError::Malformed)
    }

    /// [`Self::write_frame`] bounded by the configured write timeout.
    pub async fn write_frame_timed<W, T>(
        &self,
        writer: &mut W,
        message: &T,
    ) -> Result<(), WireError>
    where
        W: AsyncWrite + Unpin,
        T: Serialize,
    {
        match timeout(self.config.write_timeout, self.write_frame(writer, message)).await {
            Ok(result) => result,
            Err(_) => Err(WireError::WriteTimeout {
                timeout: self.config.write_timeout,
            }),
        }
    }

    /// [`Self::read_frame`] bounded by the configured read timeout.
    pub async fn read_frame_timed<R, T>(&self, reader: &mut R) -> Result<T, WireError>
    where
        R: AsyncBufRead + Unpin,
        T: DeserializeOwned,
    {
        match timeout(self.config.read_timeout, self.read_frame(reader)).await {
            Ok(result) => result,
            Err(_) => Err(WireError::ReadTimeout {
                timeout: self.config.read_timeout,
            }),
        }
    }
}
