//! Error types for the BGZF engines.

use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for BGZF operations.
pub type Result<T> = std::result::Result<T, BgzfError>;

/// Errors raised by the block codec and the parallel engines.
///
/// The type is `Clone` so that the single failure recorded by an engine can be
/// handed back on every later call to `write`, `flush`, `close` or `read`.
#[derive(Debug, Clone, Error)]
pub enum BgzfError {
    /// Malformed block: bad magic, header field, block size, CRC or length.
    #[error("invalid BGZF block: {0}")]
    Format(String),

    /// The deflate engine failed, or a block could not be framed.
    #[error("codec failure: {0}")]
    Codec(String),

    /// The source ended in the middle of a block.
    #[error("truncated BGZF stream: {0}")]
    Truncated(String),

    /// Reading from the source or writing to the sink failed.
    #[error("stream I/O error: {0}")]
    StreamIo(Arc<io::Error>),

    /// Rejected engine configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The stream was already flushed and closed.
    #[error("stream already closed")]
    Closed,
}

impl BgzfError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        BgzfError::Format(msg.into())
    }

    pub(crate) fn truncated(msg: impl Into<String>) -> Self {
        BgzfError::Truncated(msg.into())
    }

    pub(crate) fn codec(msg: impl Into<String>) -> Self {
        BgzfError::Codec(msg.into())
    }
}

impl From<io::Error> for BgzfError {
    fn from(err: io::Error) -> Self {
        BgzfError::StreamIo(Arc::new(err))
    }
}

impl From<BgzfError> for io::Error {
    fn from(err: BgzfError) -> Self {
        let kind = match &err {
            BgzfError::Format(_) => io::ErrorKind::InvalidData,
            BgzfError::Truncated(_) => io::ErrorKind::UnexpectedEof,
            BgzfError::Config(_) => io::ErrorKind::InvalidInput,
            BgzfError::Closed => io::ErrorKind::BrokenPipe,
            BgzfError::Codec(_) => io::ErrorKind::Other,
            BgzfError::StreamIo(inner) => inner.kind(),
        };
        io::Error::new(kind, err)
    }
}
