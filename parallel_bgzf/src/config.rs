//! Engine configuration shared by [`BgzfEncoder`](crate::BgzfEncoder) and
//! [`BgzfDecoder`](crate::BgzfDecoder).

use crate::codec::{DEFAULT_BLOCK_PAYLOAD, MAX_BLOCK_PAYLOAD};
use crate::error::{BgzfError, Result};

/// Deflate compression level, from 0 (stored) to 9 (best).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    pub const NONE: Self = CompressionLevel(0);
    pub const FAST: Self = CompressionLevel(1);
    pub const DEFAULT: Self = CompressionLevel(6);
    pub const BEST: Self = CompressionLevel(9);

    /// Creates a level, rejecting anything above 9.
    pub fn new(level: u32) -> Result<Self> {
        if level > Self::BEST.0 {
            return Err(BgzfError::Config(format!(
                "compression level {} is out of range 0-9",
                level
            )));
        }
        Ok(CompressionLevel(level))
    }

    pub fn level(self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<CompressionLevel> for flate2::Compression {
    fn from(level: CompressionLevel) -> Self {
        flate2::Compression::new(level.0)
    }
}

/// How much input a single `write` call consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushMode {
    /// Consume the whole buffer, dispatching as many blocks as it fills.
    #[default]
    Full,
    /// Fill at most the current block and report a short write for the rest.
    Bounded,
}

/// Tuning knobs for the parallel engines.
///
/// # Examples
///
/// ```
/// # use parallel_bgzf::{BgzfConfig, CompressionLevel};
/// let config = BgzfConfig::default()
///     .with_threads(4)
///     .with_buffers(8)
///     .with_level(CompressionLevel::BEST);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgzfConfig {
    /// Number of worker threads.
    pub threads: usize,
    /// Number of Block buffers that may be in flight at once.
    pub buffers: usize,
    /// Compression level used by the encoder.
    pub level: CompressionLevel,
    /// Short-write behaviour of the encoder.
    pub flush_mode: FlushMode,
    /// Maximum uncompressed bytes per block.
    pub block_payload: usize,
}

impl Default for BgzfConfig {
    fn default() -> Self {
        let threads = rayon::current_num_threads().max(1);
        Self {
            threads,
            buffers: threads * 2,
            level: CompressionLevel::DEFAULT,
            flush_mode: FlushMode::Full,
            block_payload: DEFAULT_BLOCK_PAYLOAD,
        }
    }
}

impl BgzfConfig {
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_buffers(mut self, buffers: usize) -> Self {
        self.buffers = buffers;
        self
    }

    pub fn with_level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_flush_mode(mut self, flush_mode: FlushMode) -> Self {
        self.flush_mode = flush_mode;
        self
    }

    pub fn with_block_payload(mut self, block_payload: usize) -> Self {
        self.block_payload = block_payload;
        self
    }

    /// Checks that the configuration can drive an engine.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(BgzfError::Config("at least one worker thread is required".into()));
        }
        if self.buffers == 0 {
            return Err(BgzfError::Config("at least one block buffer is required".into()));
        }
        if self.block_payload == 0 || self.block_payload > MAX_BLOCK_PAYLOAD {
            return Err(BgzfError::Config(format!(
                "block payload {} is out of range 1-{}",
                self.block_payload, MAX_BLOCK_PAYLOAD
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = BgzfConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffers, config.threads * 2);
        assert_eq!(config.block_payload, 0xff00);
    }

    #[test]
    fn test_rejects_zero_threads_and_buffers() {
        assert!(BgzfConfig::default().with_threads(0).validate().is_err());
        assert!(BgzfConfig::default().with_buffers(0).validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let config = BgzfConfig::default().with_block_payload(MAX_BLOCK_PAYLOAD + 1);
        assert!(matches!(config.validate(), Err(BgzfError::Config(_))));
        let config = BgzfConfig::default().with_block_payload(MAX_BLOCK_PAYLOAD);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_compression_level_range() {
        assert!(CompressionLevel::new(9).is_ok());
        assert!(CompressionLevel::new(10).is_err());
        assert_eq!(CompressionLevel::default(), CompressionLevel::DEFAULT);
    }
}
