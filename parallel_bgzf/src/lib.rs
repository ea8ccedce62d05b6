//! Parallel BGZF compression and decompression.
//!
//! BGZF is a series of independent gzip members of at most 64 KiB each, which
//! lets blocks be deflated and inflated on many threads at once. The engines
//! here keep a fixed pool of block buffers in flight, run the codec on a rayon
//! pool and put the blocks back in sequence order before they reach the sink
//! or the caller.
//!
//! ```no_run
//! use parallel_bgzf::{BgzfConfig, BgzfDecoder, BgzfEncoder};
//! use std::io::{Read, Write};
//!
//! # fn main() -> parallel_bgzf::Result<()> {
//! let mut encoder = BgzfEncoder::new(Vec::new(), BgzfConfig::default())?;
//! encoder.write_all(b"hello bgzf")?;
//! let compressed = encoder.finish()?;
//!
//! let mut decoder = BgzfDecoder::new(std::io::Cursor::new(compressed), BgzfConfig::default())?;
//! let mut text = String::new();
//! decoder.read_to_string(&mut text)?;
//! assert_eq!(text, "hello bgzf");
//! # Ok(())
//! # }
//! ```

pub mod block;
pub mod codec;
pub mod config;
pub mod decoder;
pub mod dispatch;
pub mod encoder;
pub mod error;
pub mod gate;
pub mod index;
pub mod pool;

pub use block::{Block, BlockId, Phase};
pub use codec::{
    block_size, compress_block, compress_block_into, decompress_block, decompress_block_into,
    is_bgzf_header, read_frame, FrameInfo, BGZF_EOF, BLOCK_FOOTER_LEN, BLOCK_HEADER_LEN,
    DEFAULT_BLOCK_PAYLOAD, MAX_BLOCK_PAYLOAD, MAX_BLOCK_SIZE,
};
pub use config::{BgzfConfig, CompressionLevel, FlushMode};
pub use decoder::BgzfDecoder;
pub use dispatch::{Dispatcher, FailureSlot, Stage};
pub use encoder::BgzfEncoder;
pub use error::{BgzfError, Result};
pub use gate::OrderingGate;
pub use index::{read_index, BlockIndex, VirtualOffset};
pub use pool::BufferPool;
