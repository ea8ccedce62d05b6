//! Parallel BGZF compression behind a `std::io::Write` interface.
//!
//! # Architecture
//!
//! 1. **Caller thread**: copies bytes into the current block; a full block is
//!    tagged with the next sequence number and handed to the worker pool.
//! 2. **Worker pool**: compresses blocks in any order.
//! 3. **Ordering gate**: whichever worker completes the missing lowest block
//!    writes the contiguous run to the sink and returns those blocks to the
//!    pool.
//!
//! The pool bounds memory: once every buffer is in flight, `write` waits for
//! the sink to catch up.

use crate::block::{Block, Phase};
use crate::codec::{self, FrameInfo, BGZF_EOF};
use crate::config::{BgzfConfig, CompressionLevel, FlushMode};
use crate::dispatch::{Dispatcher, FailureSlot, Stage};
use crate::error::{BgzfError, Result};
use crate::gate::OrderingGate;
use crate::index;
use crate::pool::BufferPool;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Output side of the gate: only ever touched under the gate lock.
struct Sink<W> {
    writer: Option<W>,
    index: Option<Box<dyn Write + Send>>,
    blocks_written: u64,
    bytes_out: u64,
    // Set once a block could not be written; later blocks would leave a hole.
    broken: bool,
}

impl<W: Write> Sink<W> {
    fn write_frames(&mut self, bytes: &[u8], frames: &[FrameInfo]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(BgzfError::Closed)?;
        writer.write_all(bytes)?;
        self.bytes_out += bytes.len() as u64;
        self.blocks_written += frames.len() as u64;
        if let Some(index) = self.index.as_mut() {
            for frame in frames {
                index::write_entry(index, frame)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        if let Some(index) = self.index.as_mut() {
            index.flush()?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let eof = FrameInfo {
            uncompressed_size: 0,
            compressed_size: BGZF_EOF.len(),
        };
        self.write_frames(&BGZF_EOF, &[eof])?;
        self.flush()
    }
}

struct EncoderShared<W> {
    pool: BufferPool,
    gate: OrderingGate<Block, Sink<W>>,
}

/// Multi-threaded BGZF writer.
///
/// Bytes written are cut into blocks of [`BgzfConfig::block_payload`] bytes,
/// compressed on a worker pool and written to the sink in their original
/// order. `Write::flush` pushes everything written so far through to the
/// sink and leaves the stream open. [`flush_stream`](Self::flush_stream)
/// also appends the EOF marker; the stream is complete afterwards and accepts
/// no more data. Dropping an open encoder finishes it.
///
/// # Examples
///
/// ```
/// # use parallel_bgzf::{BgzfConfig, BgzfEncoder};
/// # use std::io::Write;
/// let mut encoder = BgzfEncoder::new(Vec::new(), BgzfConfig::default().with_threads(2))?;
/// encoder.write_all(b"ACGT")?;
/// let bgzf = encoder.finish()?;
/// assert!(bgzf.ends_with(&parallel_bgzf::BGZF_EOF));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct BgzfEncoder<W: Write + Send + 'static> {
    shared: Arc<EncoderShared<W>>,
    dispatcher: Dispatcher,
    config: BgzfConfig,
    current: Option<Block>,
    next_seq: u64,
    bytes_in: u64,
    closed: bool,
}

impl<W: Write + Send + 'static> BgzfEncoder<W> {
    pub fn new(writer: W, config: BgzfConfig) -> Result<Self> {
        Self::build(writer, None, config)
    }

    /// Like [`new`](Self::new), also emitting one index record per framed
    /// block to `index` (see [`crate::index`]).
    pub fn with_index<I>(writer: W, index: I, config: BgzfConfig) -> Result<Self>
    where
        I: Write + Send + 'static,
    {
        Self::build(writer, Some(Box::new(index)), config)
    }

    fn build(writer: W, index: Option<Box<dyn Write + Send>>, config: BgzfConfig) -> Result<Self> {
        config.validate()?;
        let dispatcher = Dispatcher::new(config.threads, "bgzf-deflate")?;
        debug!(
            threads = config.threads,
            buffers = config.buffers,
            level = config.level.level(),
            payload = config.block_payload,
            "starting BGZF encoder"
        );

        let sink = Sink {
            writer: Some(writer),
            index,
            blocks_written: 0,
            bytes_out: 0,
            broken: false,
        };
        Ok(Self {
            shared: Arc::new(EncoderShared {
                pool: BufferPool::new(config.buffers),
                gate: OrderingGate::new(sink),
            }),
            dispatcher,
            config,
            current: None,
            next_seq: 0,
            bytes_in: 0,
            closed: false,
        })
    }

    fn failure(&self) -> &Arc<FailureSlot> {
        self.dispatcher.failure()
    }

    fn check_open(&self) -> Result<()> {
        self.failure().check()?;
        if self.closed {
            return Err(BgzfError::Closed);
        }
        Ok(())
    }

    /// Buffers `buf`, dispatching every block it fills.
    ///
    /// In [`FlushMode::Full`] the whole buffer is consumed; in
    /// [`FlushMode::Bounded`] at most the rest of the current block is, and the
    /// count taken is returned.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<usize> {
        self.check_open()?;
        let payload = self.config.block_payload;
        let mut written = 0;

        while written < buf.len() {
            let block = self.current_block()?;
            let take = (payload - block.input.len()).min(buf.len() - written);
            block.input.extend_from_slice(&buf[written..written + take]);
            written += take;

            if block.input.len() == payload {
                self.dispatch_current();
            }
            if self.config.flush_mode == FlushMode::Bounded {
                break;
            }
        }

        self.bytes_in += written as u64;
        Ok(written)
    }

    pub fn put(&mut self, byte: u8) -> Result<()> {
        self.write_bytes(&[byte]).map(|_| ())
    }

    fn current_block(&mut self) -> Result<&mut Block> {
        let block = match self.current.take() {
            Some(block) => block,
            None => {
                let mut block = self.shared.pool.acquire().ok_or(BgzfError::Closed)?;
                if let Err(e) = self.failure().check() {
                    self.shared.pool.release(block);
                    return Err(e);
                }
                block.advance(Phase::Writable);
                block
            }
        };
        Ok(self.current.insert(block))
    }

    /// Hands the current block to the worker pool under the next sequence number.
    fn dispatch_current(&mut self) {
        let Some(mut block) = self.current.take() else {
            return;
        };
        let seq = self.next_seq;
        self.next_seq += 1;
        block.assign(seq, Phase::Full);
        trace!(seq, id = block.id(), bytes = block.input.len(), "dispatching block");

        let shared = self.shared.clone();
        let failure = self.failure().clone();
        let level = self.config.level;
        self.dispatcher
            .submit(seq, move |skip| compress_and_release(&shared, &failure, block, level, skip));
    }

    /// Dispatches the partial block and waits until every block has reached
    /// the sink.
    fn drain(&mut self) -> Result<()> {
        if let Some(block) = self.current.take() {
            if block.input.is_empty() {
                self.shared.pool.release(block);
            } else {
                self.current = Some(block);
                self.dispatch_current();
            }
        }
        self.shared.pool.wait_drained();
        self.failure().check()
    }

    /// Writes out every byte accepted so far, then flushes the sink and the
    /// index. The stream stays open; a partial block is emitted short.
    pub fn flush_blocks(&mut self) -> Result<()> {
        self.check_open()?;
        self.drain()?;
        let seq = self.next_seq;
        let failure = self.failure().clone();
        self.shared
            .gate
            .with_context(|sink| sink.flush())
            .map_err(|e| {
                failure.record(seq, Stage::Write, e.clone());
                e
            })
    }

    /// Compresses any buffered bytes, waits until every block has reached the
    /// sink and writes the EOF marker. Calling it again is a no-op.
    pub fn flush_stream(&mut self) -> Result<()> {
        if self.closed {
            return self.failure().check();
        }
        let drained = self.drain();
        self.closed = true;
        drained?;

        let eof_seq = self.next_seq;
        let failure = self.failure().clone();
        self.shared
            .gate
            .with_context(|sink| sink.finish())
            .map_err(|e| {
                failure.record(eof_seq, Stage::Write, e.clone());
                e
            })?;

        debug!(
            blocks = self.blocks_written(),
            bytes_in = self.bytes_in,
            bytes_out = self.bytes_out(),
            "BGZF stream finished"
        );
        Ok(())
    }

    /// Flushes the stream; the encoder cannot be written to afterwards.
    pub fn close(&mut self) -> Result<()> {
        self.flush_stream()
    }

    pub fn finish(mut self) -> Result<W> {
        self.flush_stream()?;
        self.shared
            .gate
            .with_context(|sink| sink.writer.take())
            .ok_or(BgzfError::Closed)
    }

    /// Physical framed blocks written so far, EOF marker included.
    pub fn blocks_written(&self) -> u64 {
        self.shared.gate.with_context(|sink| sink.blocks_written)
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.shared.gate.with_context(|sink| sink.bytes_out)
    }

    pub fn config(&self) -> &BgzfConfig {
        &self.config
    }
}

/// Worker job: compress one block, then push it through the ordering gate.
fn compress_and_release<W: Write>(
    shared: &EncoderShared<W>,
    failure: &FailureSlot,
    mut block: Block,
    level: CompressionLevel,
    skip: bool,
) {
    let seq = block.seq();
    if !skip {
        block.advance(Phase::Compressing);
        let result =
            codec::compress_block_into(&block.input, level, &mut block.output, &mut block.frames);
        match result {
            Ok(()) => block.advance(Phase::Compressed),
            Err(e) => {
                failure.record(seq, Stage::Compress, e.clone());
                block.fail(e);
            }
        }
    }

    shared.gate.push_and_release(seq, block, |sink, seq, mut block| {
        if block.phase() == Phase::Compressed && !sink.broken {
            block.advance(Phase::Writing);
            if let Err(e) = sink.write_frames(&block.output, &block.frames) {
                failure.record(seq, Stage::Write, e);
                sink.broken = true;
            } else {
                trace!(seq, bytes = block.output.len(), "wrote block");
            }
        } else {
            sink.broken = true;
        }
        shared.pool.release(block);
    });
}

impl<W: Write + Send + 'static> Write for BgzfEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(self.write_bytes(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(self.flush_blocks()?)
    }
}

impl<W: Write + Send + 'static> Drop for BgzfEncoder<W> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.flush_stream() {
                warn!(error = %e, "implicit close of BGZF encoder failed");
            }
        }
        self.shared.pool.shutdown();
    }
}
