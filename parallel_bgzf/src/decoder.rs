//! Parallel BGZF decompression behind a `std::io::Read` interface.
//!
//! A reader thread frames blocks off the source and queues each one for
//! decompression on the worker pool. Finished blocks wait in the ordering gate
//! until the caller's `read` asks for them, strictly by sequence number.

use crate::block::{Block, Phase};
use crate::codec;
use crate::config::BgzfConfig;
use crate::dispatch::{Dispatcher, FailureSlot, Stage};
use crate::error::{BgzfError, Result};
use crate::gate::OrderingGate;
use crate::pool::BufferPool;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, trace, warn};

struct DecoderShared {
    pool: BufferPool,
    gate: OrderingGate<Block>,
    blocks_read: AtomicU64,
}

/// Multi-threaded reader of one BGZF stream.
///
/// The stream ends at the first block that inflates to nothing (the EOF
/// marker) or, with a warning, where the source ends on a block boundary.
/// After end of stream every `read` returns 0. The first error is terminal:
/// it is returned by that `read` and by every later one, and no bytes from the
/// failing block or beyond are ever delivered.
pub struct BgzfDecoder {
    shared: Arc<DecoderShared>,
    failure: Arc<FailureSlot>,
    dispatcher: Option<Arc<Dispatcher>>,
    reader: Option<JoinHandle<()>>,
    current: Option<Block>,
    last_read: usize,
    finished: bool,
    fault: Option<BgzfError>,
}

impl BgzfDecoder {
    pub fn open<P: AsRef<Path>>(path: P, config: BgzfConfig) -> Result<Self> {
        let file = File::open(path)?;
        // The map is read-only; the file must not be truncated while decoding.
        let mmap = unsafe { memmap2::MmapOptions::new().map(&file)? };
        Self::new(Cursor::new(mmap), config)
    }

    /// Starts decoding `source` in the background.
    pub fn new<R>(source: R, config: BgzfConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        config.validate()?;
        let dispatcher = Arc::new(Dispatcher::new(config.threads, "bgzf-inflate")?);
        let failure = dispatcher.failure().clone();
        let shared = Arc::new(DecoderShared {
            pool: BufferPool::new(config.buffers),
            gate: OrderingGate::new(()),
            blocks_read: AtomicU64::new(0),
        });
        debug!(
            threads = config.threads,
            buffers = config.buffers,
            "starting BGZF decoder"
        );

        let reader = {
            let shared = shared.clone();
            let dispatcher = dispatcher.clone();
            thread::Builder::new()
                .name("bgzf-reader".into())
                .spawn(move || read_blocks(source, &shared, &dispatcher))?
        };

        Ok(Self {
            shared,
            failure,
            dispatcher: Some(dispatcher),
            reader: Some(reader),
            current: None,
            last_read: 0,
            finished: false,
            fault: None,
        })
    }

    /// Copies decompressed bytes into `buf`, returning 0 at end of stream.
    pub fn read_decompressed(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.last_read = 0;
        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if let Some(block) = self.current.as_mut() {
                let remaining = block.remaining();
                if !remaining.is_empty() {
                    let n = remaining.len().min(buf.len());
                    buf[..n].copy_from_slice(&remaining[..n]);
                    block.consumed += n;
                    self.last_read = n;
                    return Ok(n);
                }
            }
            if let Some(mut block) = self.current.take() {
                block.advance(Phase::Delivered);
                self.shared.pool.release(block);
            }
            if self.finished {
                return Ok(0);
            }

            match self.shared.gate.pop_next() {
                Some(block) if block.phase() == Phase::Decompressed => {
                    if block.output.is_empty() {
                        trace!(seq = block.seq(), "reached EOF marker");
                        self.shared.pool.release(block);
                        self.end_of_stream();
                        return Ok(0);
                    }
                    self.current = Some(block);
                }
                Some(block) => {
                    let err = block
                        .error()
                        .cloned()
                        .or_else(|| self.failure.error())
                        .unwrap_or_else(|| BgzfError::format("block was not decompressed"));
                    self.shared.pool.release(block);
                    return Err(self.poison(err));
                }
                None => {
                    if let Err(err) = self.failure.check() {
                        return Err(self.poison(err));
                    }
                    self.end_of_stream();
                    return Ok(0);
                }
            }
        }
    }

    pub fn last_read_len(&self) -> usize {
        self.last_read
    }

    pub fn blocks_read(&self) -> u64 {
        self.shared.blocks_read.load(Ordering::Relaxed)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn poison(&mut self, err: BgzfError) -> BgzfError {
        self.fault = Some(err.clone());
        self.shutdown();
        err
    }

    fn end_of_stream(&mut self) {
        self.finished = true;
        self.dispatcher.take();
        if let Some(reader) = self.reader.take() {
            // The reader stops at the EOF block, so this does not wait long.
            let _ = reader.join();
        }
        debug!(blocks = self.blocks_read(), "BGZF stream finished");
    }

    /// Stops the reader thread and recycles parked blocks.
    fn shutdown(&mut self) {
        self.failure.abort();
        self.shared.pool.shutdown();
        for block in self.shared.gate.drain_pending() {
            self.shared.pool.release(block);
        }
        self.dispatcher.take();
    }
}

/// Reader thread: frame blocks off `source` and queue their decompression.
fn read_blocks<R: Read>(mut source: R, shared: &Arc<DecoderShared>, dispatcher: &Dispatcher) {
    let failure = dispatcher.failure().clone();
    let mut seq = 0u64;

    while !failure.is_aborted() {
        let Some(mut block) = shared.pool.acquire() else {
            break;
        };
        block.assign(seq, Phase::Reading);

        match codec::read_frame(&mut source, &mut block.input) {
            Ok(Some(frame)) => {
                block.advance(Phase::Read);
                shared.blocks_read.fetch_add(1, Ordering::Relaxed);
                trace!(seq, size = frame.compressed_size, "read block");

                let job_shared = shared.clone();
                let job_failure = failure.clone();
                dispatcher.submit(seq, move |skip| {
                    decompress_and_park(&job_shared, &job_failure, block, skip)
                });
                seq += 1;

                if frame.uncompressed_size == 0 {
                    break;
                }
            }
            Ok(None) => {
                shared.pool.release(block);
                warn!(blocks = seq, "BGZF stream ended without an EOF marker");
                break;
            }
            Err(e) => {
                failure.record(seq, Stage::Read, e);
                shared.pool.release(block);
                break;
            }
        }
    }

    shared.gate.close_at(seq);
}

/// Worker job: decompress one block and park it in the gate.
fn decompress_and_park(
    shared: &DecoderShared,
    failure: &FailureSlot,
    mut block: Block,
    skip: bool,
) {
    let seq = block.seq();
    if !skip {
        block.advance(Phase::Decompressing);
        match codec::decompress_block_into(&block.input, &mut block.output) {
            Ok(()) => block.advance(Phase::Decompressed),
            Err(e) => {
                failure.record(seq, Stage::Decompress, e.clone());
                block.fail(e);
            }
        }
    }
    shared.gate.push(seq, block);
}

impl Read for BgzfDecoder {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_decompressed(buf)?)
    }
}

impl Drop for BgzfDecoder {
    fn drop(&mut self) {
        if !self.finished {
            self.shutdown();
        }
    }
}
