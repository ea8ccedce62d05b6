//! Reusable block buffers.
//!
//! A [`Block`] is owned by exactly one thread at a time. It moves by value
//! through the buffer pool, the worker pool and the ordering gate; no two
//! stages ever see the same block simultaneously, so its bytes need no lock.

use crate::codec::{FrameInfo, MAX_BLOCK_SIZE};
use crate::error::BgzfError;

/// Stable index of a block inside its engine's pool.
pub type BlockId = usize;

/// Lifecycle position of a block.
///
/// Deflate blocks go `Free → Writable → Full → Compressing → Compressed →
/// Writing → Free`; inflate blocks go `Free → Reading → Read → Decompressing →
/// Decompressed → Delivered → Free`. A failed block jumps to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Free,
    Writable,
    Full,
    Compressing,
    Compressed,
    Writing,
    Reading,
    Read,
    Decompressing,
    Decompressed,
    Delivered,
    Failed,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Free, Writable)
                | (Writable, Full)
                | (Full, Compressing)
                | (Compressing, Compressed)
                | (Compressed, Writing)
                | (Free, Reading)
                | (Reading, Read)
                | (Read, Decompressing)
                | (Decompressing, Decompressed)
                | (Decompressed, Delivered)
                | (_, Failed)
                | (_, Free)
        )
    }
}

/// One paired input/output buffer plus its bookkeeping.
#[derive(Debug)]
pub struct Block {
    id: BlockId,
    seq: u64,
    phase: Phase,
    /// Uncompressed bytes when deflating, framed bytes when inflating.
    pub input: Vec<u8>,
    /// Framed bytes when deflating, uncompressed bytes when inflating.
    pub output: Vec<u8>,
    /// Physical framed blocks held in `output` (deflate side).
    pub frames: Vec<FrameInfo>,
    /// Bytes of `output` already handed to the reader (inflate side).
    pub consumed: usize,
    error: Option<BgzfError>,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            seq: 0,
            phase: Phase::Free,
            input: Vec::with_capacity(MAX_BLOCK_SIZE),
            output: Vec::with_capacity(MAX_BLOCK_SIZE),
            frames: Vec::with_capacity(2),
            consumed: 0,
            error: None,
        }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn error(&self) -> Option<&BgzfError> {
        self.error.as_ref()
    }

    pub fn assign(&mut self, seq: u64, phase: Phase) {
        self.seq = seq;
        self.advance(phase);
    }

    pub fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "block {} cannot move from {:?} to {:?}",
            self.id,
            self.phase,
            next
        );
        self.phase = next;
    }

    /// Records a failure; the block then only travels back to the pool.
    pub fn fail(&mut self, error: BgzfError) {
        self.error = Some(error);
        self.phase = Phase::Failed;
    }

    pub fn remaining(&self) -> &[u8] {
        &self.output[self.consumed..]
    }

    pub fn reset(&mut self) {
        self.seq = 0;
        self.phase = Phase::Free;
        self.input.clear();
        self.output.clear();
        self.frames.clear();
        self.consumed = 0;
        self.error = None;
    }
}
