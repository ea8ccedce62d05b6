//! Bounded pool of reusable [`Block`] buffers.
//!
//! Free blocks sit in a bounded channel sized to the pool, so `acquire` is a
//! blocking `recv` and `release` never blocks. An outstanding counter guarded
//! by a condvar lets the owner wait until every block has come home.

use crate::block::Block;
use crate::dispatch::lock;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::{Condvar, Mutex};

pub struct BufferPool {
    free_tx: Sender<Block>,
    free_rx: Receiver<Block>,
    // Dropping the sender wakes every blocked `acquire`.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    outstanding: Mutex<usize>,
    drained: Condvar,
    capacity: usize,
}

impl BufferPool {
    /// Creates a pool holding `capacity` blocks with ids `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        let (free_tx, free_rx) = bounded(capacity);
        for id in 0..capacity {
            // Cannot fail: the channel has room for every block.
            let _ = free_tx.send(Block::new(id));
        }
        let (shutdown_tx, shutdown_rx) = bounded(0);
        Self {
            free_tx,
            free_rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            outstanding: Mutex::new(0),
            drained: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.free_rx.len()
    }

    /// Takes a free block, waiting while none is available.
    ///
    /// Returns `None` only once the pool has been shut down.
    pub fn acquire(&self) -> Option<Block> {
        let block = select! {
            recv(self.free_rx) -> block => block.ok()?,
            recv(self.shutdown_rx) -> _ => return None,
        };
        *lock(&self.outstanding) += 1;
        Some(block)
    }

    pub fn release(&self, mut block: Block) {
        block.reset();
        // Never blocks: at most `capacity` blocks exist.
        let _ = self.free_tx.send(block);

        let mut outstanding = lock(&self.outstanding);
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.drained.notify_all();
        }
    }

    /// Blocks until every acquired block has been released.
    pub fn wait_drained(&self) {
        let mut outstanding = lock(&self.outstanding);
        while *outstanding > 0 {
            outstanding = self
                .drained
                .wait(outstanding)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Wakes blocked `acquire` calls and makes all future ones return `None`.
    pub fn shutdown(&self) {
        lock(&self.shutdown_tx).take();
    }
}
