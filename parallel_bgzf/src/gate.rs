//! In-order release of out-of-order completions.
//!
//! Workers finish blocks in whatever order the scheduler picks. The gate holds
//! each completion until all lower sequence numbers have gone through, then
//! releases the longest contiguous run. Releases can be pushed (the thread that
//! closes a gap performs them, e.g. writing to the sink) or pulled (a consumer
//! waits for the next expected item).

use crate::dispatch::lock;
use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex};

struct GateState<T, C> {
    next: u64,
    pending: BTreeMap<u64, T>,
    /// No item with a sequence number at or past this will ever arrive.
    end: Option<u64>,
    context: C,
}

/// Ordering gate keyed by sequence number, with release-side context `C`
/// (for instance the output sink) guarded by the same lock.
pub struct OrderingGate<T, C = ()> {
    state: Mutex<GateState<T, C>>,
    ready: Condvar,
}

impl<T, C> OrderingGate<T, C> {
    pub fn new(context: C) -> Self {
        Self {
            state: Mutex::new(GateState {
                next: 0,
                pending: BTreeMap::new(),
                end: None,
                context,
            }),
            ready: Condvar::new(),
        }
    }

    /// Parks a completed item until a consumer pulls it with [`pop_next`].
    ///
    /// [`pop_next`]: OrderingGate::pop_next
    pub fn push(&self, seq: u64, item: T) {
        let mut state = lock(&self.state);
        debug_assert!(seq >= state.next, "item {} arrived after its release", seq);
        state.pending.insert(seq, item);
        if seq == state.next {
            self.ready.notify_all();
        }
    }

    /// Inserts an item, then releases every item that is now contiguous with
    /// the next expected sequence number, in order, on the calling thread.
    ///
    /// Returns the number of items released.
    pub fn push_and_release<F>(&self, seq: u64, item: T, mut release: F) -> usize
    where
        F: FnMut(&mut C, u64, T),
    {
        let mut state = lock(&self.state);
        debug_assert!(seq >= state.next, "item {} arrived after its release", seq);
        state.pending.insert(seq, item);

        let mut released = 0;
        loop {
            let next = state.next;
            let Some(item) = state.pending.remove(&next) else {
                break;
            };
            release(&mut state.context, next, item);
            state.next += 1;
            released += 1;
        }
        if released > 0 {
            self.ready.notify_all();
        }
        released
    }

    /// Waits for the next expected item and takes it.
    ///
    /// Returns `None` once the gate has been closed and every item before the
    /// end has been taken.
    pub fn pop_next(&self) -> Option<T> {
        let mut state = lock(&self.state);
        loop {
            let next = state.next;
            if let Some(item) = state.pending.remove(&next) {
                state.next += 1;
                return Some(item);
            }
            if state.end.is_some_and(|end| next >= end) {
                return None;
            }
            state = self.ready.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Declares that `end` items in total will ever be pushed.
    pub fn close_at(&self, end: u64) {
        let mut state = lock(&self.state);
        state.end = Some(end);
        self.ready.notify_all();
    }

    pub fn next_expected(&self) -> u64 {
        lock(&self.state).next
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.state).pending.len()
    }

    /// Removes every parked item, regardless of order.
    pub fn drain_pending(&self) -> Vec<T> {
        let mut state = lock(&self.state);
        std::mem::take(&mut state.pending).into_values().collect()
    }

    pub fn with_context<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        f(&mut lock(&self.state).context)
    }
}
