//! Worker pool and failure bookkeeping shared by both engines.
//!
//! Jobs run on a dedicated rayon pool. A job never lets an error escape its
//! thread: it records the failure in the engine's [`FailureSlot`], which keeps
//! the earliest one by `(sequence, stage)` and raises the abort flag so that
//! jobs still queued skip their work and hand their block straight on.

use crate::error::{BgzfError, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Locks a mutex, recovering the guard if another thread panicked with it held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Kind of work performed on a block, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Read,
    Compress,
    Decompress,
    Write,
}

#[derive(Debug)]
struct Failure {
    seq: u64,
    stage: Stage,
    error: BgzfError,
}

/// The single recorded error of an engine.
#[derive(Debug, Default)]
pub struct FailureSlot {
    failure: Mutex<Option<Failure>>,
    aborted: AtomicBool,
}

impl FailureSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` unless an earlier failure is already held.
    ///
    /// Returns true if this error became the engine's recorded failure.
    pub fn record(&self, seq: u64, stage: Stage, error: BgzfError) -> bool {
        let mut slot = lock(&self.failure);
        let replace = match slot.as_ref() {
            Some(existing) => (seq, stage) < (existing.seq, existing.stage),
            None => true,
        };
        if replace {
            trace!(seq, ?stage, %error, "recording failure");
            *slot = Some(Failure { seq, stage, error });
        }
        self.aborted.store(true, Ordering::Release);
        replace
    }

    /// Raises the abort flag without recording an error (engine shutdown).
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// True if work on block `seq` should be skipped: the engine shut down, or
    /// it failed at or before `seq`.
    pub fn skips(&self, seq: u64) -> bool {
        if !self.is_aborted() {
            return false;
        }
        match lock(&self.failure).as_ref() {
            Some(failure) => seq >= failure.seq,
            None => true,
        }
    }

    pub fn check(&self) -> Result<()> {
        match lock(&self.failure).as_ref() {
            Some(failure) => Err(failure.error.clone()),
            None => Ok(()),
        }
    }

    pub fn error(&self) -> Option<BgzfError> {
        lock(&self.failure).as_ref().map(|f| f.error.clone())
    }
}

pub struct Dispatcher {
    pool: ThreadPool,
    failure: Arc<FailureSlot>,
}

impl Dispatcher {
    /// Builds a pool of `threads` workers named `<name>-<index>`.
    pub fn new(threads: usize, name: &'static str) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("{}-{}", name, i))
            .build()
            .map_err(|e| BgzfError::Config(format!("failed to build worker pool: {}", e)))?;
        Ok(Self {
            pool,
            failure: Arc::new(FailureSlot::new()),
        })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn failure(&self) -> &Arc<FailureSlot> {
        &self.failure
    }

    /// Queues the job for block `seq`. The job is told whether to skip its
    /// work and only pass its block along (see [`FailureSlot::skips`]).
    pub fn submit<F>(&self, seq: u64, job: F)
    where
        F: FnOnce(bool) + Send + 'static,
    {
        let failure = self.failure.clone();
        self.pool.spawn(move || job(failure.skips(seq)));
    }
}
