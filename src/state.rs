//! Shared run counters.
//!
//! `fired` and `batches_fired` have a single writer, the dispatcher; they are
//! atomics only so the sampler and progress display can read them from other
//! tasks. `completed` and `failed` are written by every request task and are
//! guarded together by one lock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Finished {
    completed: u64,
    failed: u64,
}

/// Counters for one run, shared by reference between dispatcher, tasks and sampler.
#[derive(Debug, Default)]
pub struct RunState {
    fired: AtomicU64,
    batches_fired: AtomicU64,
    finished: Mutex<Finished>,
}

/// A best-effort read of all counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub fired: u64,
    pub completed: u64,
    pub failed: u64,
    pub batches_fired: u64,
}

impl Counters {
    /// Tasks launched but not yet finished.
    pub fn running(&self) -> u64 {
        self.fired.saturating_sub(self.completed + self.failed)
    }
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one launched task. Dispatcher only.
    pub(crate) fn record_fired(&self) -> u64 {
        let n = self.fired.load(Ordering::Relaxed) + 1;
        self.fired.store(n, Ordering::Release);
        n
    }

    /// Dispatcher only.
    pub(crate) fn record_batch(&self) {
        let n = self.batches_fired.load(Ordering::Relaxed) + 1;
        self.batches_fired.store(n, Ordering::Release);
    }

    pub(crate) fn record_completed(&self) {
        self.finished.lock().completed += 1;
    }

    pub(crate) fn record_failed(&self) {
        self.finished.lock().failed += 1;
    }

    pub fn fired(&self) -> u64 {
        self.fired.load(Ordering::Acquire)
    }

    pub fn completed(&self) -> u64 {
        self.finished.lock().completed
    }

    pub fn failed(&self) -> u64 {
        self.finished.lock().failed
    }

    /// Read every counter.
    ///
    /// The finished counts are read before `fired` so a snapshot can never
    /// show more finished work than launched work.
    pub fn counters(&self) -> Counters {
        let finished = *self.finished.lock();
        Counters {
            completed: finished.completed,
            failed: finished.failed,
            fired: self.fired(),
            batches_fired: self.batches_fired.load(Ordering::Acquire),
        }
    }
}
