//! # Run Context — Shared Atomic State
//!
//! Everything workers and the verifier share lives here and is passed by
//! reference: the start barrier, the transaction counter, per-worker done
//! flags, the cancel flag and per-worker method-time totals.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, Instant};

use crate::barrier::StartBarrier;

pub struct RunContext {
    origin: Instant,
    barrier: StartBarrier,
    txn: AtomicU64,
    done: Box<[AtomicBool]>,
    cancel: AtomicBool,
    method_nanos: Box<[AtomicU64]>,
}

impl RunContext {
    pub fn new(workers: usize) -> Self {
        Self {
            origin: Instant::now(),
            barrier: StartBarrier::new(workers),
            txn: AtomicU64::new(0),
            done: (0..workers).map(|_| AtomicBool::new(false)).collect(),
            cancel: AtomicBool::new(false),
            method_nanos: (0..workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    pub fn workers(&self) -> usize {
        self.done.len()
    }

    pub fn barrier(&self) -> &StartBarrier {
        &self.barrier
    }

    /// Nanoseconds since the run origin.
    #[inline]
    pub fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    /// Draw the next transaction id. Issue order, not completion order.
    #[inline]
    pub fn next_txn(&self) -> u64 {
        self.txn.fetch_add(1, AtomicOrdering::AcqRel)
    }

    pub fn txns_issued(&self) -> u64 {
        self.txn.load(AtomicOrdering::Acquire)
    }

    /// Publish that `worker` will append no further records.
    pub fn mark_done(&self, worker: usize) {
        self.done[worker].store(true, AtomicOrdering::Release);
    }

    #[inline]
    pub fn is_done(&self, worker: usize) -> bool {
        self.done[worker].load(AtomicOrdering::Acquire)
    }

    pub fn all_done(&self) -> bool {
        self.done.iter().all(|d| d.load(AtomicOrdering::Acquire))
    }

    /// Ask every worker to stop at its next operation boundary.
    pub fn cancel(&self) {
        self.cancel.store(true, AtomicOrdering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(AtomicOrdering::Acquire)
    }

    pub fn add_method_time(&self, worker: usize, nanos: u64) {
        self.method_nanos[worker].fetch_add(nanos, AtomicOrdering::Relaxed);
    }

    pub fn method_time(&self, worker: usize) -> Duration {
        Duration::from_nanos(self.method_nanos[worker].load(AtomicOrdering::Relaxed))
    }

    /// Longest per-worker time spent inside structure calls.
    pub fn max_method_time(&self) -> Duration {
        (0..self.workers())
            .map(|w| self.method_time(w))
            .max()
            .unwrap_or_default()
    }
}

/// Per-worker clock. Every stamp is strictly greater than the previous
/// one, so a worker's responses strictly increase even when the
/// underlying clock does not advance between two reads.
#[derive(Debug, Default)]
pub struct WorkerClock {
    last: u64,
}

impl WorkerClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn stamp(&mut self, ctx: &RunContext) -> u64 {
        let t = ctx.now().max(self.last + 1);
        self.last = t;
        t
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}
