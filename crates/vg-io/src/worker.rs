//! # Worker — Timed Calls Against the Structure Under Test
//!
//! Each worker waits at the start barrier, then issues its operation budget
//! one call at a time:
//!
//! ```text
//! invocation = clock.stamp()
//! txn        = ctx.next_txn()      (or the enclosing transaction's)
//! result     = sut.try_*(..)
//! response   = clock.stamp()
//! log.append(record)
//! ```
//!
//! A worker stops early on cancel, on its time limit, or when its log is
//! full. Every exit path publishes the done flag, panics included.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, trace};
use vg_core::{Key, OpKind, OperationRecord, Semantics, Value};

use crate::context::{RunContext, WorkerClock};
use crate::log::{LogFull, LogWriter};
use crate::sut::StructureUnderTest;
use crate::workload::Workload;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub index: usize,
    pub workers: usize,
    pub ops: usize,
    pub seed: u64,
    pub time_limit: Duration,
    pub workload: Workload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Budget,
    TimeLimit,
    LogFull,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct WorkerReport {
    pub index: usize,
    pub ops: usize,
    pub records: usize,
    pub stop: StopReason,
}

/// Start and end of one structure call, plus its transaction.
#[derive(Debug, Clone, Copy)]
pub struct Timed<T> {
    pub invocation: u64,
    pub response: u64,
    pub txn: u64,
    pub output: T,
}

/// Marks the worker done when dropped.
struct DoneGuard<'a> {
    ctx: &'a RunContext,
    index: usize,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.ctx.mark_done(self.index);
    }
}

pub struct Worker<'a> {
    index: usize,
    workers: usize,
    ctx: &'a RunContext,
    log: LogWriter,
    clock: WorkerClock,
    rng: StdRng,
    seq: u64,
    method_nanos: u64,
    /// Ledger coins this worker minted.
    pub(crate) coins: Vec<Key>,
}

impl<'a> Worker<'a> {
    pub fn new(config: &WorkerConfig, ctx: &'a RunContext, log: LogWriter) -> Self {
        Self {
            index: config.index,
            workers: config.workers,
            ctx,
            log,
            clock: WorkerClock::new(),
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(config.index as u64)),
            seq: 0,
            method_nanos: 0,
            coins: Vec::new(),
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[inline]
    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Next run-unique record id: `index + 1 + seq * workers`.
    pub fn next_id(&mut self) -> u64 {
        let id = self.index as u64 + 1 + self.seq * self.workers as u64;
        self.seq += 1;
        id
    }

    /// Time one call. `txn` joins an existing transaction; `None` draws a
    /// fresh id after the invocation stamp.
    pub fn timed<T>(&mut self, txn: Option<u64>, call: impl FnOnce() -> T) -> Timed<T> {
        let invocation = self.clock.stamp(self.ctx);
        let txn = txn.unwrap_or_else(|| self.ctx.next_txn());
        let output = call();
        let response = self.clock.stamp(self.ctx);
        self.method_nanos += response - invocation;
        Timed {
            invocation,
            response,
            txn,
            output,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn emit<T>(
        &mut self,
        id: u64,
        kind: OpKind,
        semantics: Semantics,
        key: Option<Key>,
        value: Option<Value>,
        call: &Timed<T>,
        succeeded: bool,
    ) -> Result<(), LogFull> {
        let record = OperationRecord {
            id,
            process: self.index as u32,
            kind,
            semantics,
            key,
            value,
            invocation: call.invocation,
            response: call.response,
            succeeded,
            txn: call.txn,
        };
        trace!(worker = self.index, id, %kind, ?key, succeeded, "record");
        self.log.append(record)
    }

    /// Drive the worker to completion.
    pub fn run(
        mut self,
        config: &WorkerConfig,
        sut: &dyn StructureUnderTest,
    ) -> WorkerReport {
        let _done = DoneGuard {
            ctx: self.ctx,
            index: self.index,
        };

        self.ctx.barrier().wait();
        let started = Instant::now();
        let per_op = config.workload.max_records_per_op();

        let mut ops = 0;
        let stop = loop {
            if ops == config.ops {
                break StopReason::Budget;
            }
            if self.ctx.is_cancelled() {
                break StopReason::Cancelled;
            }
            if started.elapsed() >= config.time_limit {
                break StopReason::TimeLimit;
            }
            if self.log.remaining() < per_op {
                break StopReason::LogFull;
            }
            if config.workload.step(&mut self, sut).is_err() {
                break StopReason::LogFull;
            }
            ops += 1;
        };

        self.ctx.add_method_time(self.index, self.method_nanos);
        debug!(
            worker = self.index,
            ops,
            records = self.log.len(),
            ?stop,
            "worker finished"
        );
        WorkerReport {
            index: self.index,
            ops,
            records: self.log.len(),
            stop,
        }
    }
}
