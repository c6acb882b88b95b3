//! # vg-io — The "Engine" of VIGIL
//!
//! Drives a structure under test from N worker threads, merges their
//! append-only logs into one settled history and feeds it to the
//! verification engine. Released records can be journaled to a
//! memory-mapped file and replayed later.

pub mod barrier;
pub mod context;
pub mod journal;
pub mod log;
pub mod merger;
pub mod runner;
pub mod sut;
pub mod worker;
pub mod workload;

pub use barrier::StartBarrier;
pub use context::{RunContext, WorkerClock};
pub use journal::{read_journal, JournalError, JournalWriter, DEFAULT_JOURNAL_CAPACITY};
pub use log::{worker_log, LogFull, LogReader, LogWriter};
pub use merger::{Checkpoint, HistoryMerger, HistorySource, MergeError, Watermark, WorkerFeed};
pub use runner::{replay, run, run_with, verify_loop, JournalConfig, RunConfig, RunError, RunSummary};
pub use sut::{
    FaultPlan, Faulty, LockedMap, LockedQueue, LockedStack, StructureKind, StructureUnderTest,
};
pub use worker::{StopReason, Worker, WorkerConfig, WorkerReport};
pub use workload::Workload;
