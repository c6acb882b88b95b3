//! # Run Session
//!
//! Wires one run together: N workers on scoped threads, the merger and the
//! verification engine on the calling thread.
//!
//! ```text
//! workers ──append──► logs ──► merger ──checkpoint──► engine ──► verdict
//!                                  └────────────────► journal (optional)
//! ```

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};
use vg_core::{Key, OperationRecord, Value};
use vg_verify::{Engine, EngineConfig, RecordAdapter, Verdict, VerifyError, Violation};

use crate::context::RunContext;
use crate::journal::{JournalError, JournalWriter, DEFAULT_JOURNAL_CAPACITY};
use crate::log::worker_log;
use crate::merger::{HistoryMerger, HistorySource, MergeError, WorkerFeed};
use crate::sut::{FaultPlan, Faulty, StructureKind, StructureUnderTest};
use crate::worker::{StopReason, Worker, WorkerConfig, WorkerReport};
use crate::workload::Workload;

/// Polls with nothing released before the verifier yields its core.
const IDLE_SPINS: u32 = 128;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Verify(#[from] VerifyError),

    #[error(transparent)]
    Journal(#[from] JournalError),

    #[error("{0} worker thread(s) panicked")]
    WorkerPanicked(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalConfig {
    pub path: PathBuf,
    #[serde(default = "default_journal_capacity")]
    pub capacity: u64,
}

fn default_journal_capacity() -> u64 {
    DEFAULT_JOURNAL_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    pub workers: usize,
    pub ops_per_worker: usize,
    pub structure: StructureKind,
    pub engine: EngineConfig,
    pub seed: u64,
    pub time_limit: Duration,
    pub fault: Option<FaultPlan>,
    pub journal: Option<JournalConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 32,
            ops_per_worker: 10,
            structure: StructureKind::Queue,
            engine: EngineConfig::default(),
            seed: 0,
            time_limit: Duration::from_secs(60),
            fault: None,
            journal: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.workers == 0 {
            return Err(RunError::Config("at least one worker is required".into()));
        }
        if self.workers > u32::MAX as usize {
            return Err(RunError::Config(format!("too many workers: {}", self.workers)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub verdict: Verdict,
    pub checkpoints: u64,
    pub records: u64,
    pub elapsed: Duration,
    /// Longest per-worker time spent inside structure calls.
    pub method_time: Duration,
    /// Time the verifier spent applying checkpoints.
    pub verify_time: Duration,
    pub final_contents: Vec<(Key, Value)>,
    pub violations: Vec<Violation>,
    pub first_inconsistent: Option<u64>,
    pub workers: Vec<WorkerReport>,
    pub journal: Option<PathBuf>,
}

impl RunSummary {
    /// Workers that stopped before finishing their budget.
    pub fn stopped_early(&self) -> usize {
        self.workers
            .iter()
            .filter(|w| w.stop != StopReason::Budget)
            .count()
    }
}

/// Run the configured workload against a fresh structure.
pub fn run(config: &RunConfig) -> Result<RunSummary, RunError> {
    let base = config.structure.build();
    match config.fault {
        Some(plan) => run_with(config, &Faulty::new(base, plan)),
        None => run_with(config, &base),
    }
}

/// Run the configured workload against `sut`.
pub fn run_with<S: StructureUnderTest>(config: &RunConfig, sut: &S) -> Result<RunSummary, RunError> {
    config.validate()?;
    let workers = config.workers;
    let workload = Workload::from(config.structure);
    let capacity = config.ops_per_worker * workload.max_records_per_op();

    info!(
        workers,
        ops = config.ops_per_worker,
        structure = %config.structure,
        model = %config.engine.model,
        mode = %config.engine.mode,
        policy = %config.engine.policy,
        "run starting"
    );

    let ctx = RunContext::new(workers);
    let mut writers = Vec::with_capacity(workers);
    let mut feeds = Vec::with_capacity(workers);
    for index in 0..workers {
        let (writer, reader) = worker_log(capacity);
        writers.push(writer);
        feeds.push(WorkerFeed {
            reader,
            ctx: &ctx,
            index,
        });
    }

    let mut merger = HistoryMerger::new(feeds);
    let mut engine = Engine::new(config.engine);
    let mut journal = match &config.journal {
        Some(j) => Some(JournalWriter::create(&j.path, j.capacity)?),
        None => None,
    };

    let started = Instant::now();
    let (outcome, reports, panicked) = thread::scope(|s| {
        let handles: Vec<_> = writers
            .into_iter()
            .enumerate()
            .map(|(index, writer)| {
                let worker_config = WorkerConfig {
                    index,
                    workers,
                    ops: config.ops_per_worker,
                    seed: config.seed,
                    time_limit: config.time_limit,
                    workload,
                };
                let ctx = &ctx;
                let spawned = thread::Builder::new()
                    .name(format!("vg-worker-{index}"))
                    .spawn_scoped(s, move || {
                        Worker::new(&worker_config, ctx, writer).run(&worker_config, sut)
                    });
                if let Err(spawn_err) = &spawned {
                    // Stand in for the missing worker so nobody waits on it.
                    warn!(index, %spawn_err, "worker thread failed to start");
                    ctx.barrier().arrive();
                    ctx.mark_done(index);
                }
                spawned
            })
            .collect();

        let outcome = verify_loop(&mut merger, &mut engine, journal.as_mut());
        if let Err(err) = &outcome {
            error!(%err, "verification aborted; cancelling workers");
            ctx.cancel();
        }

        let mut reports = Vec::with_capacity(workers);
        let mut panicked = 0;
        for handle in handles {
            match handle {
                Ok(h) => match h.join() {
                    Ok(report) => reports.push(report),
                    Err(_) => panicked += 1,
                },
                Err(_) => panicked += 1,
            }
        }
        (outcome, reports, panicked)
    });
    let elapsed = started.elapsed();

    let verify_time = outcome?;
    if panicked > 0 {
        return Err(RunError::WorkerPanicked(panicked));
    }
    let journal = journal.map(JournalWriter::seal).transpose()?;

    let summary = RunSummary {
        verdict: engine.verdict(),
        checkpoints: engine.checkpoints(),
        records: engine.records_applied(),
        elapsed,
        method_time: ctx.max_method_time(),
        verify_time,
        final_contents: sut.snapshot(),
        violations: engine.violations(),
        first_inconsistent: engine.first_inconsistent(),
        workers: reports,
        journal,
    };

    info!(
        verdict = %summary.verdict,
        records = summary.records,
        checkpoints = summary.checkpoints,
        elapsed_ms = summary.elapsed.as_millis() as u64,
        "run finished"
    );
    Ok(summary)
}

/// Drive `merger` until every source is drained, feeding each non-empty
/// checkpoint (and the final one) to `engine`. Returns the time spent
/// inside the engine.
pub fn verify_loop<S, A>(
    merger: &mut HistoryMerger<S>,
    engine: &mut Engine<A>,
    mut journal: Option<&mut JournalWriter>,
) -> Result<Duration, RunError>
where
    S: HistorySource,
    A: RecordAdapter,
{
    let mut busy = Duration::ZERO;
    let mut idle = 0u32;
    loop {
        let checkpoint = merger.poll()?;
        if checkpoint.records.is_empty() && !checkpoint.finished {
            idle += 1;
            if idle < IDLE_SPINS {
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
            continue;
        }
        idle = 0;

        if let Some(j) = journal.as_deref_mut() {
            j.append_all(&checkpoint.records)?;
        }
        let t = Instant::now();
        engine.apply_checkpoint(&checkpoint.records)?;
        busy += t.elapsed();

        if checkpoint.finished {
            return Ok(busy);
        }
    }
}

/// Re-verify a recorded history, `batch` records per checkpoint.
pub fn replay<A: RecordAdapter>(
    records: &[OperationRecord],
    engine: &mut Engine<A>,
    batch: usize,
) -> Result<Duration, RunError> {
    let started = Instant::now();
    for chunk in records.chunks(batch.max(1)) {
        engine.apply_checkpoint(chunk)?;
    }
    engine.apply_checkpoint(&[])?;
    Ok(started.elapsed())
}
