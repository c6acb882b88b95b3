//! `vigil.toml` loading and command-line overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use vg_core::{ConsistencyModel, PotentialMode};
use vg_io::{FaultPlan, JournalConfig, RunConfig, StructureKind, DEFAULT_JOURNAL_CAPACITY};
use vg_verify::{EngineConfig, VerdictPolicy};

/// Loaded when `--config` is not given and the file exists.
pub const DEFAULT_CONFIG: &str = "vigil.toml";

// =============================================================================
// File
// =============================================================================

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct FileConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub journal: Option<JournalConfig>,
    #[serde(default)]
    pub fault: Option<FaultPlan>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RunSection {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_ops")]
    pub ops_per_worker: usize,
    #[serde(default)]
    pub structure: StructureKind,
    #[serde(default)]
    pub seed: u64,
    #[serde(default = "default_time_limit")]
    pub time_limit_secs: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            ops_per_worker: default_ops(),
            structure: StructureKind::default(),
            seed: 0,
            time_limit_secs: default_time_limit(),
        }
    }
}

fn default_workers() -> usize {
    32
}
fn default_ops() -> usize {
    10
}
fn default_time_limit() -> u64 {
    60
}

impl FileConfig {
    /// Read `explicit`, or `vigil.toml` in the working directory if it
    /// exists, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        let path = match explicit {
            Some(p) => p,
            None if Path::new(DEFAULT_CONFIG).exists() => Path::new(DEFAULT_CONFIG),
            None => return Ok(Self::default()),
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

// =============================================================================
// Overrides
// =============================================================================

/// Engine flags shared by `run` and `replay`.
#[derive(Debug, Args, Default, Clone)]
pub struct EngineArgs {
    /// linearizability | sc | serializability
    #[arg(long)]
    pub model: Option<ConsistencyModel>,

    /// truncate | exact
    #[arg(long)]
    pub mode: Option<PotentialMode>,

    /// last-checkpoint | cumulative
    #[arg(long)]
    pub policy: Option<VerdictPolicy>,
}

impl EngineArgs {
    pub fn apply(&self, mut engine: EngineConfig) -> EngineConfig {
        if let Some(model) = self.model {
            engine.model = model;
        }
        if let Some(mode) = self.mode {
            engine.mode = mode;
        }
        if let Some(policy) = self.policy {
            engine.policy = policy;
        }
        engine
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunArgs {
    /// Worker threads.
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Operations per worker.
    #[arg(long, short = 'n')]
    pub ops: Option<usize>,

    /// queue | stack | map | ledger
    #[arg(long, short = 's')]
    pub structure: Option<StructureKind>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Per-worker wall-clock ceiling in seconds.
    #[arg(long)]
    pub time_limit: Option<u64>,

    /// Make every n-th consume or erase deliver its element twice.
    #[arg(long, value_name = "N")]
    pub replay_every: Option<u64>,

    /// Record the released history to this file.
    #[arg(long)]
    pub journal: Option<PathBuf>,

    /// Journal pre-allocation in bytes.
    #[arg(long)]
    pub journal_capacity: Option<u64>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

impl RunArgs {
    /// File values first, then every flag that was given.
    pub fn resolve(&self, file: FileConfig) -> RunConfig {
        let run = file.run;
        let fault = self
            .replay_every
            .map(|every| FaultPlan::ReplayConsume { every })
            .or(file.fault);

        let journal = match (&self.journal, file.journal) {
            (Some(path), from_file) => Some(JournalConfig {
                path: path.clone(),
                capacity: self
                    .journal_capacity
                    .or(from_file.map(|j| j.capacity))
                    .unwrap_or(DEFAULT_JOURNAL_CAPACITY),
            }),
            (None, Some(mut j)) => {
                if let Some(capacity) = self.journal_capacity {
                    j.capacity = capacity;
                }
                Some(j)
            }
            (None, None) => None,
        };

        RunConfig {
            workers: self.workers.unwrap_or(run.workers),
            ops_per_worker: self.ops.unwrap_or(run.ops_per_worker),
            structure: self.structure.unwrap_or(run.structure),
            engine: self.engine.apply(file.engine),
            seed: self.seed.unwrap_or(run.seed),
            time_limit: Duration::from_secs(self.time_limit.unwrap_or(run.time_limit_secs)),
            fault,
            journal,
        }
    }
}
