//! # vg-cli — The "Moat" of VIGIL
//!
//! Command line for the consistency checker.
//!
//! - `vg run`: Drive a structure from N workers and verify the history live.
//! - `vg replay <journal>`: Re-verify a recorded history offline.
//! - `vg prove`: Run the Kani proofs.
//!
//! Exit status: 0 consistent, 1 violation found, 2 fatal error.

mod config;
mod report;

use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;
use vg_core::Semantics;
use vg_io::{read_journal, replay};
use vg_verify::{Engine, RecordAdapter, SemanticsOverride, Verdict};

use crate::config::{EngineArgs, FileConfig, RunArgs};
use crate::report::{render_replay, render_run, ReplayReport, RunReport};

/// VIGIL: runtime consistency checking for concurrent structures.
#[derive(Parser)]
#[command(name = "vg", version, about, long_about = None)]
struct Cli {
    /// TOML config (default: ./vigil.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print a JSON report instead of the human one.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run workers against a structure and verify the history as it settles.
    Run(RunArgs),

    /// Re-verify a recorded history journal.
    Replay {
        /// Journal written by `vg run --journal`.
        journal: PathBuf,

        /// Check every record under this discipline instead of the recorded one.
        #[arg(long)]
        semantics: Option<Semantics>,

        /// Records per checkpoint.
        #[arg(long, default_value_t = 1024)]
        batch: usize,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Run Kani formal verification proofs.
    Prove,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "vg=info,vg_io=info,vg_verify=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match dispatch(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("vg: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// `Ok(true)` when everything checked out.
fn dispatch(cli: Cli) -> anyhow::Result<bool> {
    match cli.command {
        Commands::Run(args) => {
            let file = FileConfig::load(cli.config.as_deref())?;
            run(&args, file, cli.json)
        }
        Commands::Replay {
            journal,
            semantics,
            batch,
            engine,
        } => {
            let file = FileConfig::load(cli.config.as_deref())?;
            let config = engine.apply(file.engine);
            match semantics {
                Some(s) => replay_journal(
                    &journal,
                    Engine::with_adapter(config, SemanticsOverride(s)),
                    batch,
                    cli.json,
                ),
                None => replay_journal(&journal, Engine::new(config), batch, cli.json),
            }
        }
        Commands::Prove => Ok(prove()),
    }
}

fn run(args: &RunArgs, file: FileConfig, json: bool) -> anyhow::Result<bool> {
    let config = args.resolve(file);
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!(%run_id, "vg run");

    let summary = vg_io::run(&config).context("run aborted")?;

    if json {
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            engine: config.engine,
            summary: &summary,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_run(&summary));
    }
    Ok(summary.verdict.is_consistent())
}

fn replay_journal<A: RecordAdapter>(
    path: &Path,
    mut engine: Engine<A>,
    batch: usize,
    json: bool,
) -> anyhow::Result<bool> {
    let started_at = Utc::now();
    let clock = Instant::now();
    let records = read_journal(path).with_context(|| format!("reading {}", path.display()))?;
    info!(
        records = records.len(),
        elapsed_ms = clock.elapsed().as_millis() as u64,
        "journal loaded"
    );

    let verify_time = replay(&records, &mut engine, batch).context("replay aborted")?;
    let report = ReplayReport {
        run_id: Uuid::new_v4(),
        started_at,
        journal: path.to_path_buf(),
        engine: *engine.config(),
        batch: batch.max(1),
        records: engine.records_applied(),
        checkpoints: engine.checkpoints(),
        verify_time,
        verdict: engine.verdict(),
        first_inconsistent: engine.first_inconsistent(),
        violations: engine.violations(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_replay(&report));
    }
    Ok(report.verdict == Verdict::Consistent)
}

fn prove() -> bool {
    eprintln!("VIGIL: Running formal verification...");
    eprintln!("   Tool: Kani Model Checker");
    eprintln!("   Targets: vg-core (potential arithmetic), vg-verify (record order)");
    eprintln!();

    let mut all_passed = true;
    for package in ["vg-core", "vg-verify"] {
        let status = Command::new("cargo")
            .args(["kani", "--package", package])
            .status();
        let passed = match status {
            Ok(status) if status.success() => {
                eprintln!("   {package}: ALL PROOFS PASSED");
                true
            }
            Ok(_) => {
                eprintln!("   {package}: PROOF FAILURE");
                false
            }
            Err(e) => {
                eprintln!("   Kani not found: {e}");
                eprintln!("   Install with: cargo install kani-verifier && cargo kani setup");
                false
            }
        };
        all_passed &= passed;
    }

    eprintln!();
    if all_passed {
        eprintln!("VIGIL: verification complete.");
    } else {
        eprintln!("VIGIL: verification incomplete, one or more proofs failed.");
    }
    all_passed
}
