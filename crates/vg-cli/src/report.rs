//! Human and JSON renderings of run and replay outcomes.

use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use uuid::Uuid;
use vg_io::RunSummary;
use vg_verify::{EngineConfig, Verdict, Violation};

/// Contents longer than this are elided in the human report.
const CONTENTS_PREVIEW: usize = 16;

#[derive(Debug, Serialize)]
pub struct RunReport<'a> {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub engine: EngineConfig,
    #[serde(flatten)]
    pub summary: &'a RunSummary,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub journal: PathBuf,
    pub engine: EngineConfig,
    pub batch: usize,
    pub records: u64,
    pub checkpoints: u64,
    pub verify_time: Duration,
    pub verdict: Verdict,
    pub first_inconsistent: Option<u64>,
    pub violations: Vec<Violation>,
}

#[derive(Tabled)]
struct ViolationRow {
    key: u64,
    rule: String,
    status: String,
    main: String,
    reader: String,
    failed: String,
    #[tabled(rename = "exp m/r/f")]
    exponents: String,
    checkpoint: u64,
}

impl From<&Violation> for ViolationRow {
    fn from(v: &Violation) -> Self {
        Self {
            key: v.key,
            rule: v.rule.to_string(),
            status: format!("{:?}", v.status),
            main: track(&v.main.exact, v.main.approx),
            reader: track(&v.reader.exact, v.reader.approx),
            failed: track(&v.failed.exact, v.failed.approx),
            exponents: format!("{}/{}/{}", v.main.exponent, v.reader.exponent, v.failed.exponent),
            checkpoint: v.checkpoint,
        }
    }
}

fn track(exact: &str, approx: f64) -> String {
    format!("{exact} ({approx:.4})")
}

pub fn violations_table(violations: &[Violation]) -> String {
    let rows: Vec<ViolationRow> = violations.iter().map(ViolationRow::from).collect();
    Table::new(rows).with(Style::modern()).to_string()
}

fn banner(verdict: Verdict) -> &'static str {
    match verdict {
        Verdict::Consistent => "VIGIL: history is CONSISTENT",
        Verdict::Inconsistent => "VIGIL: VIOLATION FOUND",
    }
}

fn contents(items: &[(u64, u64)]) -> String {
    if items.is_empty() {
        return "(empty)".into();
    }
    let mut out = items
        .iter()
        .take(CONTENTS_PREVIEW)
        .map(|(k, v)| if k == v { k.to_string() } else { format!("{k}={v}") })
        .collect::<Vec<_>>()
        .join(" ");
    if items.len() > CONTENTS_PREVIEW {
        let _ = write!(out, " .. ({} total)", items.len());
    }
    out
}

pub fn render_run(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", banner(summary.verdict));
    let _ = writeln!(out, "   Total Time:        {:.3?}", summary.elapsed);
    let _ = writeln!(out, "   Method Time:       {:.3?}", summary.method_time);
    let _ = writeln!(out, "   Verification Time: {:.3?}", summary.verify_time);
    let _ = writeln!(
        out,
        "   Records:           {} in {} checkpoints",
        summary.records, summary.checkpoints
    );
    let early = summary.stopped_early();
    if early > 0 {
        let _ = writeln!(out, "   Stopped early:     {early} worker(s)");
    }
    let _ = writeln!(out, "   Final contents:    {}", contents(&summary.final_contents));
    if let Some(path) = &summary.journal {
        let _ = writeln!(out, "   Journal:           {}", path.display());
    }
    push_violations(&mut out, summary.first_inconsistent, &summary.violations);
    out
}

pub fn render_replay(report: &ReplayReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", banner(report.verdict));
    let _ = writeln!(out, "   Journal:           {}", report.journal.display());
    let _ = writeln!(out, "   Verification Time: {:.3?}", report.verify_time);
    let _ = writeln!(
        out,
        "   Records:           {} in {} checkpoints of {}",
        report.records, report.checkpoints, report.batch
    );
    push_violations(&mut out, report.first_inconsistent, &report.violations);
    out
}

fn push_violations(out: &mut String, first: Option<u64>, violations: &[Violation]) {
    if let Some(first) = first {
        let _ = writeln!(out, "   First violation:   checkpoint {first}");
    }
    if !violations.is_empty() {
        let _ = writeln!(out, "{}", violations_table(violations));
    }
}
