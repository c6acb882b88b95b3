//! Per-item verdict rules and how sweeps combine into a run verdict.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use vg_core::{DemotionLink, Dyadic, ItemState, ItemStatus, Key, OrderKey, Potential, PotentialMode};

/// How successive checkpoint sweeps combine into the run verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictPolicy {
    /// Each sweep overwrites the global flag. A later clean sweep hides an
    /// earlier bad one.
    #[default]
    LastCheckpoint,
    /// Logical AND across every sweep of the run.
    Cumulative,
}

impl FromStr for VerdictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "last-checkpoint" | "last" => Ok(Self::LastCheckpoint),
            "cumulative" => Ok(Self::Cumulative),
            other => Err(format!("unknown verdict policy: {other}")),
        }
    }
}

impl fmt::Display for VerdictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LastCheckpoint => "last-checkpoint",
            Self::Cumulative => "cumulative",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Consistent,
    Inconsistent,
}

impl Verdict {
    #[inline]
    pub fn is_consistent(self) -> bool {
        self == Verdict::Consistent
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Consistent => "CONSISTENT",
            Self::Inconsistent => "INCONSISTENT",
        })
    }
}

/// Which rule an inconsistent item broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// `sum < 0`: consumed more often than produced.
    NegativePotential,
    /// `ceil(sum) + sumR < 0`: read while it should not have been there.
    StaleRead,
    /// `sumF != 0 && ceil(sum) + sumF > 0`: a consume or read failed while
    /// the item should have been there.
    MissedItem,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NegativePotential => "negative potential",
            Self::StaleRead => "stale read",
            Self::MissedItem => "missed item",
        })
    }
}

/// Printable copy of one potential track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackSnapshot {
    /// Exact fraction, e.g. `-3/2`.
    pub exact: String,
    /// Value under the active comparison mode.
    pub observed: String,
    pub approx: f64,
    pub exponent: i32,
}

impl TrackSnapshot {
    fn capture(track: &Potential, mode: PotentialMode) -> Self {
        let exact = track.exact();
        Self {
            exact: exact.to_string(),
            observed: track.sum(mode).to_string(),
            approx: exact.to_f64(),
            exponent: track.exponent(),
        }
    }
}

/// Diagnostic dump of one inconsistent item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub key: Key,
    pub rule: Rule,
    pub status: ItemStatus,
    pub main: TrackSnapshot,
    pub failed: TrackSnapshot,
    pub reader: TrackSnapshot,
    /// Producer that last made the item present, if still live.
    pub producer: Option<OrderKey>,
    pub pending_demotions: Vec<DemotionLink>,
    /// Checkpoint at which the item first turned inconsistent.
    pub checkpoint: u64,
}

/// First rule `item` breaks under `mode`, checked in the order
/// main, reader, failed.
pub fn broken_rule(item: &ItemState, mode: PotentialMode) -> Option<Rule> {
    let main = item.main.sum(mode);
    if main.is_negative() {
        return Some(Rule::NegativePotential);
    }
    let ceiling = main.ceil();
    if item.reader.sum(mode).plus_integer(ceiling).is_negative() {
        return Some(Rule::StaleRead);
    }
    let failed: Dyadic = item.failed.sum(mode);
    if !failed.is_zero() && failed.plus_integer(ceiling).is_positive() {
        return Some(Rule::MissedItem);
    }
    None
}

pub fn describe(item: &ItemState, rule: Rule, mode: PotentialMode, checkpoint: u64) -> Violation {
    Violation {
        key: item.key,
        rule,
        status: item.status,
        main: TrackSnapshot::capture(&item.main, mode),
        failed: TrackSnapshot::capture(&item.failed, mode),
        reader: TrackSnapshot::capture(&item.reader, mode),
        producer: item.producer,
        pending_demotions: item.demotions.clone(),
        checkpoint,
    }
}
