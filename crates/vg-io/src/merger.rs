//! # History Merger — Bounded-Lag K-Way Merge
//!
//! Turns N append-only worker logs into one settled, totally ordered
//! history, released in checkpoints.
//!
//! ```text
//!   lane 0 ─┐
//!   lane 1 ─┼─► min-heap on (response, txn, id) ─► release while response <= watermark
//!   lane N ─┘
//!
//!   watermark = min(last response of every lane still running)
//!             = ∞ once every lane is done and drained
//! ```
//!
//! # Invariant
//!
//! A lane's responses strictly increase, so no lane can still append a
//! record at or below the watermark. The done flag is read BEFORE the
//! lane is drained; a lane is retired only when its flag was already set
//! at drain time, so its tail is never lost.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use thiserror::Error;
use tracing::{error, trace};
use vg_core::{OperationRecord, OrderKey};

use crate::context::RunContext;
use crate::log::LogReader;

/// Upper bound on records that can still be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Watermark {
    At(u64),
    Infinite,
}

impl Watermark {
    #[inline]
    pub fn admits(self, response: u64) -> bool {
        match self {
            Watermark::At(w) => response <= w,
            Watermark::Infinite => true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("worker {lane} response went from {previous} to {got}")]
    LaneRegression { lane: usize, previous: u64, got: u64 },

    #[error("record {got} arrived at or below released record {released}")]
    BelowWatermark { released: OrderKey, got: OrderKey },
}

/// One append-only stream of records with a done flag.
pub trait HistorySource {
    /// Whether the producer has finished appending. Must be read before
    /// the drain it guards.
    fn is_done(&self) -> bool;

    /// Move every newly published record into `out`.
    fn drain(&mut self, out: &mut Vec<OperationRecord>) -> usize;
}

/// A worker's log paired with its done flag in the run context.
pub struct WorkerFeed<'a> {
    pub reader: LogReader,
    pub ctx: &'a RunContext,
    pub index: usize,
}

impl HistorySource for WorkerFeed<'_> {
    #[inline]
    fn is_done(&self) -> bool {
        self.ctx.is_done(self.index)
    }

    #[inline]
    fn drain(&mut self, out: &mut Vec<OperationRecord>) -> usize {
        self.reader.drain_into(out)
    }
}

/// Records released in one round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub watermark: Watermark,
    pub records: Vec<OperationRecord>,
    /// Every lane is done and drained; nothing will follow.
    pub finished: bool,
}

struct Lane<S> {
    source: S,
    last_response: Option<u64>,
    retired: bool,
}

pub struct HistoryMerger<S> {
    lanes: Vec<Lane<S>>,
    heap: BinaryHeap<Reverse<OperationRecord>>,
    released: Option<OrderKey>,
    watermark: Watermark,
    scratch: Vec<OperationRecord>,
    rounds: u64,
}

impl<S: HistorySource> HistoryMerger<S> {
    pub fn new(sources: impl IntoIterator<Item = S>) -> Self {
        Self {
            lanes: sources
                .into_iter()
                .map(|source| Lane {
                    source,
                    last_response: None,
                    retired: false,
                })
                .collect(),
            heap: BinaryHeap::new(),
            released: None,
            watermark: Watermark::At(0),
            scratch: Vec::new(),
            rounds: 0,
        }
    }

    /// Watermark of the most recent round.
    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Records pulled from lanes but not yet released.
    pub fn pending(&self) -> usize {
        self.heap.len()
    }

    pub fn is_finished(&self) -> bool {
        self.lanes.iter().all(|l| l.retired) && self.heap.is_empty()
    }

    /// Pull from every running lane and release the settled prefix.
    pub fn poll(&mut self) -> Result<Checkpoint, MergeError> {
        self.rounds += 1;

        for (index, lane) in self.lanes.iter_mut().enumerate() {
            if lane.retired {
                continue;
            }
            let done = lane.source.is_done();
            self.scratch.clear();
            lane.source.drain(&mut self.scratch);

            for record in self.scratch.drain(..) {
                if let Some(previous) = lane.last_response {
                    if record.response <= previous {
                        let err = MergeError::LaneRegression {
                            lane: index,
                            previous,
                            got: record.response,
                        };
                        error!(%err, "merge aborted");
                        return Err(err);
                    }
                }
                if let Some(released) = self.released {
                    if record.order_key() <= released {
                        let err = MergeError::BelowWatermark {
                            released,
                            got: record.order_key(),
                        };
                        error!(%err, "merge aborted");
                        return Err(err);
                    }
                }
                lane.last_response = Some(record.response);
                self.heap.push(Reverse(record));
            }

            if done {
                lane.retired = true;
            }
        }

        let watermark = self
            .lanes
            .iter()
            .filter(|l| !l.retired)
            .map(|l| Watermark::At(l.last_response.unwrap_or(0)))
            .min()
            .unwrap_or(Watermark::Infinite);
        self.watermark = self.watermark.max(watermark);

        let mut records = Vec::new();
        while let Some(Reverse(top)) = self.heap.peek() {
            if !self.watermark.admits(top.response) {
                break;
            }
            let Some(Reverse(record)) = self.heap.pop() else {
                break;
            };
            self.released = Some(record.order_key());
            records.push(record);
        }

        let finished = self.is_finished();
        if !records.is_empty() {
            trace!(
                round = self.rounds,
                released = records.len(),
                pending = self.heap.len(),
                watermark = ?self.watermark,
                "checkpoint released"
            );
        }
        Ok(Checkpoint {
            watermark: self.watermark,
            records,
            finished,
        })
    }
}
