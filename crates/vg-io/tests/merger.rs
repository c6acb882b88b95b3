//! Merger behaviour against real concurrently filled worker logs.

use std::collections::{HashSet, VecDeque};
use std::thread;

use proptest::prelude::*;
use vg_core::{OpKind, OperationRecord, Semantics};
use vg_io::{
    worker_log, HistoryMerger, HistorySource, RunContext, Watermark, WorkerClock, WorkerFeed,
};

const LANES: usize = 32;
const PER_LANE: usize = 500;

fn released_history(lanes: usize, per_lane: usize) -> (Vec<OperationRecord>, Vec<Watermark>) {
    let ctx = RunContext::new(lanes);
    let mut writers = Vec::new();
    let mut feeds = Vec::new();
    for index in 0..lanes {
        let (writer, reader) = worker_log(per_lane);
        writers.push(writer);
        feeds.push(WorkerFeed {
            reader,
            ctx: &ctx,
            index,
        });
    }
    let mut merger = HistoryMerger::new(feeds);

    thread::scope(|s| {
        for (index, mut writer) in writers.into_iter().enumerate() {
            let ctx = &ctx;
            s.spawn(move || {
                ctx.barrier().wait();
                let mut clock = WorkerClock::new();
                for seq in 0..per_lane {
                    let invocation = clock.stamp(ctx);
                    let txn = ctx.next_txn();
                    let response = clock.stamp(ctx);
                    let id = (index + 1 + seq * lanes) as u64;
                    writer
                        .append(OperationRecord {
                            id,
                            process: index as u32,
                            kind: OpKind::Producer,
                            semantics: Semantics::Fifo,
                            key: Some(id),
                            value: Some(id),
                            invocation,
                            response,
                            succeeded: true,
                            txn,
                        })
                        .unwrap();
                }
                ctx.mark_done(index);
            });
        }

        let mut released = Vec::new();
        let mut watermarks = Vec::new();
        loop {
            let cp = merger.poll().unwrap();
            watermarks.push(cp.watermark);
            released.extend(cp.records);
            if cp.finished {
                break;
            }
            thread::yield_now();
        }
        (released, watermarks)
    })
}

#[test]
fn test_concurrent_lanes_release_everything_once_in_order() {
    let (released, _) = released_history(LANES, PER_LANE);

    assert_eq!(released.len(), LANES * PER_LANE);
    assert!(released
        .windows(2)
        .all(|w| w[0].order_key() < w[1].order_key()));

    let ids: HashSet<u64> = released.iter().map(|r| r.id).collect();
    assert_eq!(ids.len(), released.len());
}

#[test]
fn test_watermark_never_moves_backwards() {
    let (_, watermarks) = released_history(8, 200);
    assert!(watermarks.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(watermarks.last(), Some(&Watermark::Infinite));
}

#[test]
fn test_single_lane_history_is_its_own_order() {
    let (released, _) = released_history(1, 100);
    let ids: Vec<u64> = released.iter().map(|r| r.id).collect();
    assert_eq!(ids, (1..=100).collect::<Vec<u64>>());
}

// ===== Scripted lanes =====

/// Publishes one batch per drain and reports done once nothing is left.
struct ScriptedLane {
    batches: VecDeque<Vec<OperationRecord>>,
}

impl HistorySource for ScriptedLane {
    fn is_done(&self) -> bool {
        self.batches.is_empty()
    }

    fn drain(&mut self, out: &mut Vec<OperationRecord>) -> usize {
        let batch = self.batches.pop_front().unwrap_or_default();
        out.extend_from_slice(&batch);
        batch.len()
    }
}

/// `(gap to the previous response, end the batch here)` per record.
type LaneScript = Vec<(u64, bool)>;

fn scripted_lane(lane: usize, script: &LaneScript) -> ScriptedLane {
    let mut batches = VecDeque::new();
    let mut batch = Vec::new();
    let mut response = 1;
    for (seq, (gap, cut)) in script.iter().enumerate() {
        response += gap;
        let id = (lane * 1_000 + seq + 1) as u64;
        batch.push(OperationRecord {
            id,
            process: lane as u32,
            kind: OpKind::Producer,
            semantics: Semantics::Fifo,
            key: Some(id),
            value: Some(id),
            invocation: response - 1,
            response,
            succeeded: true,
            txn: id,
        });
        if *cut {
            batches.push_back(std::mem::take(&mut batch));
        }
    }
    if !batch.is_empty() {
        batches.push_back(batch);
    }
    ScriptedLane { batches }
}

proptest! {
    #[test]
    fn test_scripted_lanes_release_in_order_under_a_rising_watermark(
        scripts in proptest::collection::vec(
            proptest::collection::vec((1u64..50, any::<bool>()), 0..40),
            1..6,
        ),
    ) {
        let total: usize = scripts.iter().map(Vec::len).sum();
        let lanes: Vec<ScriptedLane> = scripts
            .iter()
            .enumerate()
            .map(|(lane, script)| scripted_lane(lane, script))
            .collect();
        let max_polls = lanes.iter().map(|l| l.batches.len()).max().unwrap_or(0) + 1;
        let mut merger = HistoryMerger::new(lanes);

        let mut released: Vec<OperationRecord> = Vec::new();
        let mut previous = Watermark::At(0);
        let mut polls = 0;
        loop {
            let cp = merger.poll().unwrap();
            polls += 1;
            prop_assert!(cp.watermark >= previous);
            prop_assert!(cp.records.iter().all(|r| cp.watermark.admits(r.response)));
            previous = cp.watermark;
            released.extend(cp.records);
            if cp.finished {
                break;
            }
            prop_assert!(polls < max_polls, "merger still running after {} polls", polls);
        }

        prop_assert_eq!(previous, Watermark::Infinite);
        prop_assert_eq!(released.len(), total);
        prop_assert!(released.windows(2).all(|w| w[0].order_key() < w[1].order_key()));
    }
}
