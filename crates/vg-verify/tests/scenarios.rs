//! End-to-end behaviour of the engine on small hand-built histories.

use std::collections::VecDeque;

use proptest::prelude::*;
use vg_core::{
    ConsistencyModel, Dyadic, ItemStatus, Key, OpKind, OperationRecord, PotentialMode, Semantics,
};
use vg_verify::{Engine, EngineConfig, Rule, SemanticsOverride, Verdict};

// ===== History builder =====

struct History {
    semantics: Semantics,
    records: Vec<OperationRecord>,
}

impl History {
    fn new(semantics: Semantics) -> Self {
        Self {
            semantics,
            records: Vec::new(),
        }
    }

    fn push(
        &mut self,
        kind: OpKind,
        key: Option<Key>,
        invocation: u64,
        response: u64,
        succeeded: bool,
    ) -> &mut Self {
        let id = self.records.len() as u64 + 1;
        self.records.push(OperationRecord {
            id,
            process: (id % 4) as u32,
            kind,
            semantics: self.semantics,
            key,
            value: key,
            invocation,
            response,
            succeeded,
            txn: id,
        });
        self
    }

    fn produce(&mut self, key: Key, invocation: u64, response: u64) -> &mut Self {
        self.push(OpKind::Producer, Some(key), invocation, response, true)
    }

    fn consume(&mut self, key: Key, invocation: u64, response: u64) -> &mut Self {
        self.push(OpKind::Consumer, Some(key), invocation, response, true)
    }

    fn sorted(&self) -> Vec<OperationRecord> {
        let mut records = self.records.clone();
        records.sort();
        records
    }
}

fn engine(model: ConsistencyModel, mode: PotentialMode) -> Engine {
    Engine::new(EngineConfig {
        model,
        mode,
        ..EngineConfig::default()
    })
}

fn run(history: &History, mode: PotentialMode) -> Engine {
    let mut e = engine(ConsistencyModel::Serializability, mode);
    e.apply_checkpoint(&history.sorted()).unwrap();
    e
}

// ===== Scenarios =====

#[test]
fn test_single_key_produce_then_consume_is_consistent() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(1, 5, 10).consume(1, 15, 20);

    for mode in [PotentialMode::Truncate, PotentialMode::Exact] {
        let e = run(&h, mode);
        let item = e.item(1).unwrap();
        assert_eq!(item.status, ItemStatus::Absent);
        assert_eq!(item.main.exact(), Dyadic::ZERO);
        assert_eq!(e.verdict(), Verdict::Consistent);
    }
}

#[test]
fn test_fifo_second_producer_demotes_the_first() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(0xA, 1, 10).produce(0xB, 11, 15);
    let e = run(&h, PotentialMode::Truncate);

    let a = e.item(0xA).unwrap();
    assert_eq!(a.main.exponent(), 1);
    assert_eq!(a.main.exact(), Dyadic::new(0, 1));
    assert_eq!(a.main.sum(PotentialMode::Truncate), Dyadic::ZERO);
    assert_eq!(a.obligations, [0xB]);
    assert_eq!(a.demotions.len(), 1);

    let b = e.item(0xB).unwrap();
    assert_eq!(b.main.exponent(), 0);
    assert_eq!(b.main.exact(), Dyadic::from_integer(1));
    assert_eq!(e.verdict(), Verdict::Consistent);
}

#[test]
fn test_lifo_second_producer_demotes_itself() {
    let mut h = History::new(Semantics::Lifo);
    h.produce(0xA, 1, 10).produce(0xB, 11, 15);
    let e = run(&h, PotentialMode::Truncate);

    assert_eq!(e.item(0xA).unwrap().main.exponent(), 0);
    let b = e.item(0xB).unwrap();
    assert_eq!(b.main.exponent(), 1);
    assert_eq!(b.obligations, [0xA]);
    assert_eq!(b.demotions[0].key, 0xA);
}

#[test]
fn test_overlapping_producers_are_unrelated_under_linearizability() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(0xA, 1, 10).produce(0xB, 5, 15);
    let mut e = engine(ConsistencyModel::Linearizability, PotentialMode::Exact);
    e.apply_checkpoint(&h.sorted()).unwrap();
    assert_eq!(e.item(0xA).unwrap().main.exponent(), 0);
    assert_eq!(e.verdict(), Verdict::Consistent);
}

#[test]
fn test_failed_consume_with_no_producer_creates_nothing() {
    let mut h = History::new(Semantics::Fifo);
    h.push(OpKind::Consumer, None, 1, 2, false);
    h.push(OpKind::Consumer, Some(9), 3, 4, false);

    let mut e = engine(ConsistencyModel::Serializability, PotentialMode::Exact);
    let report = e.apply_checkpoint(&h.sorted()).unwrap();
    assert_eq!(report.failed_penalties, 0);
    assert_eq!(e.items().count(), 0);
    assert_eq!(e.verdict(), Verdict::Consistent);
}

#[test]
fn test_empty_history_is_vacuously_consistent() {
    let mut e = engine(ConsistencyModel::Serializability, PotentialMode::Exact);
    let report = e.apply_checkpoint(&[]).unwrap();
    assert_eq!(report.sweep, Verdict::Consistent);
    assert_eq!(e.verdict(), Verdict::Consistent);
}

#[test]
fn test_double_consume_is_detected() {
    let mut h = History::new(Semantics::Map);
    h.produce(1, 1, 2).consume(1, 3, 4).consume(1, 5, 6);
    let e = run(&h, PotentialMode::Truncate);

    assert_eq!(e.verdict(), Verdict::Inconsistent);
    let violations = e.violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].key, 1);
    assert_eq!(violations[0].rule, Rule::NegativePotential);
}

#[test]
fn test_duplicate_delivery_from_queue_is_detected_in_any_batching() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(0xA, 1, 2)
        .produce(0xB, 3, 4)
        .consume(0xA, 5, 6)
        .consume(0xA, 7, 8);
    let records = h.sorted();

    let together = run(&h, PotentialMode::Truncate);
    assert_eq!(together.verdict(), Verdict::Inconsistent);

    let mut split = engine(ConsistencyModel::Serializability, PotentialMode::Truncate);
    split.apply_checkpoint(&records[..3]).unwrap();
    assert_eq!(split.verdict(), Verdict::Consistent);
    split.apply_checkpoint(&records[3..]).unwrap();
    assert_eq!(split.verdict(), Verdict::Inconsistent);
}

#[test]
fn test_consume_responding_before_its_producer_settles_cleanly() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(1, 1, 10).consume(1, 5, 8).produce(2, 12, 14);
    let records = h.sorted();
    assert_eq!(records[0].kind, OpKind::Consumer);

    let together = run(&h, PotentialMode::Truncate);
    assert_eq!(together.verdict(), Verdict::Consistent);
    let item = together.item(1).unwrap();
    assert_eq!(item.status, ItemStatus::Absent);
    assert_eq!(item.main.exact(), Dyadic::ZERO);
    // Only the later producer is still live; the settled one never was.
    assert_eq!(together.live_len(), 1);
    assert_eq!(together.item(2).unwrap().main.exponent(), 0);

    let mut split = engine(ConsistencyModel::Serializability, PotentialMode::Truncate);
    split.apply_checkpoint(&records[..1]).unwrap();
    assert_eq!(split.verdict(), Verdict::Inconsistent);
    split.apply_checkpoint(&records[1..]).unwrap();
    assert_eq!(split.verdict(), Verdict::Consistent);
    assert_eq!(split.first_inconsistent(), Some(1));
}

#[test]
fn test_failed_consume_while_item_present_is_caught_in_exact_mode() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(1, 1, 2);
    h.push(OpKind::Consumer, None, 3, 4, false);

    let exact = run(&h, PotentialMode::Exact);
    assert_eq!(exact.item(1).unwrap().failed.exponent(), 1);
    assert_eq!(exact.violations()[0].rule, Rule::MissedItem);

    let truncated = run(&h, PotentialMode::Truncate);
    assert_eq!(truncated.verdict(), Verdict::Consistent);
}

#[test]
fn test_read_after_consume_is_stale_in_exact_mode() {
    let mut h = History::new(Semantics::Map);
    h.produce(3, 1, 2).consume(3, 3, 4);
    h.push(OpKind::Reader, Some(3), 5, 6, true);

    let e = run(&h, PotentialMode::Exact);
    assert_eq!(e.violations()[0].rule, Rule::StaleRead);
}

#[test]
fn test_consume_voids_earlier_reads() {
    let mut h = History::new(Semantics::Map);
    h.produce(3, 1, 2);
    h.push(OpKind::Reader, Some(3), 3, 4, true);
    h.consume(3, 5, 6);

    let e = run(&h, PotentialMode::Exact);
    assert_eq!(e.item(3).unwrap().reader.exact(), Dyadic::ZERO);
    assert_eq!(e.verdict(), Verdict::Consistent);
}

#[test]
fn test_final_empty_checkpoint_is_idempotent() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(1, 1, 2).produce(2, 3, 4).consume(1, 5, 6);
    h.push(OpKind::Consumer, None, 7, 8, false);

    let mut e = run(&h, PotentialMode::Exact);
    let snapshot = |e: &Engine| {
        let mut items: Vec<_> = e.items().cloned().collect();
        items.sort_by_key(|i| i.key);
        items
    };

    e.apply_checkpoint(&[]).unwrap();
    let once = (snapshot(&e), e.verdict(), e.live_len());
    e.apply_checkpoint(&[]).unwrap();
    let twice = (snapshot(&e), e.verdict(), e.live_len());
    assert_eq!(once, twice);
}

#[test]
fn test_semantics_override_rechecks_map_history_as_fifo() {
    let mut h = History::new(Semantics::Map);
    h.produce(1, 1, 2).produce(2, 3, 4);
    let records = h.sorted();

    let mut as_map = Engine::new(EngineConfig::default());
    as_map.apply_checkpoint(&records).unwrap();
    assert_eq!(as_map.item(1).unwrap().main.exponent(), 0);

    let mut as_fifo = Engine::with_adapter(EngineConfig::default(), SemanticsOverride(Semantics::Fifo));
    as_fifo.apply_checkpoint(&records).unwrap();
    assert_eq!(as_fifo.item(1).unwrap().main.exponent(), 1);
}

#[test]
fn test_long_backlog_behind_one_consume_stays_consistent() {
    // Item 0 is enqueued first; its dequeue is in flight while a hundred
    // more items are enqueued, so every one of them demotes it.
    const BACKLOG: u64 = 100;
    let mut h = History::new(Semantics::Fifo);
    h.produce(0, 1, 2);
    for k in 1..=BACKLOG {
        h.produce(k, 10 * k, 10 * k + 5);
    }
    h.consume(0, 5, 100_000);
    let records = h.sorted();

    let e = run(&h, PotentialMode::Truncate);
    let item = e.item(0).unwrap();
    assert_eq!(item.main.exponent(), BACKLOG as i32);
    assert_eq!(item.main.exact(), Dyadic::new(-1, BACKLOG as u32));
    assert_eq!(item.main.sum(PotentialMode::Truncate), Dyadic::ZERO);
    assert_eq!(e.verdict(), Verdict::Consistent);

    let mut stepwise = engine(ConsistencyModel::Serializability, PotentialMode::Truncate);
    for record in &records {
        stepwise.apply_checkpoint(std::slice::from_ref(record)).unwrap();
    }
    assert_eq!(stepwise.verdict(), Verdict::Consistent);
    assert_eq!(stepwise.first_inconsistent(), None);
}

#[test]
fn test_failed_consume_overlapping_a_producer_is_not_penalised() {
    let mut h = History::new(Semantics::Fifo);
    h.produce(1, 1, 10);
    h.push(OpKind::Consumer, None, 5, 12, false);

    let mut e = engine(ConsistencyModel::Serializability, PotentialMode::Exact);
    let report = e.apply_checkpoint(&h.sorted()).unwrap();
    assert_eq!(report.failed_penalties, 0);
    assert_eq!(e.item(1).unwrap().failed.exponent(), 0);
    assert_eq!(e.verdict(), Verdict::Consistent);
}

#[test]
fn test_failed_read_from_an_earlier_transaction_is_not_penalised() {
    let mut h = History::new(Semantics::Map);
    h.push(OpKind::Reader, Some(4), 20, 25, false);
    h.produce(4, 1, 10);
    // The read draws the lower transaction id but is invoked after the
    // insert responded.
    let mut records = h.sorted();
    records.iter_mut().for_each(|r| r.txn = if r.kind == OpKind::Reader { 1 } else { 2 });
    records.sort();

    let mut e = engine(ConsistencyModel::Serializability, PotentialMode::Exact);
    let report = e.apply_checkpoint(&records).unwrap();
    assert_eq!(report.failed_penalties, 0);
    assert_eq!(e.verdict(), Verdict::Consistent);
}

// ===== Batching robustness =====

/// One operation of a correct FIFO queue, stretched around its point in
/// the sequential order.
#[derive(Debug, Clone)]
struct QueueOp {
    produce: bool,
    lead: u64,
    lag: u64,
    txn_seed: u64,
}

fn queue_op() -> impl Strategy<Value = QueueOp> {
    (prop::bool::weighted(0.7), 1u64..2_000, 1u64..2_000, any::<u64>()).prop_map(
        |(produce, lead, lag, txn_seed)| QueueOp {
            produce,
            lead,
            lag,
            txn_seed,
        },
    )
}

/// A concurrent history of a correct FIFO queue. Operation `i` takes
/// effect at `100_000 + 100 * i`, its interval stretches `lead` before and
/// `lag` after that point, and its transaction id is drawn somewhere
/// inside the interval.
fn concurrent_queue_history(ops: &[QueueOp]) -> Vec<OperationRecord> {
    let mut queue: VecDeque<Key> = VecDeque::new();
    let mut records = Vec::with_capacity(ops.len());
    let mut drawn = Vec::with_capacity(ops.len());

    for (i, op) in ops.iter().enumerate() {
        let at = 100_000 + 100 * i as u64;
        let (invocation, response) = (at - op.lead, at + op.lag);
        drawn.push((invocation + 1 + op.txn_seed % (response - invocation - 1), i));

        let (kind, key, succeeded) = if op.produce {
            let key = 1_000 + i as Key;
            queue.push_back(key);
            (OpKind::Producer, Some(key), true)
        } else {
            let taken = queue.pop_front();
            (OpKind::Consumer, taken, taken.is_some())
        };
        records.push(OperationRecord {
            id: i as u64 + 1,
            process: (i % 8) as u32,
            kind,
            semantics: Semantics::Fifo,
            key,
            value: key,
            invocation,
            response,
            succeeded,
            txn: 0,
        });
    }

    drawn.sort_unstable();
    for (txn, (_, i)) in drawn.into_iter().enumerate() {
        records[i].txn = txn as u64;
    }
    records.sort();
    records
}

fn apply_in_batches(
    records: &[OperationRecord],
    model: ConsistencyModel,
    cuts: &[usize],
) -> Engine {
    let mut e = engine(model, PotentialMode::Truncate);
    let mut bounds: Vec<usize> = cuts.iter().map(|c| c % (records.len() + 1)).collect();
    bounds.push(0);
    bounds.push(records.len());
    bounds.sort_unstable();
    bounds.dedup();
    for w in bounds.windows(2) {
        e.apply_checkpoint(&records[w[0]..w[1]]).unwrap();
    }
    e.apply_checkpoint(&[]).unwrap();
    e
}

fn any_model() -> impl Strategy<Value = ConsistencyModel> {
    prop_oneof![
        Just(ConsistencyModel::Linearizability),
        Just(ConsistencyModel::SequentialConsistency),
        Just(ConsistencyModel::Serializability),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_correct_concurrent_queue_is_consistent_for_any_batching(
        ops in proptest::collection::vec(queue_op(), 1..400),
        cuts in proptest::collection::vec(0usize..1_000, 0..16),
        model in any_model(),
    ) {
        let records = concurrent_queue_history(&ops);
        let batched = apply_in_batches(&records, model, &cuts);
        let whole = apply_in_batches(&records, model, &[]);

        prop_assert_eq!(whole.verdict(), Verdict::Consistent);
        prop_assert_eq!(whole.first_inconsistent(), None);
        prop_assert_eq!(batched.verdict(), Verdict::Consistent);

        for item in whole.items() {
            let other = batched.item(item.key).unwrap();
            prop_assert_eq!(&item.main, &other.main);
            prop_assert_eq!(item.status, other.status);
        }
    }

    #[test]
    fn test_single_key_pairs_end_at_zero(pairs in 1usize..50) {
        let mut h = History::new(Semantics::Fifo);
        for i in 0..pairs as u64 {
            h.produce(7, 20 * i, 20 * i + 5).consume(7, 20 * i + 10, 20 * i + 15);
        }
        let e = run(&h, PotentialMode::Exact);
        prop_assert_eq!(e.item(7).unwrap().main.exact(), Dyadic::ZERO);
        prop_assert_eq!(e.verdict(), Verdict::Consistent);
    }
}
