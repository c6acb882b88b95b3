//! Which pairs of records are ordering-relevant under each model.

use vg_core::{ConsistencyModel, OperationRecord};

/// True when `a` must be ordered before `b` under `model`.
///
/// - Linearizability: `a` responded before `b` was invoked.
/// - Sequential consistency: as above, restricted to one process.
/// - Serializability: `a` belongs to an earlier transaction, or both are in
///   the same transaction and `a` responded before `b` was invoked.
#[inline]
pub fn precedes(model: ConsistencyModel, a: &OperationRecord, b: &OperationRecord) -> bool {
    match model {
        ConsistencyModel::Linearizability => a.response < b.invocation,
        ConsistencyModel::SequentialConsistency => {
            a.response < b.invocation && a.process == b.process
        }
        ConsistencyModel::Serializability => {
            a.txn < b.txn || (a.txn == b.txn && a.response < b.invocation)
        }
    }
}

/// True when `a` had responded before `b` was invoked and belongs to the
/// same or an earlier transaction. A failed consume or read should have
/// observed whatever such a producer left behind, under every model.
#[inline]
pub fn settled_before(a: &OperationRecord, b: &OperationRecord) -> bool {
    a.response < b.invocation && a.txn <= b.txn
}

/// Whether every record `precedes` can match has `txn <= b.txn`, so a
/// scan may stop at the current transaction.
#[inline]
pub fn bounded_by_txn(model: ConsistencyModel) -> bool {
    model == ConsistencyModel::Serializability
}

#[cfg(test)]
mod tests {
    use super::*;
    use vg_core::{OpKind, Semantics};

    fn rec(process: u32, invocation: u64, response: u64, txn: u64) -> OperationRecord {
        OperationRecord {
            id: txn,
            process,
            kind: OpKind::Producer,
            semantics: Semantics::Fifo,
            key: Some(txn),
            value: None,
            invocation,
            response,
            succeeded: true,
            txn,
        }
    }

    #[test]
    fn test_linearizability_needs_real_time_gap() {
        let a = rec(0, 1, 5, 0);
        let b = rec(1, 6, 9, 1);
        let c = rec(1, 5, 9, 2);
        assert!(precedes(ConsistencyModel::Linearizability, &a, &b));
        assert!(!precedes(ConsistencyModel::Linearizability, &a, &c));
        assert!(!precedes(ConsistencyModel::Linearizability, &b, &a));
    }

    #[test]
    fn test_sequential_consistency_needs_same_process() {
        let a = rec(0, 1, 5, 0);
        let b = rec(1, 6, 9, 1);
        let c = rec(0, 6, 9, 2);
        assert!(!precedes(ConsistencyModel::SequentialConsistency, &a, &b));
        assert!(precedes(ConsistencyModel::SequentialConsistency, &a, &c));
    }

    #[test]
    fn test_serializability_orders_by_transaction() {
        let a = rec(0, 1, 50, 3);
        let b = rec(1, 2, 9, 4);
        assert!(precedes(ConsistencyModel::Serializability, &a, &b));
        assert!(!precedes(ConsistencyModel::Serializability, &b, &a));

        let mut same_txn_later = rec(0, 51, 60, 3);
        same_txn_later.id = 99;
        assert!(precedes(ConsistencyModel::Serializability, &a, &same_txn_later));

        let mut same_txn_overlapping = rec(0, 40, 60, 3);
        same_txn_overlapping.id = 98;
        assert!(!precedes(ConsistencyModel::Serializability, &a, &same_txn_overlapping));
    }

    #[test]
    fn test_settled_before_needs_both_gap_and_txn() {
        let producer = rec(0, 1, 10, 1);
        let overlapping = rec(1, 5, 12, 2);
        let after = rec(1, 11, 12, 2);
        let earlier_txn = rec(1, 11, 12, 0);
        assert!(!settled_before(&producer, &overlapping));
        assert!(settled_before(&producer, &after));
        assert!(!settled_before(&producer, &earlier_txn));
        // Serializability alone would order the overlapping pair.
        assert!(precedes(ConsistencyModel::Serializability, &producer, &overlapping));
    }

    #[test]
    fn test_only_serializability_is_txn_bounded() {
        assert!(bounded_by_txn(ConsistencyModel::Serializability));
        assert!(!bounded_by_txn(ConsistencyModel::Linearizability));
        assert!(!bounded_by_txn(ConsistencyModel::SequentialConsistency));
    }
}
