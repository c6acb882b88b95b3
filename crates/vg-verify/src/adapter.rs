//! Workload adapters: how the engine reads key, value and semantics.
//!
//! Queue, stack, map and ledger histories all go through one engine. The
//! adapter is the only place that knows how a workload encodes its records.

use vg_core::{Key, OperationRecord, Semantics, Value};

pub trait RecordAdapter {
    fn key(&self, record: &OperationRecord) -> Option<Key>;
    fn value(&self, record: &OperationRecord) -> Option<Value>;
    fn semantics(&self, record: &OperationRecord) -> Semantics;
}

/// Reads the record fields as written by the worker.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectAdapter;

impl RecordAdapter for DirectAdapter {
    #[inline]
    fn key(&self, record: &OperationRecord) -> Option<Key> {
        record.key
    }

    #[inline]
    fn value(&self, record: &OperationRecord) -> Option<Value> {
        record.value
    }

    #[inline]
    fn semantics(&self, record: &OperationRecord) -> Semantics {
        record.semantics
    }
}

/// Re-checks a history as if every record declared `0`.
#[derive(Debug, Clone, Copy)]
pub struct SemanticsOverride(pub Semantics);

impl RecordAdapter for SemanticsOverride {
    #[inline]
    fn key(&self, record: &OperationRecord) -> Option<Key> {
        record.key
    }

    #[inline]
    fn value(&self, record: &OperationRecord) -> Option<Value> {
        record.value
    }

    #[inline]
    fn semantics(&self, _record: &OperationRecord) -> Semantics {
        self.0
    }
}

impl<A: RecordAdapter + ?Sized> RecordAdapter for &A {
    fn key(&self, record: &OperationRecord) -> Option<Key> {
        (**self).key(record)
    }

    fn value(&self, record: &OperationRecord) -> Option<Value> {
        (**self).value(record)
    }

    fn semantics(&self, record: &OperationRecord) -> Semantics {
        (**self).semantics(record)
    }
}

impl<A: RecordAdapter + ?Sized> RecordAdapter for Box<A> {
    fn key(&self, record: &OperationRecord) -> Option<Key> {
        (**self).key(record)
    }

    fn value(&self, record: &OperationRecord) -> Option<Value> {
        (**self).value(record)
    }

    fn semantics(&self, record: &OperationRecord) -> Semantics {
        (**self).semantics(record)
    }
}
