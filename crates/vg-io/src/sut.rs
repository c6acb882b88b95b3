//! # Structures Under Test
//!
//! Workers only ever call the five `try_*` operations. How a structure
//! synchronizes internally is its own business.
//!
//! # Catalog
//!
//! | Structure | Semantics | Operations |
//! |-----------|-----------|------------|
//! | [`LockedQueue`] | FIFO | produce, consume |
//! | [`LockedStack`] | LIFO | produce, consume |
//! | [`LockedMap`] | MAP | insert, erase, read |
//! | [`Faulty`] | inherits | any, with an injected defect |

use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use vg_core::{Key, Semantics, Value};

pub trait StructureUnderTest: Send + Sync {
    fn semantics(&self) -> Semantics;

    fn try_produce(&self, _value: Value) -> bool {
        false
    }

    fn try_consume(&self) -> Option<Value> {
        None
    }

    fn try_read(&self, _key: Key) -> Option<Value> {
        None
    }

    fn try_insert(&self, _key: Key, _value: Value) -> bool {
        false
    }

    fn try_erase(&self, _key: Key) -> bool {
        false
    }

    /// Current contents, for the final report. Sequences report each
    /// element as its own key.
    fn snapshot(&self) -> Vec<(Key, Value)>;
}

/// Which structure a run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    #[default]
    Queue,
    Stack,
    Map,
    /// Map of coins to owners driven by transfer transactions.
    Ledger,
}

impl StructureKind {
    pub fn build(self) -> Box<dyn StructureUnderTest> {
        match self {
            StructureKind::Queue => Box::new(LockedQueue::default()),
            StructureKind::Stack => Box::new(LockedStack::default()),
            StructureKind::Map | StructureKind::Ledger => Box::new(LockedMap::default()),
        }
    }
}

impl FromStr for StructureKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "stack" => Ok(Self::Stack),
            "map" => Ok(Self::Map),
            "ledger" => Ok(Self::Ledger),
            other => Err(format!("unknown structure: {other}")),
        }
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Queue => "queue",
            Self::Stack => "stack",
            Self::Map => "map",
            Self::Ledger => "ledger",
        })
    }
}

// =============================================================================
// Correct structures
// =============================================================================

#[derive(Debug, Default)]
pub struct LockedQueue {
    inner: Mutex<VecDeque<Value>>,
}

impl StructureUnderTest for LockedQueue {
    fn semantics(&self) -> Semantics {
        Semantics::Fifo
    }

    fn try_produce(&self, value: Value) -> bool {
        self.inner.lock().push_back(value);
        true
    }

    fn try_consume(&self) -> Option<Value> {
        self.inner.lock().pop_front()
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.inner.lock().iter().map(|v| (*v, *v)).collect()
    }
}

#[derive(Debug, Default)]
pub struct LockedStack {
    inner: Mutex<Vec<Value>>,
}

impl StructureUnderTest for LockedStack {
    fn semantics(&self) -> Semantics {
        Semantics::Lifo
    }

    fn try_produce(&self, value: Value) -> bool {
        self.inner.lock().push(value);
        true
    }

    fn try_consume(&self) -> Option<Value> {
        self.inner.lock().pop()
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.inner.lock().iter().map(|v| (*v, *v)).collect()
    }
}

#[derive(Debug, Default)]
pub struct LockedMap {
    inner: Mutex<BTreeMap<Key, Value>>,
}

impl StructureUnderTest for LockedMap {
    fn semantics(&self) -> Semantics {
        Semantics::Map
    }

    fn try_read(&self, key: Key) -> Option<Value> {
        self.inner.lock().get(&key).copied()
    }

    /// Refuses to overwrite an existing key.
    fn try_insert(&self, key: Key, value: Value) -> bool {
        let mut map = self.inner.lock();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    fn try_erase(&self, key: Key) -> bool {
        self.inner.lock().remove(&key).is_some()
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.inner.lock().iter().map(|(k, v)| (*k, *v)).collect()
    }
}

// =============================================================================
// Fault injection
// =============================================================================

/// A deliberate defect for exercising the checker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum FaultPlan {
    /// Every `every`-th successful consume or erase reports success but
    /// leaves the element in the structure, so it is delivered again.
    ReplayConsume { every: u64 },
}

impl FaultPlan {
    fn every(&self) -> u64 {
        match self {
            FaultPlan::ReplayConsume { every } => (*every).max(1),
        }
    }
}

pub struct Faulty<S> {
    inner: S,
    plan: FaultPlan,
    consumed: AtomicU64,
    injected: AtomicU64,
}

impl<S: StructureUnderTest> Faulty<S> {
    pub fn new(inner: S, plan: FaultPlan) -> Self {
        Self {
            inner,
            plan,
            consumed: AtomicU64::new(0),
            injected: AtomicU64::new(0),
        }
    }

    /// Number of defects injected so far.
    pub fn injected(&self) -> u64 {
        self.injected.load(AtomicOrdering::Relaxed)
    }

    fn strike(&self) -> bool {
        let n = self.consumed.fetch_add(1, AtomicOrdering::Relaxed) + 1;
        let hit = n % self.plan.every() == 0;
        if hit {
            self.injected.fetch_add(1, AtomicOrdering::Relaxed);
        }
        hit
    }
}

impl<S: StructureUnderTest> StructureUnderTest for Faulty<S> {
    fn semantics(&self) -> Semantics {
        self.inner.semantics()
    }

    fn try_produce(&self, value: Value) -> bool {
        self.inner.try_produce(value)
    }

    /// BUG: on a strike the value is handed out and put straight back.
    fn try_consume(&self) -> Option<Value> {
        let value = self.inner.try_consume()?;
        if self.strike() {
            self.inner.try_produce(value);
        }
        Some(value)
    }

    fn try_read(&self, key: Key) -> Option<Value> {
        self.inner.try_read(key)
    }

    fn try_insert(&self, key: Key, value: Value) -> bool {
        self.inner.try_insert(key, value)
    }

    /// BUG: on a strike the erase reports success without removing.
    fn try_erase(&self, key: Key) -> bool {
        if self.inner.try_read(key).is_none() {
            return false;
        }
        if self.strike() {
            return true;
        }
        self.inner.try_erase(key)
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        self.inner.snapshot()
    }
}

impl StructureUnderTest for Box<dyn StructureUnderTest> {
    fn semantics(&self) -> Semantics {
        (**self).semantics()
    }

    fn try_produce(&self, value: Value) -> bool {
        (**self).try_produce(value)
    }

    fn try_consume(&self) -> Option<Value> {
        (**self).try_consume()
    }

    fn try_read(&self, key: Key) -> Option<Value> {
        (**self).try_read(key)
    }

    fn try_insert(&self, key: Key, value: Value) -> bool {
        (**self).try_insert(key, value)
    }

    fn try_erase(&self, key: Key) -> bool {
        (**self).try_erase(key)
    }

    fn snapshot(&self) -> Vec<(Key, Value)> {
        (**self).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_is_fifo() {
        let q = LockedQueue::default();
        assert!(q.try_produce(1));
        assert!(q.try_produce(2));
        assert_eq!(q.try_consume(), Some(1));
        assert_eq!(q.try_consume(), Some(2));
        assert_eq!(q.try_consume(), None);
    }

    #[test]
    fn test_stack_is_lifo() {
        let s = LockedStack::default();
        s.try_produce(1);
        s.try_produce(2);
        assert_eq!(s.try_consume(), Some(2));
        assert_eq!(s.snapshot(), vec![(1, 1)]);
    }

    #[test]
    fn test_map_refuses_duplicate_insert() {
        let m = LockedMap::default();
        assert!(m.try_insert(5, 50));
        assert!(!m.try_insert(5, 51));
        assert_eq!(m.try_read(5), Some(50));
        assert!(m.try_erase(5));
        assert!(!m.try_erase(5));
        assert_eq!(m.try_read(5), None);
    }

    #[test]
    fn test_unsupported_calls_fail() {
        let q = LockedQueue::default();
        assert!(!q.try_insert(1, 1));
        assert!(!q.try_erase(1));
        assert_eq!(q.try_read(1), None);
    }

    #[test]
    fn test_faulty_queue_delivers_twice() {
        let q = Faulty::new(LockedQueue::default(), FaultPlan::ReplayConsume { every: 1 });
        q.try_produce(7);
        assert_eq!(q.try_consume(), Some(7));
        assert_eq!(q.try_consume(), Some(7));
        assert_eq!(q.injected(), 2);
    }

    #[test]
    fn test_faulty_map_keeps_erased_key() {
        let m = Faulty::new(LockedMap::default(), FaultPlan::ReplayConsume { every: 2 });
        m.try_insert(1, 10);
        assert!(m.try_erase(1));
        assert_eq!(m.try_read(1), None);
        m.try_insert(2, 20);
        assert!(m.try_erase(2));
        assert_eq!(m.try_read(2), Some(20));
        assert_eq!(m.injected(), 1);
    }

    #[test]
    fn test_structure_kind_parses() {
        assert_eq!("Ledger".parse::<StructureKind>(), Ok(StructureKind::Ledger));
        assert_eq!(StructureKind::Stack.build().semantics(), Semantics::Lifo);
    }
}
