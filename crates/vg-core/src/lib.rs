//! # vg-core — The "Physics" of VIGIL
//!
//! Defines the data atoms every other crate agrees on. A worker produces
//! [`OperationRecord`]s, the merger orders them, and the verifier folds them
//! into one [`ItemState`] per key.
//!
//! Nothing here knows about threads, clocks, or structures under test. The
//! crate is `no_std` (with `alloc`) so the arithmetic can be model-checked
//! with Kani in isolation.

#![no_std]

extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod item;
pub mod potential;

use alloc::string::String;
use core::cmp::Ordering;
use core::fmt;
use core::str::FromStr;

pub use item::{DemotionLink, ItemState, ItemStatus};
pub use potential::{Dyadic, Potential, PotentialMode};

/// Identity of one entity in the structure under test.
pub type Key = u64;

/// Payload carried by an operation.
pub type Value = u64;

/// What an operation attempted to do to the structure under test.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Puts an item in (enqueue, push, insert).
    Producer,
    /// Takes an item out (dequeue, pop, erase).
    Consumer,
    /// Observes an item without removing it.
    Reader,
    /// Updates an item in place.
    Writer,
}

/// Ordering discipline the structure claims for an operation's target.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
#[serde(rename_all = "snake_case")]
pub enum Semantics {
    Fifo,
    Lifo,
    Set,
    Map,
    Priority,
}

impl Semantics {
    /// FIFO and LIFO are the only disciplines that relate one item's
    /// presence to another's.
    #[inline]
    pub fn is_ordered(self) -> bool {
        matches!(self, Semantics::Fifo | Semantics::Lifo)
    }
}

/// The consistency model a run is checked against. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyModel {
    Linearizability,
    SequentialConsistency,
    #[default]
    Serializability,
}

/// One attempted operation, settled once it has a response.
///
/// # Ordering Key
///
/// Records are ordered by `(response, txn, id)`. Ties in `response` are
/// broken by the transaction counter, then by the unique id, so two
/// distinct records never compare equal. The remaining fields are NOT part
/// of the order.
#[derive(
    Debug,
    Clone,
    Copy,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct OperationRecord {
    /// Unique per run.
    pub id: u64,

    /// Index of the worker that issued the operation.
    pub process: u32,

    pub kind: OpKind,

    pub semantics: Semantics,

    /// Entity touched. `None` when the operation could not name one
    /// (a consume from an empty queue).
    pub key: Option<Key>,

    pub value: Option<Value>,

    /// Nanoseconds since the run origin, taken before the call.
    pub invocation: u64,

    /// Nanoseconds since the run origin, taken after the call.
    pub response: u64,

    pub succeeded: bool,

    /// Real-time issue order. Shared by every record of one transaction.
    pub txn: u64,
}

/// The `(response, txn, id)` triple records are totally ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
pub struct OrderKey {
    pub response: u64,
    pub txn: u64,
    pub id: u64,
}

// =============================================================================
// Manual Ord on (response, txn, id)
// =============================================================================

impl Ord for OperationRecord {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl PartialOrd for OperationRecord {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for OperationRecord {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OperationRecord {}

impl OperationRecord {
    #[inline]
    pub fn order_key(&self) -> OrderKey {
        OrderKey {
            response: self.response,
            txn: self.txn,
            id: self.id,
        }
    }

    /// True when the two execution intervals share at least one instant.
    #[inline]
    pub fn overlaps(&self, other: &OperationRecord) -> bool {
        !(self.response < other.invocation || other.response < self.invocation)
    }

    #[inline]
    pub fn is_successful_producer(&self) -> bool {
        self.kind == OpKind::Producer && self.succeeded
    }
}

// =============================================================================
// Text forms (config files and command line)
// =============================================================================

impl FromStr for ConsistencyModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "linearizability" | "lin" => Ok(Self::Linearizability),
            "sequential_consistency" | "sc" => Ok(Self::SequentialConsistency),
            "serializability" | "ser" => Ok(Self::Serializability),
            other => Err(alloc::format!("unknown consistency model: {other}")),
        }
    }
}

impl fmt::Display for ConsistencyModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Linearizability => "linearizability",
            Self::SequentialConsistency => "sequential-consistency",
            Self::Serializability => "serializability",
        })
    }
}

impl FromStr for Semantics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fifo" => Ok(Self::Fifo),
            "lifo" => Ok(Self::Lifo),
            "set" => Ok(Self::Set),
            "map" => Ok(Self::Map),
            "priority" => Ok(Self::Priority),
            other => Err(alloc::format!("unknown semantics: {other}")),
        }
    }
}

impl fmt::Display for Semantics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fifo => "FIFO",
            Self::Lifo => "LIFO",
            Self::Set => "SET",
            Self::Map => "MAP",
            Self::Priority => "PRIORITY",
        })
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(response={}, txn={}, id={})", self.response, self.txn, self.id)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Producer => "PRODUCER",
            Self::Consumer => "CONSUMER",
            Self::Reader => "READER",
            Self::Writer => "WRITER",
        })
    }
}
