//! # Worker Log — Single-Writer Append-Only Record Buffer
//!
//! Each worker owns a [`LogWriter`]; the merger owns the matching
//! [`LogReader`]. Slots are pre-allocated and written exactly once, so a
//! record is never mutated after it is published.
//!
//! ```text
//! [0 .. read)        → drained by the merger
//! [read .. len)      → published, not yet drained
//! [len .. capacity)  → free
//! ```
//!
//! # Invariant
//!
//! `read <= len <= capacity`. `len` is only advanced by the writer, with
//! `Release`, after the slot is filled; the reader loads it with
//! `Acquire` before touching any slot below it.

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};

use vg_core::OperationRecord;

struct Shared {
    slots: Box<[OnceLock<OperationRecord>]>,
    len: AtomicUsize,
}

/// Returned when the log has no free slot left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogFull;

/// Create a log with room for `capacity` records.
pub fn worker_log(capacity: usize) -> (LogWriter, LogReader) {
    let slots = (0..capacity).map(|_| OnceLock::new()).collect();
    let shared = Arc::new(Shared {
        slots,
        len: AtomicUsize::new(0),
    });
    (
        LogWriter {
            shared: Arc::clone(&shared),
            len: 0,
        },
        LogReader { shared, read: 0 },
    )
}

pub struct LogWriter {
    shared: Arc<Shared>,
    /// Local copy of the published length; the writer is its only mutator.
    len: usize,
}

impl LogWriter {
    pub fn append(&mut self, record: OperationRecord) -> Result<(), LogFull> {
        let slot = self.shared.slots.get(self.len).ok_or(LogFull)?;
        slot.set(record).map_err(|_| LogFull)?;
        self.len += 1;
        self.shared.len.store(self.len, AtomicOrdering::Release);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.shared.slots.len() - self.len
    }
}

pub struct LogReader {
    shared: Arc<Shared>,
    read: usize,
}

impl LogReader {
    /// Copy every newly published record into `out`. Returns how many.
    pub fn drain_into(&mut self, out: &mut Vec<OperationRecord>) -> usize {
        let published = self.shared.len.load(AtomicOrdering::Acquire);
        let start = self.read;
        for slot in &self.shared.slots[start..published] {
            if let Some(record) = slot.get() {
                out.push(*record);
            }
        }
        self.read = published;
        published - start
    }

    /// Records published but not yet drained.
    #[inline]
    pub fn backlog(&self) -> usize {
        self.shared.len.load(AtomicOrdering::Acquire) - self.read
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.slots.len()
    }
}
