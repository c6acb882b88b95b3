//! Per-key bookkeeping owned by the verifier.

use alloc::vec::Vec;

use crate::potential::Potential;
use crate::{Key, OperationRecord, OrderKey, Value};

/// Whether the structure should currently hold the item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Present,
    Absent,
}

/// Compact copy of the record that caused a demotion.
///
/// Holds only what later overlap checks and obligation cancellation need,
/// so the full record can be retired independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct DemotionLink {
    /// Key of the item whose obligation list carries the matching entry.
    pub key: Key,
    pub invocation: u64,
    pub response: u64,
    pub txn: u64,
    pub id: u64,
}

impl DemotionLink {
    pub fn new(key: Key, record: &OperationRecord) -> Self {
        Self {
            key,
            invocation: record.invocation,
            response: record.response,
            txn: record.txn,
            id: record.id,
        }
    }

    /// Same closed-interval test as [`OperationRecord::overlaps`].
    #[inline]
    pub fn overlaps(&self, record: &OperationRecord) -> bool {
        !(self.response < record.invocation || record.response < self.invocation)
    }
}

/// Item Potential State: one per key ever touched by a successful record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemState {
    pub key: Key,
    /// Latest value carried by a producer of this key.
    pub value: Option<Value>,
    pub status: ItemStatus,
    /// Main track: produced minus consumed, less pending demotions.
    pub main: Potential,
    /// Failed track: penalties from failed consumers and readers.
    pub failed: Potential,
    /// Reader track: penalties from successful readers.
    pub reader: Potential,
    /// Keys to promote once this item is consumed (LIFO stack).
    pub obligations: Vec<Key>,
    pub demotions: Vec<DemotionLink>,
    /// Ordering key of the producer that made the item present.
    pub producer: Option<OrderKey>,
}

impl ItemState {
    /// Fresh item: absent, all tracks at zero.
    pub fn new(key: Key) -> Self {
        Self {
            key,
            value: None,
            status: ItemStatus::Absent,
            main: Potential::new(),
            failed: Potential::new(),
            reader: Potential::new(),
            obligations: Vec::new(),
            demotions: Vec::new(),
            producer: None,
        }
    }

    #[inline]
    pub fn is_present(&self) -> bool {
        self.status == ItemStatus::Present
    }

    /// Apply a successful producer and return whether the item is now
    /// present.
    ///
    /// An absent item owing at least one whole unit was consumed before this
    /// producer's response: the unit settles that consume and the item stays
    /// absent. Otherwise an absent item is re-armed.
    pub fn produce(&mut self, record: &OperationRecord, value: Option<Value>) -> bool {
        self.value = value;
        if self.status == ItemStatus::Absent {
            if self.main.exact().ceil() < 0 {
                self.main.add_int(1);
                return false;
            }
            self.status = ItemStatus::Present;
            self.demotions.clear();
        }
        self.main.add_int(1);
        self.producer = Some(record.order_key());
        true
    }

    /// Remove the top-most occurrence of `key` from the obligation stack.
    pub fn cancel_obligation(&mut self, key: Key) -> bool {
        match self.obligations.iter().rposition(|k| *k == key) {
            Some(pos) => {
                self.obligations.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Drop links and obligations that can no longer be referenced.
    pub fn release_links(&mut self) {
        self.demotions.clear();
        self.demotions.shrink_to_fit();
        self.obligations.clear();
        self.obligations.shrink_to_fit();
    }
}
