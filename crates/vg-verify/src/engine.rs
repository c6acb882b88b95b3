//! # Verification Engine
//!
//! Folds checkpoints of settled [`OperationRecord`]s into per-key
//! [`ItemState`]s, then sweeps every item touched by the checkpoint.
//!
//! ```text
//!   checkpoint ──► apply each record ──► drain worklists ──► sweep
//!                  (produce / consume /   (promotions,         (dirty
//!                   read / failures)       failed, finished)    items)
//! ```
//!
//! The engine owns all item state. It is driven from a single thread and
//! needs no locking.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vg_core::{
    ConsistencyModel, DemotionLink, ItemState, Key, OpKind, OperationRecord, OrderKey,
    PotentialMode, Semantics,
};

use crate::adapter::{DirectAdapter, RecordAdapter};
use crate::error::VerifyError;
use crate::model;
use crate::verdict::{self, Verdict, VerdictPolicy, Violation};

/// Settled records between two progress lines.
pub const PROGRESS_INTERVAL: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    pub model: ConsistencyModel,
    pub mode: PotentialMode,
    pub policy: VerdictPolicy,
}

/// Outcome of one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointReport {
    /// 1-based checkpoint index.
    pub index: u64,
    pub records: usize,
    /// Failed-track penalties applied while draining.
    pub failed_penalties: usize,
    /// Promotions applied while draining obligations.
    pub promotions: usize,
    /// Keys that became inconsistent in this checkpoint.
    pub newly_inconsistent: Vec<Key>,
    /// Verdict of this sweep alone.
    pub sweep: Verdict,
}

type LiveKey = (u64, u64);

pub struct Engine<A = DirectAdapter> {
    config: EngineConfig,
    adapter: A,
    items: HashMap<Key, ItemState>,
    /// Settled successful producers not yet retired, by `(txn, id)`.
    live: BTreeMap<LiveKey, OperationRecord>,
    last: Option<OrderKey>,

    // ===== batch worklists =====
    promotions: Vec<Key>,
    failed: Vec<Key>,
    finished: Vec<LiveKey>,
    dirty: BTreeSet<Key>,

    // ===== verdict state =====
    /// Key -> checkpoint at which it turned inconsistent.
    violating: BTreeMap<Key, u64>,
    consistent: bool,
    first_inconsistent: Option<u64>,
    checkpoints: u64,
    applied: u64,
}

impl Engine<DirectAdapter> {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_adapter(config, DirectAdapter)
    }
}

impl<A: RecordAdapter> Engine<A> {
    pub fn with_adapter(config: EngineConfig, adapter: A) -> Self {
        Self {
            config,
            adapter,
            items: HashMap::new(),
            live: BTreeMap::new(),
            last: None,
            promotions: Vec::new(),
            failed: Vec::new(),
            finished: Vec::new(),
            dirty: BTreeSet::new(),
            violating: BTreeMap::new(),
            consistent: true,
            first_inconsistent: None,
            checkpoints: 0,
            applied: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one checkpoint. `records` must be in ascending ordering key
    /// and strictly after everything applied before.
    pub fn apply_checkpoint(
        &mut self,
        records: &[OperationRecord],
    ) -> Result<CheckpointReport, VerifyError> {
        for record in records {
            self.apply(record)?;
        }

        let promotions = self.drain_promotions();
        let failed_penalties = self.drain_failed();
        self.drain_finished();

        self.checkpoints += 1;
        let newly_inconsistent = self.sweep();
        let sweep = if self.violating.is_empty() {
            Verdict::Consistent
        } else {
            Verdict::Inconsistent
        };

        match self.config.policy {
            VerdictPolicy::LastCheckpoint => self.consistent = sweep.is_consistent(),
            VerdictPolicy::Cumulative => self.consistent &= sweep.is_consistent(),
        }
        if !sweep.is_consistent() && self.first_inconsistent.is_none() {
            self.first_inconsistent = Some(self.checkpoints);
        }

        debug!(
            checkpoint = self.checkpoints,
            records = records.len(),
            live = self.live.len(),
            items = self.items.len(),
            violating = self.violating.len(),
            "checkpoint applied"
        );

        Ok(CheckpointReport {
            index: self.checkpoints,
            records: records.len(),
            failed_penalties,
            promotions,
            newly_inconsistent,
            sweep,
        })
    }

    /// Global verdict under the configured policy.
    pub fn verdict(&self) -> Verdict {
        if self.consistent {
            Verdict::Consistent
        } else {
            Verdict::Inconsistent
        }
    }

    /// Index of the first checkpoint whose sweep found a violation.
    pub fn first_inconsistent(&self) -> Option<u64> {
        self.first_inconsistent
    }

    pub fn checkpoints(&self) -> u64 {
        self.checkpoints
    }

    pub fn records_applied(&self) -> u64 {
        self.applied
    }

    pub fn item(&self, key: Key) -> Option<&ItemState> {
        self.items.get(&key)
    }

    pub fn items(&self) -> impl Iterator<Item = &ItemState> {
        self.items.values()
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Items inconsistent as of the latest sweep, by key.
    pub fn violations(&self) -> Vec<Violation> {
        self.violating
            .iter()
            .filter_map(|(key, checkpoint)| {
                let item = self.items.get(key)?;
                let rule = verdict::broken_rule(item, self.config.mode)?;
                Some(verdict::describe(item, rule, self.config.mode, *checkpoint))
            })
            .collect()
    }

    // =========================================================================
    // Per-record application
    // =========================================================================

    fn apply(&mut self, record: &OperationRecord) -> Result<(), VerifyError> {
        let order = record.order_key();
        if let Some(last) = self.last {
            if order <= last {
                return Err(VerifyError::OutOfOrder { last, got: order });
            }
        }
        self.last = Some(order);

        self.applied += 1;
        if self.applied % PROGRESS_INTERVAL == 0 {
            debug!(applied = self.applied, live = self.live.len(), "verification progress");
        }

        match (record.kind, record.succeeded) {
            (OpKind::Producer, true) => {
                let key = self.require_key(record)?;
                self.produce(key, record);
            }
            (OpKind::Consumer, true) => {
                let key = self.require_key(record)?;
                self.consume(key, record);
            }
            (OpKind::Reader, true) => {
                let key = self.require_key(record)?;
                self.item_mut(key).reader.demote();
                self.dirty.insert(key);
            }
            (OpKind::Consumer, false) | (OpKind::Reader, false) => self.fail(record),
            // A refused insert and any writer leave every track untouched.
            (OpKind::Producer, false) | (OpKind::Writer, _) => {}
        }
        Ok(())
    }

    fn require_key(&self, record: &OperationRecord) -> Result<Key, VerifyError> {
        self.adapter.key(record).ok_or(VerifyError::MissingKey {
            id: record.id,
            kind: record.kind,
        })
    }

    fn item_mut(&mut self, key: Key) -> &mut ItemState {
        self.items.entry(key).or_insert_with(|| ItemState::new(key))
    }

    /// Live producers `precedes` may match against `record`.
    fn candidates<'a>(
        live: &'a BTreeMap<LiveKey, OperationRecord>,
        model: ConsistencyModel,
        record: &OperationRecord,
    ) -> Box<dyn Iterator<Item = &'a OperationRecord> + 'a> {
        if model::bounded_by_txn(model) {
            Box::new(live.range(..=(record.txn, u64::MAX)).map(|(_, r)| r))
        } else {
            Box::new(live.values())
        }
    }

    fn produce(&mut self, key: Key, record: &OperationRecord) {
        let value = self.adapter.value(record);
        let present = self.item_mut(key).produce(record, value);
        self.dirty.insert(key);
        if !present {
            // Settled a consume that responded first; nothing left to order.
            return;
        }

        let semantics = self.adapter.semantics(record);
        if semantics.is_ordered() {
            let model = self.config.model;
            let earlier: Vec<DemotionLink> = Self::candidates(&self.live, model, record)
                .filter(|e| self.adapter.semantics(e) == semantics)
                .filter(|e| model::precedes(model, e, record))
                .filter_map(|e| {
                    let k = self.adapter.key(e)?;
                    let present = self.items.get(&k).is_some_and(ItemState::is_present);
                    (k != key && present).then(|| DemotionLink::new(k, e))
                })
                .collect();

            match semantics {
                Semantics::Fifo => {
                    let link = DemotionLink::new(key, record);
                    for earlier in earlier {
                        let target = self.item_mut(earlier.key);
                        target.main.demote();
                        target.obligations.push(key);
                        target.demotions.push(link);
                        self.dirty.insert(earlier.key);
                    }
                }
                Semantics::Lifo => {
                    let target = self.item_mut(key);
                    for earlier in earlier {
                        target.main.demote();
                        target.obligations.push(earlier.key);
                        target.demotions.push(earlier);
                    }
                }
                _ => unreachable!("only ordered semantics reach the scan"),
            }
        }

        self.live.insert((record.txn, record.id), *record);
    }

    fn consume(&mut self, key: Key, record: &OperationRecord) {
        let mode = self.config.mode;
        let item = self.item_mut(key);

        if item.main.sum(mode).is_positive() {
            item.reader.reset();
        }
        item.main.sub_int(1);
        item.status = vg_core::ItemStatus::Absent;

        if item.main.sum(mode).is_negative() {
            let links = mem::take(&mut item.demotions);
            for link in links {
                if link.overlaps(record) {
                    item.demotions.push(link);
                } else {
                    item.main.promote();
                    item.cancel_obligation(link.key);
                }
            }
        }

        let producer = item.producer.take();
        self.promotions.push(key);
        if let Some(p) = producer {
            self.finished.push((p.txn, p.id));
        }
        self.dirty.insert(key);
    }

    /// Queue the present items a failed consume or read should have seen:
    /// producers settled before its invocation, in this or an earlier
    /// transaction.
    fn fail(&mut self, record: &OperationRecord) {
        let target = self.adapter.key(record);
        let penalised: Vec<Key> = self
            .live
            .range(..=(record.txn, u64::MAX))
            .map(|(_, e)| e)
            .filter(|e| model::settled_before(e, record))
            .filter_map(|e| {
                let key = self.adapter.key(e)?;
                let related = self.adapter.semantics(e).is_ordered() || Some(key) == target;
                let present = self.items.get(&key).is_some_and(ItemState::is_present);
                (related && present).then_some(key)
            })
            .collect();
        self.failed.extend(penalised);
    }

    // =========================================================================
    // Batch drains
    // =========================================================================

    fn drain_promotions(&mut self) -> usize {
        let mut applied = 0;
        for key in mem::take(&mut self.promotions) {
            let Some(item) = self.items.get_mut(&key) else {
                continue;
            };
            let mut obligations = mem::take(&mut item.obligations);
            if !item.is_present() {
                item.release_links();
            }
            while let Some(linked) = obligations.pop() {
                if let Some(target) = self.items.get_mut(&linked) {
                    target.main.promote();
                    self.dirty.insert(linked);
                    applied += 1;
                }
            }
        }
        applied
    }

    fn drain_failed(&mut self) -> usize {
        let mut applied = 0;
        for key in mem::take(&mut self.failed) {
            if let Some(item) = self.items.get_mut(&key) {
                if item.is_present() {
                    item.failed.demote();
                    self.dirty.insert(key);
                    applied += 1;
                }
            }
        }
        applied
    }

    fn drain_finished(&mut self) {
        for live_key in mem::take(&mut self.finished) {
            self.live.remove(&live_key);
        }
    }

    /// Re-evaluate every item touched since the last sweep. Untouched items
    /// keep their previous verdict, so this matches a sweep over all items.
    fn sweep(&mut self) -> Vec<Key> {
        let mut newly = Vec::new();
        for key in mem::take(&mut self.dirty) {
            let Some(item) = self.items.get(&key) else {
                continue;
            };
            match verdict::broken_rule(item, self.config.mode) {
                Some(rule) => {
                    if !self.violating.contains_key(&key) {
                        self.violating.insert(key, self.checkpoints);
                        warn!(
                            key,
                            %rule,
                            main = %item.main.exact(),
                            failed = %item.failed.exact(),
                            reader = %item.reader.exact(),
                            checkpoint = self.checkpoints,
                            "item became inconsistent"
                        );
                        newly.push(key);
                    }
                }
                None => {
                    self.violating.remove(&key);
                }
            }
        }
        newly
    }

    /// Re-evaluate every known item from scratch.
    pub fn full_sweep(&self) -> Verdict {
        let mode = self.config.mode;
        if self.items.values().any(|i| verdict::broken_rule(i, mode).is_some()) {
            Verdict::Inconsistent
        } else {
            Verdict::Consistent
        }
    }
}
