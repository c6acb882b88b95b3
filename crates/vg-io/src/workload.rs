//! Operation mixes, one per structure kind.
//!
//! | Workload | Mix |
//! |----------|-----|
//! | queue / stack | 50% consume, 50% produce a fresh key |
//! | map | 33% erase `id - 2N`, 33% insert `id`, 34% read `id - N` |
//! | ledger | 30% mint a coin, 70% transfer an owned coin (erase + insert, one txn) |
//!
//! `N` is the worker count and `id` the record id of the operation.

use rand::Rng;
use vg_core::OpKind;

use crate::log::LogFull;
use crate::sut::{StructureKind, StructureUnderTest};
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Queue,
    Stack,
    Map,
    Ledger,
}

impl From<StructureKind> for Workload {
    fn from(kind: StructureKind) -> Self {
        match kind {
            StructureKind::Queue => Workload::Queue,
            StructureKind::Stack => Workload::Stack,
            StructureKind::Map => Workload::Map,
            StructureKind::Ledger => Workload::Ledger,
        }
    }
}

impl Workload {
    /// Upper bound on records one step appends.
    pub fn max_records_per_op(self) -> usize {
        match self {
            Workload::Ledger => 2,
            _ => 1,
        }
    }

    pub fn step(self, w: &mut Worker<'_>, sut: &dyn StructureUnderTest) -> Result<(), LogFull> {
        match self {
            Workload::Queue | Workload::Stack => sequence_step(w, sut),
            Workload::Map => map_step(w, sut),
            Workload::Ledger => ledger_step(w, sut),
        }
    }
}

fn sequence_step(w: &mut Worker<'_>, sut: &dyn StructureUnderTest) -> Result<(), LogFull> {
    let semantics = sut.semantics();
    let id = w.next_id();
    if w.rng().gen_bool(0.5) {
        let call = w.timed(None, || sut.try_consume());
        let taken = call.output;
        w.emit(id, OpKind::Consumer, semantics, taken, taken, &call, taken.is_some())
    } else {
        let call = w.timed(None, || sut.try_produce(id));
        w.emit(id, OpKind::Producer, semantics, Some(id), Some(id), &call, call.output)
    }
}

fn map_step(w: &mut Worker<'_>, sut: &dyn StructureUnderTest) -> Result<(), LogFull> {
    let semantics = sut.semantics();
    let id = w.next_id();
    let n = w.workers() as u64;
    let roll = w.rng().gen_range(0..100u32);

    if roll < 33 {
        let key = id.saturating_sub(2 * n);
        let call = w.timed(None, || sut.try_erase(key));
        w.emit(id, OpKind::Consumer, semantics, Some(key), None, &call, call.output)
    } else if roll < 66 {
        let call = w.timed(None, || sut.try_insert(id, id));
        w.emit(id, OpKind::Producer, semantics, Some(id), Some(id), &call, call.output)
    } else {
        let key = id.saturating_sub(n);
        let call = w.timed(None, || sut.try_read(key));
        let found = call.output;
        w.emit(id, OpKind::Reader, semantics, Some(key), found, &call, found.is_some())
    }
}

fn ledger_step(w: &mut Worker<'_>, sut: &dyn StructureUnderTest) -> Result<(), LogFull> {
    let semantics = sut.semantics();
    let owner = w.index() as u64;

    if w.coins.is_empty() || w.rng().gen_range(0..100u32) < 30 {
        let coin = w.next_id();
        let call = w.timed(None, || sut.try_insert(coin, owner));
        if call.output {
            w.coins.push(coin);
        }
        return w.emit(coin, OpKind::Producer, semantics, Some(coin), Some(owner), &call, call.output);
    }

    let held = w.coins.len();
    let workers = w.workers() as u64;
    let pick = w.rng().gen_range(0..held);
    let coin = w.coins[pick];
    let new_owner = w.rng().gen_range(0..workers);

    let erase_id = w.next_id();
    let erase = w.timed(None, || sut.try_erase(coin));
    w.emit(erase_id, OpKind::Consumer, semantics, Some(coin), None, &erase, erase.output)?;
    if !erase.output {
        return Ok(());
    }

    let insert_id = w.next_id();
    let insert = w.timed(Some(erase.txn), || sut.try_insert(coin, new_owner));
    w.emit(
        insert_id,
        OpKind::Producer,
        semantics,
        Some(coin),
        Some(new_owner),
        &insert,
        insert.output,
    )
}
