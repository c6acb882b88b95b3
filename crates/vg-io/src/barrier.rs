//! Counting start barrier: every worker arrives, then all leave together.

use std::hint;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::thread;

/// Spins this many times before yielding the core.
const SPINS_BEFORE_YIELD: u32 = 64;

#[derive(Debug)]
pub struct StartBarrier {
    arrived: AtomicUsize,
    parties: usize,
}

impl StartBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            arrived: AtomicUsize::new(0),
            parties,
        }
    }

    /// Count an arrival without waiting.
    pub fn arrive(&self) {
        self.arrived.fetch_add(1, AtomicOrdering::AcqRel);
    }

    /// Arrive and wait until all `parties` have arrived.
    pub fn wait(&self) {
        self.arrive();
        let mut spins = 0u32;
        while self.arrived.load(AtomicOrdering::Acquire) < self.parties {
            if spins < SPINS_BEFORE_YIELD {
                hint::spin_loop();
                spins += 1;
            } else {
                thread::yield_now();
            }
        }
    }

    pub fn arrived(&self) -> usize {
        self.arrived.load(AtomicOrdering::Acquire)
    }

    pub fn parties(&self) -> usize {
        self.parties
    }
}
