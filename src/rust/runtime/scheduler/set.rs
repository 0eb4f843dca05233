// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    registry::UnitRegistry,
    scheduler::unitset::UnitSet,
};
use ::std::sync::atomic::{
    AtomicU32,
    Ordering,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// One accounting set: a contiguous range `[start, end)` of registry indices whose per-tick
/// sampling is dispatched and tracked as one batch. Ranges, cursors and membership are guarded by
/// the scheduler's global lock; the in-flight counter lives separately in [ActiveCounters] so
/// executor passes can signal completion without it.
pub struct AccountingSet {
    /// First registry index covered by this set.
    start: usize,
    /// One past the last registry index covered by this set.
    end: usize,
    /// Rotating cursor: the registry index scanned first by the next pass.
    scan: usize,
    /// Unit ids currently covered, for the idle detector.
    members: UnitSet,
}

/// In-flight dispatch counters, one per accounting set. Lock-free: the scheduler is the only
/// incrementer and each executor pass decrements exactly once on completion. The decrement uses
/// release ordering and pairs with the acquire load in [ActiveCounters::any_active], so a round
/// observed as quiescent happens-after every completed pass.
pub struct ActiveCounters {
    counters: Box<[AtomicU32]>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Accounting Sets
impl AccountingSet {
    pub fn new() -> Self {
        Self {
            start: 0,
            end: 0,
            scan: 0,
            members: UnitSet::new(),
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn scan(&self) -> usize {
        self.scan
    }

    pub fn members(&self) -> &UnitSet {
        &self.members
    }

    /// Number of units covered.
    pub fn width(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Points this set at `[start, end)` and recomputes its membership from the registry. The
    /// scan cursor is clamped back into range if the boundaries moved under it.
    pub fn assign(&mut self, start: usize, end: usize, registry: &UnitRegistry) {
        debug_assert!(start <= end);
        self.start = start;
        self.end = end;
        if self.scan < start || self.scan >= end {
            self.scan = start;
        }
        self.members.reset();
        for unit in registry.iter_range(start, end) {
            self.members.set(unit);
        }
    }

    /// Advances the rotating scan cursor by one unit, wrapping within the range.
    pub fn advance_scan(&mut self) {
        if self.is_empty() {
            return;
        }
        self.scan += 1;
        if self.scan >= self.end {
            self.scan = self.start;
        }
    }
}

/// Associate Functions for Active Counters
impl ActiveCounters {
    pub fn new(nsets: usize) -> Self {
        let counters: Vec<AtomicU32> = (0..nsets).map(|_| AtomicU32::new(0)).collect();
        Self {
            counters: counters.into_boxed_slice(),
        }
    }

    /// Records one more in-flight dispatch for `set_index`. Called before the signal is sent.
    pub fn inc(&self, set_index: usize) {
        self.counters[set_index].fetch_add(1, Ordering::AcqRel);
    }

    /// Records completion of one executor pass for `set_index`. This is the sole completion
    /// signal: the scheduler never waits on it synchronously.
    pub fn dec(&self, set_index: usize) {
        let previous: u32 = self.counters[set_index].fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0);
    }

    /// True if any set still has an executor pass in flight.
    pub fn any_active(&self) -> bool {
        self.counters
            .iter()
            .any(|counter: &AtomicU32| counter.load(Ordering::Acquire) > 0)
    }

    #[cfg(test)]
    pub fn load(&self, set_index: usize) -> u32 {
        self.counters[set_index].load(Ordering::Acquire)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for AccountingSet {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
