// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The executor pass: the part of a dispatch that runs on the target unit. It consumes the
//! unit's slot snapshot, scans the snapshot's range starting from the rotated cursor, and
//! charges the thread found running on each scanned unit.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    limits,
    registry::UnitRegistry,
    scheduler::{
        scheduler::TickScheduler,
        slot::SlotSnapshot,
    },
    types::{
        SampledThread,
        ThreadId,
        UnitId,
    },
};
use ::arrayvec::ArrayVec;
use ::std::{
    cmp,
    sync::{
        Arc,
        RwLockReadGuard,
    },
};

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Executor-side Associate Functions for the Tick Scheduler
impl TickScheduler {
    /// Runs one executor pass on `unit`, in response to a dispatch signal. Infallible: every
    /// failure mode here is an expected race handled by skipping.
    pub(crate) fn run_executor(&self, unit: UnitId) {
        let snapshot: SlotSnapshot = match self.slots().take(unit) {
            Some(snapshot) => snapshot,
            // Consumed by an earlier pass; spurious wakeup.
            None => return,
        };

        // Resolve the snapshot against the live registry. The snapshot may be one hotplug event
        // stale; bounds are clamped, never trusted.
        let order: ArrayVec<UnitId, { limits::MAX_UNITS }> = {
            let registry: RwLockReadGuard<UnitRegistry> = self.registry().read().expect("registry lock poisoned");
            let len: usize = registry.len();
            let start: usize = cmp::min(snapshot.start, len);
            let end: usize = cmp::min(snapshot.end, len);
            let scan: usize = if snapshot.scan < start || snapshot.scan > end {
                start
            } else {
                snapshot.scan
            };
            // Rotated order: [scan, end) then [start, scan).
            registry.iter_range(scan, end).chain(registry.iter_range(start, scan)).collect()
        };

        trace!(
            "run_executor(): unit {:?}, {} units to scan, {} ticks",
            unit,
            order.len(),
            snapshot.pending
        );
        self.scan_units(order.iter().copied(), snapshot.pending, snapshot.sample_time, snapshot.inline_unit);

        // Completion is signaled only here; the release decrement pairs with the acquire check
        // in tick().
        self.active().dec(snapshot.set_index);
    }

    /// Scans `units`, charging the thread found running on each one. `skip` is the unit already
    /// sampled inline by the dispatching tick. Idle and interrupt-only threads are reported as
    /// None by the bridge and silently skipped; a thread that migrated and was already charged at
    /// `sample_time` is skipped by the stamp guard.
    pub(crate) fn scan_units<I>(&self, units: I, ticks: u64, sample_time: u64, skip: Option<UnitId>)
    where
        I: Iterator<Item = UnitId>,
    {
        debug_assert!(ticks >= 1);
        for unit in units {
            if skip == Some(unit) {
                continue;
            }
            let thread: Arc<SampledThread> = match self.bridge().running_thread(unit) {
                Some(thread) => thread,
                None => continue,
            };
            // A runnable thread with no identity is bookkeeping corruption, not a timing race;
            // continuing would account ticks to nobody.
            if thread.thread_id() == ThreadId::NIL {
                panic!("scan_units(): runnable thread with nil id on unit {:?}", unit);
            }
            if !thread.stamp(sample_time) {
                continue;
            }
            self.bridge().charge_thread_ticks(&thread, ticks);
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
