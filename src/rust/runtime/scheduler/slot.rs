// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    limits,
    types::UnitId,
};
use ::std::sync::Mutex;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Snapshot handed to an executor pass: everything it needs to scan without touching shared
/// scheduler state.
pub struct SlotSnapshot {
    /// Ticks to charge. Always >= 1.
    pub pending: u64,
    /// Registry index range to scan.
    pub start: usize,
    pub end: usize,
    /// Registry index scanned first (rotated; wraps back to `start`).
    pub scan: usize,
    /// Owning accounting set, for the completion decrement.
    pub set_index: usize,
    /// Tick sequence number of the dispatching tick; the double-charge guard.
    pub sample_time: u64,
    /// Unit already scanned inline by the dispatching tick; skipped here.
    pub inline_unit: Option<UnitId>,
}

/// Pending dispatch state for one target unit. Only the dispatching tick writes it and only the
/// executor pass running on the target unit consumes it, each under the slot lock; the lock is
/// never held across a scan or a charge callback.
struct SlotState {
    pending: u64,
    start: usize,
    end: usize,
    scan: usize,
    set_index: usize,
    sample_time: u64,
    inline_unit: Option<UnitId>,
}

/// One unit's mailbox. Aligned to the cache line so neighboring slots in the arena never share
/// one.
#[repr(align(64))]
struct DispatchSlot {
    state: Mutex<SlotState>,
}

/// Fixed arena of dispatch slots, indexed by unit id. Slot identity is stable across hotplug.
pub struct SlotArena {
    slots: Box<[DispatchSlot]>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl DispatchSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                pending: 0,
                start: 0,
                end: 0,
                scan: 0,
                set_index: 0,
                sample_time: 0,
                inline_unit: None,
            }),
        }
    }
}

/// Associate Functions for the Slot Arena
impl SlotArena {
    pub fn new() -> Self {
        let slots: Vec<DispatchSlot> = (0..limits::MAX_UNITS).map(|_| DispatchSlot::new()).collect();
        Self {
            slots: slots.into_boxed_slice(),
        }
    }

    /// Posts a dispatch into `unit`'s slot. Pending ticks accumulate if a previous post has not
    /// been consumed yet; the range, cursor and sample time are overwritten with the newest
    /// snapshot.
    #[allow(clippy::too_many_arguments)]
    pub fn post(
        &self,
        unit: UnitId,
        pending: u64,
        start: usize,
        end: usize,
        scan: usize,
        set_index: usize,
        sample_time: u64,
        inline_unit: Option<UnitId>,
    ) {
        let mut state = self.slots[usize::from(unit)]
            .state
            .lock()
            .expect("slot lock poisoned");
        state.pending += pending;
        state.start = start;
        state.end = end;
        state.scan = scan;
        state.set_index = set_index;
        state.sample_time = sample_time;
        state.inline_unit = inline_unit;
    }

    /// Takes and clears `unit`'s slot. Returns None when there is nothing pending (a spurious or
    /// already-consumed signal).
    pub fn take(&self, unit: UnitId) -> Option<SlotSnapshot> {
        let mut state = self.slots[usize::from(unit)]
            .state
            .lock()
            .expect("slot lock poisoned");
        if state.pending == 0 {
            return None;
        }
        let snapshot: SlotSnapshot = SlotSnapshot {
            pending: state.pending,
            start: state.start,
            end: state.end,
            scan: state.scan,
            set_index: state.set_index,
            sample_time: state.sample_time,
            inline_unit: state.inline_unit,
        };
        state.pending = 0;
        Some(snapshot)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for SlotArena {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
