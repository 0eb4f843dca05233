// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
    types::UnitId,
};
use ::arrayvec::ArrayVec;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Ordered list of the currently online execution units. Accounting-set ranges are index ranges
/// into this list. The registry is mutated only by hotplug events; removal compacts the list, so
/// an index is stable only between hotplug events and readers must clamp stale indices.
pub struct UnitRegistry {
    units: ArrayVec<UnitId, { limits::MAX_UNITS }>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for the Unit Registry
impl UnitRegistry {
    pub fn new() -> Self {
        Self {
            units: ArrayVec::new(),
        }
    }

    /// Number of online units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Unit at registry index `ix`, if the index is in bounds.
    pub fn unit_at(&self, ix: usize) -> Option<UnitId> {
        self.units.get(ix).copied()
    }

    /// Registry index of `unit`, if online.
    pub fn index_of(&self, unit: UnitId) -> Option<usize> {
        self.units.iter().position(|id: &UnitId| *id == unit)
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        self.index_of(unit).is_some()
    }

    /// Appends a unit coming online. Returns its registry index.
    pub fn insert(&mut self, unit: UnitId) -> Result<usize, Fail> {
        if usize::from(unit) >= limits::MAX_UNITS {
            let cause: String = format!("unit id out of range: {:?}", unit);
            error!("insert(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        if self.contains(unit) {
            let cause: String = format!("unit is already online: {:?}", unit);
            error!("insert(): {}", cause);
            return Err(Fail::new(libc::EEXIST, &cause));
        }
        if self.units.is_full() {
            let cause: String = format!("unit table is full: {:?}", unit);
            error!("insert(): {}", cause);
            return Err(Fail::new(libc::ENOSPC, &cause));
        }
        self.units.push(unit);
        Ok(self.units.len() - 1)
    }

    /// Removes a unit going offline, compacting the list. Returns the index it occupied.
    pub fn remove(&mut self, unit: UnitId) -> Result<usize, Fail> {
        match self.index_of(unit) {
            Some(ix) => {
                // Preserves registry order for all remaining units.
                self.units.remove(ix);
                Ok(ix)
            },
            None => {
                let cause: String = format!("unit is not online: {:?}", unit);
                error!("remove(): {}", cause);
                Err(Fail::new(libc::ENOENT, &cause))
            },
        }
    }

    /// Units at indices `[start, end)`, in registry order.
    pub fn iter_range(&self, start: usize, end: usize) -> impl Iterator<Item = UnitId> + '_ {
        self.units[start.min(self.units.len())..end.min(self.units.len())]
            .iter()
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().copied()
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for UnitRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
