// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub(crate) mod bitset64;
mod executor;
mod hotplug;
pub(crate) mod slot;
pub(crate) mod unitset;

//==============================================================================
// Exports
//==============================================================================

pub mod idle;
pub mod scheduler;
pub mod set;

pub use self::{
    scheduler::{
        SchedStatsSnapshot,
        SharedTickScheduler,
        TickScheduler,
    },
    unitset::UnitSet,
};
