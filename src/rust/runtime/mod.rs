// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Exports
//======================================================================================================================

pub mod dispatch;
pub mod fail;
pub mod limits;
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod types;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::types::{
    SampledThread,
    UnitId,
};
use ::std::{
    ops::Deref,
    sync::Arc,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// The SharedObject wraps an object that is shared between the tick scheduler and the per-unit
/// executor loops running on other threads.
pub struct SharedObject<T>(Arc<T>);

//======================================================================================================================
// Traits
//======================================================================================================================

/// The outward boundary of the subsystem. The embedder supplies one implementation at
/// initialization time; both methods are invoked from executor passes and must not block.
pub trait ClockBridge: Send + Sync {
    /// Identifies the thread currently running on `unit`. Returns None when the unit is idle or
    /// running an interrupt-only thread, in which case there is nothing meaningful to charge.
    fn running_thread(&self, unit: UnitId) -> Option<Arc<SampledThread>>;

    /// Charges `ticks` ticks of accumulated CPU time to `thread`. Called at most once per unit
    /// per executor pass, with `ticks >= 1`, and never while any subsystem lock is held.
    fn charge_thread_ticks(&self, thread: &SampledThread, ticks: u64);
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl<T> SharedObject<T> {
    pub fn new(object: T) -> Self {
        Self(Arc::new(object))
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl<T> Clone for SharedObject<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Deref for SharedObject<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
