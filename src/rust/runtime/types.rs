// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use ::std::sync::atomic::{
    AtomicU64,
    Ordering,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Identity of one execution unit (processor) participating in tick accounting.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Copy, Hash, Debug)]
pub struct UnitId(usize);

/// Identity of a scheduling domain (a group of units sharing an idle/power state).
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug)]
pub struct DomainId(usize);

/// Identity of a thread as reported by the embedder. The zero value is reserved: a runnable thread
/// carrying it indicates bookkeeping corruption on the embedder side.
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug)]
pub struct ThreadId(u64);

/// Processor selection policy for dispatch targets.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Policy {
    /// Spread dispatch origins over all online units, rotating once per period boundary.
    Performance,
    /// Prefer targets close to the calling unit so idle domains are not woken.
    Power,
}

/// Per-thread sampling handle. The embedder allocates one of these per thread it may report from
/// [crate::ClockBridge::running_thread] and keeps it alive for the thread's lifetime. The stamp
/// stored here is what keeps a thread that migrates between units mid-scan from being charged
/// twice for the same tick.
pub struct SampledThread {
    /// Thread identity.
    id: ThreadId,
    /// Tick sequence number of the last charge.
    sample_time: AtomicU64,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

impl ThreadId {
    /// Reserved nil id. Never valid for a runnable thread.
    pub const NIL: ThreadId = ThreadId(0);
}

/// Associate Functions for Sampled Threads
impl SampledThread {
    /// Creates a sampling handle for the thread identified by `id`.
    pub fn new(id: ThreadId) -> Self {
        Self {
            id,
            sample_time: AtomicU64::new(0),
        }
    }

    /// Returns the identity of the target thread.
    pub fn thread_id(&self) -> ThreadId {
        self.id
    }

    /// Stamps the target thread with `sample_time`. Returns false if the thread was already
    /// stamped at that time, in which case the caller must not charge it again.
    pub(crate) fn stamp(&self, sample_time: u64) -> bool {
        self.sample_time.swap(sample_time, Ordering::AcqRel) != sample_time
    }

    #[cfg(test)]
    pub(crate) fn last_sample_time(&self) -> u64 {
        self.sample_time.load(Ordering::Acquire)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl From<usize> for UnitId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<UnitId> for usize {
    fn from(value: UnitId) -> Self {
        value.0
    }
}

impl From<usize> for DomainId {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

impl From<DomainId> for usize {
    fn from(value: DomainId) -> Self {
        value.0
    }
}

impl From<u64> for ThreadId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<ThreadId> for u64 {
    fn from(value: ThreadId) -> Self {
        value.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
