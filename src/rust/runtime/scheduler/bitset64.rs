// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use ::std::sync::atomic::{
    AtomicU64,
    Ordering,
};

//==============================================================================
// Constants
//==============================================================================

/// Log2 of [BIT_LENGTH].
pub const BIT_LENGTH_SHIFT: usize = 6;

/// Number of bits in a [Bitset64].
pub const BIT_LENGTH: usize = 1 << BIT_LENGTH_SHIFT;

//==============================================================================
// Structures
//==============================================================================

/// 64-Bit Atomic Bitset
///
/// One word of unit-membership or unit-idle state. Readers (the idle detector, executor passes)
/// and writers (hotplug, the embedder's idle notifications) live on different threads, so all
/// operations go through an atomic word.
pub struct Bitset64(AtomicU64);

//==============================================================================
// Associate Functions
//==============================================================================

/// Associate Functions for 64-Bit Atomic Bitsets
impl Bitset64 {
    /// Creates a 64-Bit Bitset from `val`.
    pub fn new(val: u64) -> Self {
        Bitset64(AtomicU64::new(val))
    }

    /// Sets bit `ix` in the target [Bitset64].
    pub fn set(&self, ix: usize) {
        debug_assert!(ix < BIT_LENGTH);
        self.0.fetch_or(1 << ix, Ordering::AcqRel);
    }

    /// Clears bit `ix` in the target [Bitset64].
    pub fn clear(&self, ix: usize) {
        debug_assert!(ix < BIT_LENGTH);
        self.0.fetch_and(!(1 << ix), Ordering::AcqRel);
    }

    /// Tests bit `ix` in the target [Bitset64].
    pub fn test(&self, ix: usize) -> bool {
        debug_assert!(ix < BIT_LENGTH);
        self.0.load(Ordering::Acquire) & (1 << ix) != 0
    }

    /// Returns the value stored in the target [Bitset64].
    pub fn load(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Replaces the value stored in the target [Bitset64] by `val` and returns the old value.
    pub fn swap(&self, val: u64) -> u64 {
        self.0.swap(val, Ordering::AcqRel)
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for Bitset64 {
    fn default() -> Self {
        Self::new(0)
    }
}

//==============================================================================
// Unit Tests
//==============================================================================
