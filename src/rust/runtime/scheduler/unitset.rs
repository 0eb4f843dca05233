// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    limits,
    scheduler::bitset64::{
        Bitset64,
        BIT_LENGTH,
        BIT_LENGTH_SHIFT,
    },
    types::UnitId,
};
use ::bit_iter::BitIter;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Number of [Bitset64] words needed to cover every unit id.
pub const UNIT_WORDS: usize = limits::MAX_UNITS / BIT_LENGTH;

//======================================================================================================================
// Structures
//======================================================================================================================

/// Fixed-width bitset with one bit per unit id, composed of [Bitset64] words. Used both for
/// accounting-set membership and for per-domain idle state.
pub struct UnitSet {
    words: [Bitset64; UNIT_WORDS],
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Unit Sets
impl UnitSet {
    pub fn new() -> Self {
        Self {
            words: Default::default(),
        }
    }

    /// Computes the word index and the offset within the word of a given unit id.
    fn index_and_offset(unit: UnitId) -> (usize, usize) {
        let ix: usize = usize::from(unit);
        debug_assert!(ix < limits::MAX_UNITS);
        (ix >> BIT_LENGTH_SHIFT, ix & (BIT_LENGTH - 1))
    }

    pub fn set(&self, unit: UnitId) {
        let (word, offset): (usize, usize) = Self::index_and_offset(unit);
        self.words[word].set(offset);
    }

    pub fn clear(&self, unit: UnitId) {
        let (word, offset): (usize, usize) = Self::index_and_offset(unit);
        self.words[word].clear(offset);
    }

    pub fn test(&self, unit: UnitId) -> bool {
        let (word, offset): (usize, usize) = Self::index_and_offset(unit);
        self.words[word].test(offset)
    }

    /// Clears every bit.
    pub fn reset(&self) {
        for word in &self.words {
            word.swap(0);
        }
    }

    /// True only if every bit set in `other` is also set in this set. Word-by-word intersection;
    /// never blocks.
    pub fn contains_all(&self, other: &UnitSet) -> bool {
        self.words.iter().zip(other.words.iter()).all(|(word, other_word)| {
            let needed: u64 = other_word.load();
            word.load() & needed == needed
        })
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word: &Bitset64| word.load() == 0)
    }

    pub fn len(&self) -> usize {
        self.words
            .iter()
            .map(|word: &Bitset64| word.load().count_ones() as usize)
            .sum()
    }

    /// Iterates over the unit ids present in the set, in increasing order.
    pub fn iter(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.words.iter().enumerate().flat_map(|(word_ix, word)| {
            BitIter::from(word.load()).map(move |offset: usize| UnitId::from((word_ix << BIT_LENGTH_SHIFT) + offset))
        })
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for UnitSet {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
