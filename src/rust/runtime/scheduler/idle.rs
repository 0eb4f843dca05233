// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Scheduling-domain idle state. The embedder owns the content of these bitsets: it assigns each
//! unit to a domain and flips the unit's idle bit as the unit halts and resumes. The crate owns
//! the storage so that the idle detector can read it from the tick path without blocking.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    limits,
    scheduler::unitset::UnitSet,
    types::{
        DomainId,
        UnitId,
    },
};
use ::std::sync::atomic::{
    AtomicUsize,
    Ordering,
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// Per-domain idle bitsets plus the unit-to-domain assignment table. All state lives in fixed
/// arenas so every reader is lock-free; [IdleMap::is_idle_set] in particular runs on the tick
/// path and must never block.
pub struct IdleMap {
    /// Idle bitset per scheduling domain.
    domains: Box<[UnitSet]>,
    /// Number of domains created so far.
    ndomains: AtomicUsize,
    /// Domain assignment per unit id: 0 means unassigned, otherwise domain index + 1.
    assignment: Box<[AtomicUsize]>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for the Idle Map
impl IdleMap {
    pub fn new() -> Self {
        let domains: Vec<UnitSet> = (0..limits::MAX_DOMAINS).map(|_| UnitSet::new()).collect();
        let assignment: Vec<AtomicUsize> = (0..limits::MAX_UNITS).map(|_| AtomicUsize::new(0)).collect();
        Self {
            domains: domains.into_boxed_slice(),
            ndomains: AtomicUsize::new(0),
            assignment: assignment.into_boxed_slice(),
        }
    }

    /// Creates a new scheduling domain.
    pub fn create_domain(&self) -> Result<DomainId, Fail> {
        let ix: usize = self.ndomains.fetch_add(1, Ordering::AcqRel);
        if ix >= limits::MAX_DOMAINS {
            self.ndomains.fetch_sub(1, Ordering::AcqRel);
            let cause: String = format!("domain table is full: {}", limits::MAX_DOMAINS);
            error!("create_domain(): {}", cause);
            return Err(Fail::new(libc::ENOSPC, &cause));
        }
        Ok(DomainId::from(ix))
    }

    /// Assigns `unit` to `domain`. The unit's idle bit starts cleared (busy) in its new domain.
    pub fn assign_domain(&self, unit: UnitId, domain: DomainId) -> Result<(), Fail> {
        let unit_ix: usize = usize::from(unit);
        let domain_ix: usize = usize::from(domain);
        if unit_ix >= limits::MAX_UNITS || domain_ix >= self.ndomains.load(Ordering::Acquire) {
            let cause: String = format!("invalid assignment: {:?} -> {:?}", unit, domain);
            error!("assign_domain(): {}", cause);
            return Err(Fail::new(libc::EINVAL, &cause));
        }
        let previous: usize = self.assignment[unit_ix].swap(domain_ix + 1, Ordering::AcqRel);
        if previous != 0 {
            self.domains[previous - 1].clear(unit);
        }
        Ok(())
    }

    /// Domain the unit is assigned to, if any.
    pub fn domain_of(&self, unit: UnitId) -> Option<DomainId> {
        match self.assignment[usize::from(unit)].load(Ordering::Acquire) {
            0 => None,
            ix => Some(DomainId::from(ix - 1)),
        }
    }

    /// Marks `unit` idle in its domain. A unit with no domain has no idle state to publish.
    pub fn set_idle(&self, unit: UnitId) {
        if let Some(domain) = self.domain_of(unit) {
            self.domains[usize::from(domain)].set(unit);
        }
    }

    /// Marks `unit` busy in its domain.
    pub fn clear_idle(&self, unit: UnitId) {
        if let Some(domain) = self.domain_of(unit) {
            self.domains[usize::from(domain)].clear(unit);
        }
    }

    /// True if `unit` is marked idle in its domain. A unit with no domain counts as busy.
    pub fn is_idle_unit(&self, unit: UnitId) -> bool {
        match self.domain_of(unit) {
            Some(domain) => self.domains[usize::from(domain)].test(unit),
            None => false,
        }
    }

    /// Forgets everything known about `unit`: assignment and idle bit. Used when the unit goes
    /// offline.
    pub fn scrub(&self, unit: UnitId) {
        let previous: usize = self.assignment[usize::from(unit)].swap(0, Ordering::AcqRel);
        if previous != 0 {
            self.domains[previous - 1].clear(unit);
        }
    }

    /// The idle detector: true only if every member of `members` is assigned to the same single
    /// domain and that domain's idle bitset covers all of them. Members spanning domains, or any
    /// member with no domain, make the answer false: work is never skipped on partial
    /// information. Lock-free; never takes the scheduler's global lock.
    pub fn is_idle_set(&self, members: &UnitSet) -> bool {
        let mut domain: Option<DomainId> = None;
        for unit in members.iter() {
            match (self.domain_of(unit), domain) {
                (None, _) => return false,
                (Some(d), None) => domain = Some(d),
                (Some(d), Some(first)) if d != first => return false,
                (Some(_), Some(_)) => (),
            }
        }
        match domain {
            Some(d) => self.domains[usize::from(d)].contains_all(members),
            // An empty set has no work to skip.
            None => false,
        }
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Default for IdleMap {
    fn default() -> Self {
        Self::new()
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
