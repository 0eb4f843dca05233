// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The tick-accounting scheduler. Once per timer tick, [TickScheduler::tick] decides, per
//! accounting set, whether sampling work is dispatched to a target unit, deferred behind an
//! unfinished round, or skipped because the set's scheduling domain is idle. On a machine below
//! the multithread threshold all sampling runs inline on the calling unit instead.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    dispatch::UnitWorker,
    fail::Fail,
    limits,
    registry::UnitRegistry,
    scheduler::{
        idle::IdleMap,
        set::{
            AccountingSet,
            ActiveCounters,
        },
        slot::SlotArena,
    },
    types::{
        DomainId,
        Policy,
        UnitId,
    },
    ClockBridge,
    SharedObject,
};
use crate::ticksched::config::ConfigParams;
use ::arrayvec::ArrayVec;
use ::std::{
    cmp,
    ops::Deref,
    sync::{
        atomic::{
            AtomicU64,
            Ordering,
        },
        Mutex,
        MutexGuard,
        RwLock,
        RwLockReadGuard,
    },
};

//======================================================================================================================
// Structures
//======================================================================================================================

/// State guarded by the global lock: policy, accumulated pending ticks, rotation cursors, and the
/// set table boundaries. The lock is held only for the per-tick decision and for topology
/// mutation; never across a scan, a charge callback, or a dispatch signal.
pub(crate) struct GlobalState {
    /// Processor selection policy.
    policy: Policy,
    /// Ticks accumulated while no round could be issued.
    pending: u64,
    /// Rotating start index for the single-threaded inline scan.
    inline_scan: usize,
    /// Performance-policy origin counter, advanced once per period boundary.
    origin: usize,
    /// The accounting-set table. Fixed size; empty sets have start == end.
    sets: Vec<AccountingSet>,
}

/// One planned dispatch, computed under the global lock and issued after it is released.
struct PlannedDispatch {
    target: UnitId,
    set_index: usize,
    start: usize,
    end: usize,
    scan: usize,
}

/// Counters exported for observability and tests. Updated with relaxed atomics; approximate by
/// design.
#[derive(Default)]
pub struct SchedStats {
    ticks: AtomicU64,
    deferred: AtomicU64,
    inline_rounds: AtomicU64,
    dispatches: AtomicU64,
    idle_skips: AtomicU64,
}

/// Point-in-time copy of [SchedStats].
#[derive(Eq, PartialEq, Clone, Copy, Debug, Default)]
pub struct SchedStatsSnapshot {
    pub ticks: u64,
    pub deferred: u64,
    pub inline_rounds: u64,
    pub dispatches: u64,
    pub idle_skips: u64,
}

/// Tick Scheduler
pub struct TickScheduler {
    /// Accounting-set size (units per set).
    units_per_set: usize,
    /// Online-unit count above which sampling is dispatched instead of run inline.
    threshold: usize,
    /// The outward boundary: thread identification and tick charging.
    bridge: Box<dyn ClockBridge>,
    /// Ordered list of online units.
    registry: RwLock<UnitRegistry>,
    /// Policy, pending ticks, cursors, set boundaries.
    global: Mutex<GlobalState>,
    /// In-flight dispatch counters, one per set.
    active: ActiveCounters,
    /// Per-unit dispatch mailboxes.
    slots: SlotArena,
    /// Scheduling-domain idle state.
    idle_map: IdleMap,
    /// Executor loops for the online units, indexed by unit id.
    workers: Mutex<Vec<Option<UnitWorker>>>,
    /// Monotonic tick sequence; the source of dispatch sample times.
    tick_seq: AtomicU64,
    /// Observability counters.
    stats: SchedStats,
}

#[derive(Clone)]
pub struct SharedTickScheduler(SharedObject<TickScheduler>);

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for the Tick Scheduler
impl TickScheduler {
    /// Instantiates a scheduler from validated configuration. No executor loops exist until
    /// units come online.
    pub fn new(params: &ConfigParams, bridge: Box<dyn ClockBridge>) -> Result<Self, Fail> {
        params.validate()?;

        // Size the set table for the largest supported unit count; sets are reused, never
        // destroyed.
        let nsets: usize = (limits::MAX_UNITS + params.units_per_set - 1) / params.units_per_set;
        let sets: Vec<AccountingSet> = (0..nsets).map(|_| AccountingSet::new()).collect();
        let workers: Vec<Option<UnitWorker>> = (0..limits::MAX_UNITS).map(|_| None).collect();
        Ok(Self {
            units_per_set: params.units_per_set,
            threshold: params.multithread_threshold,
            bridge,
            registry: RwLock::new(UnitRegistry::new()),
            global: Mutex::new(GlobalState {
                policy: params.policy,
                pending: 0,
                inline_scan: 0,
                origin: 0,
                sets,
            }),
            active: ActiveCounters::new(nsets),
            slots: SlotArena::new(),
            idle_map: IdleMap::new(),
            workers: Mutex::new(workers),
            tick_seq: AtomicU64::new(0),
            stats: SchedStats::default(),
        })
    }

    /// Runs one timer tick on behalf of `calling`, the unit handling the timer interrupt.
    /// `is_period_boundary` marks the coarser boundary (e.g. once per second) that rotates the
    /// performance-policy dispatch origin.
    pub fn tick(&self, calling: UnitId, is_period_boundary: bool) {
        let sample_time: u64 = self.tick_seq.fetch_add(1, Ordering::AcqRel) + 1;
        self.stats.ticks.fetch_add(1, Ordering::Relaxed);

        let registry: RwLockReadGuard<UnitRegistry> = self.registry.read().expect("registry lock poisoned");
        let mut global: MutexGuard<GlobalState> = self.global.lock().expect("global lock poisoned");
        global.pending += 1;

        // Back-pressure: while any set still has a pass in flight, accumulate and issue nothing.
        // The acquire load pairs with the release decrement at pass completion.
        if self.active.any_active() {
            self.stats.deferred.fetch_add(1, Ordering::Relaxed);
            trace!("tick(): round in flight, {} ticks pending", global.pending);
            return;
        }

        let total: usize = registry.len();
        if total == 0 {
            return;
        }

        if total <= self.threshold {
            self.tick_inline(registry, global, total, sample_time);
            return;
        }
        self.tick_dispatch(registry, global, calling, is_period_boundary, sample_time);
    }

    /// Single-threaded fallback: scan every online unit inline on the calling unit, starting
    /// from a cursor that rotates by one unit per call. No cross-unit signaling at all.
    fn tick_inline(
        &self,
        registry: RwLockReadGuard<UnitRegistry>,
        mut global: MutexGuard<GlobalState>,
        total: usize,
        sample_time: u64,
    ) {
        let pending: u64 = global.pending;
        global.pending = 0;
        let first: usize = global.inline_scan % total;
        global.inline_scan = (first + 1) % total;

        let order: ArrayVec<UnitId, { limits::MAX_UNITS }> = registry
            .iter_range(first, total)
            .chain(registry.iter_range(0, first))
            .collect();
        drop(global);
        drop(registry);

        self.stats.inline_rounds.fetch_add(1, Ordering::Relaxed);
        self.scan_units(order.iter().copied(), pending, sample_time, None);
    }

    /// Multi-threaded path: scan the calling unit inline, then issue one asynchronous dispatch
    /// per non-idle set.
    fn tick_dispatch(
        &self,
        registry: RwLockReadGuard<UnitRegistry>,
        mut global: MutexGuard<GlobalState>,
        calling: UnitId,
        is_period_boundary: bool,
        sample_time: u64,
    ) {
        if is_period_boundary {
            global.origin = global.origin.wrapping_add(1);
        }
        let pending: u64 = global.pending;
        global.pending = 0;
        let policy: Policy = global.policy;
        let origin: usize = global.origin;

        let mut plan: ArrayVec<PlannedDispatch, { limits::MAX_UNITS }> = ArrayVec::new();
        for set_index in 0..global.sets.len() {
            let set: &AccountingSet = &global.sets[set_index];
            if set.is_empty() {
                continue;
            }
            // Idle skip is sound only under the power policy; performance scans regardless.
            if policy == Policy::Power && self.idle_map.is_idle_set(set.members()) {
                self.stats.idle_skips.fetch_add(1, Ordering::Relaxed);
                trace!("tick(): set {} idle, skipping", set_index);
                continue;
            }
            let target_ix: usize = self.choose_target(policy, set, origin, calling, &registry);
            let target: UnitId = match registry.unit_at(target_ix) {
                Some(unit) => unit,
                None => continue,
            };
            let (start, end, scan): (usize, usize, usize) = (set.start(), set.end(), set.scan());
            plan.push(PlannedDispatch {
                target,
                set_index,
                start,
                end,
                scan,
            });
            global.sets[set_index].advance_scan();
            // Counted before the signal goes out, so completion can never underflow.
            self.active.inc(set_index);
        }
        drop(global);
        drop(registry);

        // The thread underneath the timer interrupt is sampled before anything else can delay
        // this tick.
        self.scan_units(::std::iter::once(calling), pending, sample_time, None);

        let workers = self.workers.lock().expect("worker table poisoned");
        for dispatch in &plan {
            match workers[usize::from(dispatch.target)].as_ref() {
                Some(worker) => {
                    self.slots.post(
                        dispatch.target,
                        pending,
                        dispatch.start,
                        dispatch.end,
                        dispatch.scan,
                        dispatch.set_index,
                        sample_time,
                        Some(calling),
                    );
                    if worker.dispatch() {
                        self.stats.dispatches.fetch_add(1, Ordering::Relaxed);
                        trace!(
                            "tick(): set {} dispatched to {:?}, {} ticks",
                            dispatch.set_index,
                            dispatch.target,
                            pending
                        );
                    } else {
                        // The loop raced offline; take the post back and roll back the counter.
                        let _ = self.slots.take(dispatch.target);
                        self.active.dec(dispatch.set_index);
                        warn!("tick(): executor loop gone for {:?}", dispatch.target);
                    }
                },
                None => {
                    self.active.dec(dispatch.set_index);
                    warn!("tick(): no executor loop for {:?}", dispatch.target);
                },
            }
        }
    }

    /// Picks the registry index of the dispatch target for `set`.
    fn choose_target(&self, policy: Policy, set: &AccountingSet, origin: usize, calling: UnitId, registry: &UnitRegistry) -> usize {
        let width: usize = set.width();
        let target: usize = match policy {
            // Walk the origin over the set so every unit eventually sources a dispatch.
            Policy::Performance => set.start() + origin % width,
            // Stay close to the calling unit; never wake an idle domain just to account.
            Policy::Power => {
                let calling_domain: Option<DomainId> = self.idle_map.domain_of(calling);
                let mut awake: Option<usize> = None;
                let mut neighbor: Option<usize> = None;
                for ix in set.start()..set.end() {
                    let unit: UnitId = match registry.unit_at(ix) {
                        Some(unit) => unit,
                        None => continue,
                    };
                    if unit == calling {
                        continue;
                    }
                    if calling_domain.is_some() && self.idle_map.domain_of(unit) == calling_domain {
                        neighbor = Some(ix);
                        break;
                    }
                    if awake.is_none() && !self.idle_map.is_idle_unit(unit) {
                        awake = Some(ix);
                    }
                }
                neighbor.or(awake).unwrap_or_else(|| set.start())
            },
        };
        // Tie-break: the calling unit already scanned itself inline.
        if registry.unit_at(target) == Some(calling) {
            let next: usize = target + 1;
            if next >= set.end() {
                set.start()
            } else {
                next
            }
        } else {
            target
        }
    }

    /// Changes the processor selection policy. Takes effect with the next tick; in-flight passes
    /// are unaffected because policy is only consulted when issuing new dispatches.
    pub fn set_policy(&self, policy: Policy) {
        let mut global: MutexGuard<GlobalState> = self.global.lock().expect("global lock poisoned");
        if global.policy != policy {
            debug!("set_policy(): {:?} -> {:?}", global.policy, policy);
        }
        global.policy = policy;
    }

    pub fn policy(&self) -> Policy {
        self.global.lock().expect("global lock poisoned").policy
    }

    /// Scheduling-domain idle state, driven by the embedder.
    pub fn idle_map(&self) -> &IdleMap {
        &self.idle_map
    }

    pub fn stats(&self) -> SchedStatsSnapshot {
        SchedStatsSnapshot {
            ticks: self.stats.ticks.load(Ordering::Relaxed),
            deferred: self.stats.deferred.load(Ordering::Relaxed),
            inline_rounds: self.stats.inline_rounds.load(Ordering::Relaxed),
            dispatches: self.stats.dispatches.load(Ordering::Relaxed),
            idle_skips: self.stats.idle_skips.load(Ordering::Relaxed),
        }
    }

    /// True when no executor pass is in flight. The acquire load pairs with the release
    /// decrement at pass completion, so a true answer happens-after every completed pass.
    pub fn is_quiescent(&self) -> bool {
        !self.active.any_active()
    }

    /// Number of units currently online.
    pub fn online_units(&self) -> usize {
        self.registry.read().expect("registry lock poisoned").len()
    }

    pub fn is_online(&self, unit: UnitId) -> bool {
        self.registry.read().expect("registry lock poisoned").contains(unit)
    }

    /// Recomputes every set's range and membership after a hotplug event. The non-empty prefix of
    /// the table must exactly partition the online units.
    pub(crate) fn rebuild_sets(&self, global: &mut GlobalState, registry: &UnitRegistry) {
        let total: usize = registry.len();
        for set_index in 0..global.sets.len() {
            let start: usize = cmp::min(set_index * self.units_per_set, total);
            let end: usize = cmp::min(start + self.units_per_set, total);
            global.sets[set_index].assign(start, end, registry);
        }
        global.inline_scan = if total > 0 { global.inline_scan % total } else { 0 };

        let covered: usize = global.sets.iter().map(AccountingSet::width).sum();
        assert!(covered == total, "accounting sets must partition the online units");
    }

    pub(crate) fn registry(&self) -> &RwLock<UnitRegistry> {
        &self.registry
    }

    pub(crate) fn global(&self) -> &Mutex<GlobalState> {
        &self.global
    }

    pub(crate) fn workers(&self) -> &Mutex<Vec<Option<UnitWorker>>> {
        &self.workers
    }

    pub(crate) fn slots(&self) -> &SlotArena {
        &self.slots
    }

    pub(crate) fn active(&self) -> &ActiveCounters {
        &self.active
    }

    pub(crate) fn bridge(&self) -> &dyn ClockBridge {
        self.bridge.as_ref()
    }

    #[cfg(test)]
    pub(crate) fn set_boundaries(&self) -> Vec<(usize, usize)> {
        let global: MutexGuard<GlobalState> = self.global.lock().expect("global lock poisoned");
        global
            .sets
            .iter()
            .map(|set: &AccountingSet| (set.start(), set.end()))
            .collect()
    }
}

/// Associate Functions for the Shared Tick Scheduler
impl SharedTickScheduler {
    pub fn new(params: &ConfigParams, bridge: Box<dyn ClockBridge>) -> Result<Self, Fail> {
        Ok(Self(SharedObject::new(TickScheduler::new(params, bridge)?)))
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Deref for SharedTickScheduler {
    type Target = TickScheduler;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
