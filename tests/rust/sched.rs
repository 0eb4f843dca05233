// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::std::collections::HashSet;
use ::ticksched::{
    ensure_eq,
    ConfigParams,
    Policy,
    TickAccounting,
    UnitId,
};
use common::{
    tick_and_settle,
    wait_until,
    RunQueue,
};

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn subsystem(run_queue: &RunQueue, units_per_set: usize, threshold: usize, policy: Policy) -> Result<TickAccounting> {
    let params: ConfigParams = ConfigParams {
        units_per_set,
        multithread_threshold: threshold,
        policy,
    };
    TickAccounting::new(&params, Box::new(run_queue.clone())).map_err(|e| anyhow::anyhow!("{:?}", e))
}

fn bring_online(subsystem: &TickAccounting, nunits: usize) -> Result<()> {
    for i in 0..nunits {
        subsystem
            .on_online(UnitId::from(i))
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }
    Ok(())
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// Small machine: 8 units, sets of 4, threshold 16. Every tick scans all 8 units inline, no unit
/// other than the caller is ever signaled, and the scan start rotates by one unit per tick.
#[test]
fn small_machine_scans_inline() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(8);
    let subsystem: TickAccounting = subsystem(&run_queue, 4, 16, Policy::Performance)?;
    bring_online(&subsystem, 8)?;

    for _ in 0..8 {
        subsystem.tick(UnitId::from(0), false);
    }

    let stats = subsystem.stats();
    ensure_eq!(stats.inline_rounds, 8);
    ensure_eq!(stats.dispatches, 0);
    ensure_eq!(stats.deferred, 0);

    // 8 rounds over 8 units, all inline, in rotation order.
    let charges = run_queue.charges();
    ensure_eq!(charges.len(), 64);
    for round in 0..8 {
        ensure_eq!(charges[round * 8].thread, (round % 8) as u64 + 1);
        ensure_eq!(charges[round * 8].ticks, 1);
    }
    for i in 0..8 {
        ensure_eq!(run_queue.total_ticks(i as u64 + 1), 8);
    }

    subsystem.shutdown();
    Ok(())
}

/// Large machine: 128 units, sets of 64, threshold 64. Every tick issues one dispatch per set,
/// every unit gets charged exactly once per tick, and over enough period boundaries every unit
/// except the fixed caller originates a pass.
#[test]
fn large_machine_dispatches_per_set() -> Result<()> {
    const NUNITS: usize = 128;
    const ROUNDS: usize = 100;

    let run_queue: RunQueue = RunQueue::with_busy_units(NUNITS);
    let subsystem: TickAccounting = subsystem(&run_queue, 64, 64, Policy::Performance)?;
    bring_online(&subsystem, NUNITS)?;

    for _ in 0..ROUNDS {
        ensure_eq!(tick_and_settle(&subsystem, 0, true), true);
    }

    let stats = subsystem.stats();
    ensure_eq!(stats.ticks, ROUNDS as u64);
    ensure_eq!(stats.deferred, 0);
    // Two sets, one dispatch each per tick.
    ensure_eq!(stats.dispatches, 2 * ROUNDS as u64);

    for i in 0..NUNITS {
        ensure_eq!(run_queue.total_ticks(i as u64 + 1), ROUNDS as u64);
    }

    // Fairness: every unit except the fixed caller has originated at least one pass.
    let origins: HashSet<String> = run_queue.pass_origins();
    for i in 1..NUNITS {
        ensure_eq!(origins.contains(&format!("tick-unit-{}", i)), true);
    }
    ensure_eq!(origins.contains("tick-unit-0"), false);

    subsystem.shutdown();
    Ok(())
}

/// While a round is in flight, further ticks issue nothing and the pending count carried into
/// the next successful round equals the ticks elapsed since the last one.
#[test]
fn back_pressure_accumulates_pending_ticks() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(4);
    let subsystem: TickAccounting = subsystem(&run_queue, 2, 2, Policy::Performance)?;
    bring_online(&subsystem, 4)?;

    // First round: both passes stall inside the charge callback.
    run_queue.hold_worker_charges();
    subsystem.tick(UnitId::from(0), false);
    ensure_eq!(wait_until(|| run_queue.gated_charges() == 2), true);

    // Two more ticks arrive while the round is still in flight: deferred, nothing dispatched.
    subsystem.tick(UnitId::from(0), false);
    subsystem.tick(UnitId::from(0), false);
    let stats = subsystem.stats();
    ensure_eq!(stats.deferred, 2);
    ensure_eq!(stats.dispatches, 2);

    run_queue.release_worker_charges();
    ensure_eq!(wait_until(|| subsystem.is_quiescent()), true);

    // The next round bundles the three elapsed ticks into one pass.
    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    let bundled: usize = run_queue
        .charges()
        .iter()
        .filter(|record| record.ticks == 3)
        .count();
    ensure_eq!(bundled, 4);

    subsystem.shutdown();
    Ok(())
}

/// Crossing the multithread threshold through hotplug flips the tick between the inline and the
/// dispatching path, starting with the next tick.
#[test]
fn threshold_switch_follows_hotplug() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(5);
    let subsystem: TickAccounting = subsystem(&run_queue, 2, 4, Policy::Performance)?;
    bring_online(&subsystem, 4)?;

    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    ensure_eq!(subsystem.stats().inline_rounds, 1);
    ensure_eq!(subsystem.stats().dispatches, 0);

    // Fifth unit crosses the threshold: the very next tick dispatches, one signal per set.
    subsystem
        .on_online(UnitId::from(4))
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    ensure_eq!(subsystem.stats().inline_rounds, 1);
    ensure_eq!(subsystem.stats().dispatches, 3);

    // Dropping back below the threshold restores the inline path.
    subsystem
        .on_offline(UnitId::from(4))
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    ensure_eq!(subsystem.stats().inline_rounds, 2);
    ensure_eq!(subsystem.stats().dispatches, 3);

    subsystem.shutdown();
    Ok(())
}

/// Power policy: a set whose members all sit idle in one domain is skipped; waking any member
/// brings it back, and the dispatch target prefers awake units.
#[test]
fn power_policy_skips_idle_sets() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(8);
    let subsystem: TickAccounting = subsystem(&run_queue, 4, 4, Policy::Power)?;
    bring_online(&subsystem, 8)?;

    let near = subsystem.idle_map().create_domain().map_err(|e| anyhow::anyhow!("{:?}", e))?;
    let far = subsystem.idle_map().create_domain().map_err(|e| anyhow::anyhow!("{:?}", e))?;
    for i in 0..4 {
        subsystem
            .idle_map()
            .assign_domain(UnitId::from(i), near)
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
        subsystem
            .idle_map()
            .assign_domain(UnitId::from(i + 4), far)
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }
    for i in 4..8 {
        subsystem.idle_map().set_idle(UnitId::from(i));
    }

    // The far domain is fully idle: its set is skipped, only the near set is dispatched.
    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    let stats = subsystem.stats();
    ensure_eq!(stats.idle_skips, 1);
    ensure_eq!(stats.dispatches, 1);
    for i in 4..8 {
        ensure_eq!(run_queue.total_ticks(i as u64 + 1), 0);
    }
    // The near set's pass originated next to the caller, inside its domain.
    ensure_eq!(run_queue.pass_origins().contains("tick-unit-1"), true);

    // One unit waking up makes the far set accountable again, targeted at the awake unit.
    subsystem.idle_map().clear_idle(UnitId::from(5));
    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    let stats = subsystem.stats();
    ensure_eq!(stats.idle_skips, 1);
    ensure_eq!(stats.dispatches, 3);
    ensure_eq!(run_queue.pass_origins().contains("tick-unit-5"), true);
    for i in 4..8 {
        ensure_eq!(run_queue.total_ticks(i as u64 + 1), 1);
    }

    subsystem.shutdown();
    Ok(())
}

/// Idle-skip soundness: members spanning more than one domain are never skipped, no matter how
/// idle they look.
#[test]
fn power_policy_never_skips_across_domains() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(8);
    let subsystem: TickAccounting = subsystem(&run_queue, 4, 4, Policy::Power)?;
    bring_online(&subsystem, 8)?;

    let first = subsystem.idle_map().create_domain().map_err(|e| anyhow::anyhow!("{:?}", e))?;
    let second = subsystem.idle_map().create_domain().map_err(|e| anyhow::anyhow!("{:?}", e))?;
    for i in 0..4 {
        subsystem
            .idle_map()
            .assign_domain(UnitId::from(i), first)
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }
    // The second set straddles two domains.
    for i in 4..6 {
        subsystem
            .idle_map()
            .assign_domain(UnitId::from(i), first)
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }
    for i in 6..8 {
        subsystem
            .idle_map()
            .assign_domain(UnitId::from(i), second)
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }
    for i in 4..8 {
        subsystem.idle_map().set_idle(UnitId::from(i));
    }

    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    ensure_eq!(subsystem.stats().idle_skips, 0);
    ensure_eq!(subsystem.stats().dispatches, 2);

    subsystem.shutdown();
    Ok(())
}

/// A tick with nothing online is a no-op.
#[test]
fn tick_without_units_is_noop() -> Result<()> {
    let run_queue: RunQueue = RunQueue::new();
    let subsystem: TickAccounting = subsystem(&run_queue, 4, 4, Policy::Performance)?;

    subsystem.tick(UnitId::from(0), false);
    ensure_eq!(run_queue.charge_events(), 0);
    ensure_eq!(subsystem.stats().inline_rounds, 0);

    Ok(())
}

/// Units whose bridge reports nothing running are silently skipped.
#[test]
fn idle_threads_are_not_charged() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(4);
    run_queue.park(1);
    run_queue.park(3);
    let subsystem: TickAccounting = subsystem(&run_queue, 4, 8, Policy::Performance)?;
    bring_online(&subsystem, 4)?;

    subsystem.tick(UnitId::from(0), false);
    ensure_eq!(run_queue.charge_events(), 2);
    ensure_eq!(run_queue.total_ticks(2), 0);
    ensure_eq!(run_queue.total_ticks(4), 0);

    subsystem.shutdown();
    Ok(())
}

/// Configuration errors are rejected before the subsystem accepts any tick.
#[test]
fn zero_sized_configuration_is_rejected() -> Result<()> {
    let run_queue: RunQueue = RunQueue::new();

    let params: ConfigParams = ConfigParams {
        units_per_set: 0,
        multithread_threshold: 8,
        policy: Policy::Performance,
    };
    ensure_eq!(
        TickAccounting::new(&params, Box::new(run_queue.clone())).is_err(),
        true
    );

    let params: ConfigParams = ConfigParams {
        units_per_set: 8,
        multithread_threshold: 0,
        policy: Policy::Performance,
    };
    ensure_eq!(TickAccounting::new(&params, Box::new(run_queue)).is_err(), true);

    Ok(())
}
