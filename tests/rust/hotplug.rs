// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

mod common;

//======================================================================================================================
// Imports
//======================================================================================================================

use ::anyhow::Result;
use ::rand::{
    rngs::SmallRng,
    Rng,
    SeedableRng,
};
use ::std::{
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
    },
    thread,
    time::Duration,
};
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
// Constants
//======================================================================================================================

/// Seed for the churn test. This value was chosen arbitrarily.
const CHURN_SEED: u64 = 42;

//======================================================================================================================
// Standalone Functions
//======================================================================================================================

fn subsystem(run_queue: &RunQueue, units_per_set: usize, threshold: usize) -> Result<TickAccounting> {
    let params: ConfigParams = ConfigParams {
        units_per_set,
        multithread_threshold: threshold,
        policy: Policy::Performance,
    };
    TickAccounting::new(&params, Box::new(run_queue.clone())).map_err(|e| anyhow::anyhow!("{:?}", e))
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

/// Drain correctness: taking a unit offline while a pass targeting it is stuck inside the charge
/// callback must not return until that pass has fully completed.
#[test]
fn offline_waits_for_inflight_pass() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(4);
    let subsystem: Arc<TickAccounting> = Arc::new(subsystem(&run_queue, 2, 2)?);
    for i in 0..4 {
        subsystem
            .on_online(UnitId::from(i))
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }

    // Both passes of the round stall inside the charge callback.
    run_queue.hold_worker_charges();
    subsystem.tick(UnitId::from(0), false);
    ensure_eq!(wait_until(|| run_queue.gated_charges() == 2), true);

    // Take the stalled target offline from another thread.
    let offline_returned: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    let offline_flag: Arc<AtomicBool> = offline_returned.clone();
    let offline_subsystem: Arc<TickAccounting> = subsystem.clone();
    let offliner: thread::JoinHandle<Result<()>> = thread::spawn(move || {
        offline_subsystem
            .on_offline(UnitId::from(1))
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
        offline_flag.store(true, Ordering::SeqCst);
        Ok(())
    });

    // The pass is still in flight, so on_offline must still be blocked.
    thread::sleep(Duration::from_millis(100));
    ensure_eq!(offline_returned.load(Ordering::SeqCst), false);

    run_queue.release_worker_charges();
    offliner.join().expect("offliner should not panic")?;
    ensure_eq!(offline_returned.load(Ordering::SeqCst), true);
    ensure_eq!(subsystem.online_units(), 3);

    // The charge the pass was stuck in was still delivered exactly once.
    ensure_eq!(run_queue.total_ticks(2), 1);

    subsystem.shutdown();
    Ok(())
}

/// After a unit goes offline mid-stream, subsequent rounds cover exactly the remaining units.
#[test]
fn offline_renumbers_accounting_sets() -> Result<()> {
    let run_queue: RunQueue = RunQueue::with_busy_units(6);
    let subsystem: TickAccounting = subsystem(&run_queue, 2, 2)?;
    for i in 0..6 {
        subsystem
            .on_online(UnitId::from(i))
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }

    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    for i in 0..6 {
        ensure_eq!(run_queue.total_ticks(i as u64 + 1), 1);
    }

    subsystem
        .on_offline(UnitId::from(2))
        .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);

    // Everyone but the offlined unit got the second tick.
    for i in [0usize, 1, 3, 4, 5] {
        ensure_eq!(run_queue.total_ticks(i as u64 + 1), 2);
    }
    ensure_eq!(run_queue.total_ticks(3), 1);

    subsystem.shutdown();
    Ok(())
}

/// Randomized churn: online/offline transitions racing a ticking thread must never wedge the
/// subsystem or lose track of the online set.
#[test]
fn churn_with_concurrent_ticks() -> Result<()> {
    const NUNITS: usize = 32;
    const STEPS: usize = 200;

    let run_queue: RunQueue = RunQueue::with_busy_units(NUNITS);
    let subsystem: Arc<TickAccounting> = Arc::new(subsystem(&run_queue, 4, 8)?);
    for i in 0..NUNITS {
        subsystem
            .on_online(UnitId::from(i))
            .map_err(|e| anyhow::anyhow!("{:?}", e))?;
    }

    // Timer thread: keeps ticking from unit 0 until told to stop. Unit 0 is never offlined.
    let stop: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    let timer_stop: Arc<AtomicBool> = stop.clone();
    let timer_subsystem: Arc<TickAccounting> = subsystem.clone();
    let timer: thread::JoinHandle<()> = thread::spawn(move || {
        let mut count: u64 = 0;
        while !timer_stop.load(Ordering::SeqCst) {
            timer_subsystem.tick(UnitId::from(0), count % 10 == 0);
            count += 1;
            thread::sleep(Duration::from_micros(200));
        }
    });

    let mut rng: SmallRng = SmallRng::seed_from_u64(CHURN_SEED);
    let mut online: Vec<bool> = vec![true; NUNITS];
    for _ in 0..STEPS {
        let unit: usize = rng.gen_range(1..NUNITS);
        if online[unit] {
            subsystem
                .on_offline(UnitId::from(unit))
                .map_err(|e| anyhow::anyhow!("{:?}", e))?;
        } else {
            subsystem
                .on_online(UnitId::from(unit))
                .map_err(|e| anyhow::anyhow!("{:?}", e))?;
        }
        online[unit] = !online[unit];
    }

    stop.store(true, Ordering::SeqCst);
    timer.join().expect("timer should not panic");

    let expected: usize = online.iter().filter(|up: &&bool| **up).count();
    ensure_eq!(subsystem.online_units(), expected);

    // The subsystem is still live after the churn.
    ensure_eq!(wait_until(|| subsystem.is_quiescent()), true);
    let before: u64 = subsystem.stats().ticks;
    ensure_eq!(tick_and_settle(&subsystem, 0, false), true);
    ensure_eq!(subsystem.stats().ticks, before + 1);

    subsystem.shutdown();
    ensure_eq!(subsystem.online_units(), 0);
    Ok(())
}
