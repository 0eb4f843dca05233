// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The hotplug adapter. The unit-lifecycle collaborator calls [SharedTickScheduler::on_online]
//! and [SharedTickScheduler::on_offline] as processors come and go; both renumber the accounting
//! sets. Taking a unit offline drains its executor loop first and is the only operation in the
//! subsystem that blocks.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    dispatch::UnitWorker,
    fail::Fail,
    scheduler::scheduler::SharedTickScheduler,
    types::UnitId,
};

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Hotplug Associate Functions for the Shared Tick Scheduler
impl SharedTickScheduler {
    /// Brings `unit` online: spawns its executor loop, appends it to the registry and renumbers
    /// the accounting sets. The unit counts as busy until the embedder publishes idle state for
    /// it.
    pub fn on_online(&self, unit: UnitId) -> Result<(), Fail> {
        if self.is_online(unit) {
            let cause: String = format!("unit is already online: {:?}", unit);
            error!("on_online(): {}", cause);
            return Err(Fail::new(libc::EEXIST, &cause));
        }

        // Spawn the loop before publishing the unit, so a tick can never pick a target with no
        // loop behind it.
        let me: SharedTickScheduler = self.clone();
        let worker: UnitWorker = UnitWorker::spawn(unit, move || me.run_executor(unit))?;

        {
            let mut registry = self.registry().write().expect("registry lock poisoned");
            if let Err(e) = registry.insert(unit) {
                drop(registry);
                worker.halt();
                return Err(e);
            }
            let mut global = self.global().lock().expect("global lock poisoned");
            self.rebuild_sets(&mut global, &registry);
        }

        self.idle_map().clear_idle(unit);
        {
            let mut workers = self.workers().lock().expect("worker table poisoned");
            debug_assert!(workers[usize::from(unit)].is_none());
            workers[usize::from(unit)] = Some(worker);
        }

        debug!("on_online(): {:?} online, {} units total", unit, self.online_units());
        Ok(())
    }

    /// Takes `unit` offline. Blocks until any in-flight executor pass targeting the unit has
    /// completed, then removes it from the registry, renumbers the accounting sets and stops its
    /// executor loop.
    pub fn on_offline(&self, unit: UnitId) -> Result<(), Fail> {
        if !self.is_online(unit) {
            let cause: String = format!("unit is not online: {:?}", unit);
            error!("on_offline(): {}", cause);
            return Err(Fail::new(libc::ENOENT, &cause));
        }

        // Taking the loop out of the table stops new dispatches from reaching the unit; a tick
        // that already planned one rolls its bookkeeping back when it finds no loop here.
        let worker: Option<UnitWorker> = {
            let mut workers = self.workers().lock().expect("worker table poisoned");
            workers[usize::from(unit)].take()
        };

        let worker: UnitWorker = match worker {
            Some(worker) => worker,
            None => {
                let cause: String = format!("no executor loop for unit: {:?}", unit);
                error!("on_offline(): {}", cause);
                return Err(Fail::new(libc::ENOENT, &cause));
            },
        };

        // Drain: wait for any signal already queued to be consumed. This is the subsystem's only
        // blocking call.
        worker.drain();

        {
            let mut registry = self.registry().write().expect("registry lock poisoned");
            registry.remove(unit)?;
            let mut global = self.global().lock().expect("global lock poisoned");
            self.rebuild_sets(&mut global, &registry);
        }

        // halt() joins the loop, so by the time we return no pass for this unit can be running.
        worker.halt();
        let _ = self.slots().take(unit);
        self.idle_map().scrub(unit);

        debug!("on_offline(): {:?} offline, {} units total", unit, self.online_units());
        Ok(())
    }

    /// Takes every unit offline and joins every executor loop. Idempotent.
    pub fn shutdown(&self) {
        let units: Vec<UnitId> = {
            let registry = self.registry().read().expect("registry lock poisoned");
            registry.iter().collect()
        };
        for unit in units {
            if let Err(e) = self.on_offline(unit) {
                warn!("shutdown(): {:?}", e);
            }
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
