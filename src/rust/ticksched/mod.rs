// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

pub mod config;

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::{
        fail::Fail,
        logging,
        scheduler::{
            idle::IdleMap,
            scheduler::{
                SchedStatsSnapshot,
                SharedTickScheduler,
            },
        },
        types::{
            Policy,
            UnitId,
        },
        ClockBridge,
    },
    ticksched::config::{
        Config,
        ConfigParams,
    },
};
use ::std::env;

//======================================================================================================================
// Structures
//======================================================================================================================

/// The tick-accounting subsystem. One of these is constructed at subsystem start and passed by
/// reference to its collaborators: the timer drives [TickAccounting::tick], the power manager
/// calls [TickAccounting::set_policy], the processor-lifecycle collaborator calls the hotplug
/// entry points, and the scheduling domains publish idle state through
/// [TickAccounting::idle_map].
pub struct TickAccounting {
    scheduler: SharedTickScheduler,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

/// Associated functions for the tick-accounting subsystem.
impl TickAccounting {
    /// Instantiates the subsystem from validated parameters.
    pub fn new(params: &ConfigParams, bridge: Box<dyn ClockBridge>) -> Result<Self, Fail> {
        logging::initialize();

        Ok(Self {
            scheduler: SharedTickScheduler::new(params, bridge)?,
        })
    }

    /// Instantiates the subsystem from the configuration file named by the CONFIG_PATH
    /// environment variable.
    pub fn from_env(bridge: Box<dyn ClockBridge>) -> Result<Self, Fail> {
        logging::initialize();

        let config_path: String = match env::var("CONFIG_PATH") {
            Ok(config_path) => config_path,
            Err(_) => {
                return Err(Fail::new(
                    libc::EINVAL,
                    "missing value for CONFIG_PATH environment variable",
                ))
            },
        };
        let config: Config = Config::new(config_path)?;
        Self::new(&config.params()?, bridge)
    }

    /// Runs one timer tick on behalf of `calling`. Must be invoked exactly once per system timer
    /// tick and never re-entered concurrently for the same calling unit.
    pub fn tick(&self, calling: UnitId, is_period_boundary: bool) {
        self.scheduler.tick(calling, is_period_boundary);
    }

    /// Changes the processor selection policy, starting with the next tick.
    pub fn set_policy(&self, policy: Policy) {
        self.scheduler.set_policy(policy);
    }

    pub fn policy(&self) -> Policy {
        self.scheduler.policy()
    }

    /// Brings a unit online.
    pub fn on_online(&self, unit: UnitId) -> Result<(), Fail> {
        self.scheduler.on_online(unit)
    }

    /// Takes a unit offline. May block the caller until in-flight accounting for the unit
    /// completes.
    pub fn on_offline(&self, unit: UnitId) -> Result<(), Fail> {
        self.scheduler.on_offline(unit)
    }

    /// Scheduling-domain idle state, driven by the embedder.
    pub fn idle_map(&self) -> &IdleMap {
        self.scheduler.idle_map()
    }

    pub fn online_units(&self) -> usize {
        self.scheduler.online_units()
    }

    /// True when no executor pass is in flight.
    pub fn is_quiescent(&self) -> bool {
        self.scheduler.is_quiescent()
    }

    pub fn stats(&self) -> SchedStatsSnapshot {
        self.scheduler.stats()
    }

    /// Stops every executor loop. Runs on drop as a backstop; calling it twice is harmless.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

impl Drop for TickAccounting {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}
