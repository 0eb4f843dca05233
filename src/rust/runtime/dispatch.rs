// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Cross-unit signaling. Each online unit owns an executor loop (an OS thread standing in for the
//! unit's interrupt-level execution context) draining a signal channel. Dispatching is
//! fire-and-forget: the sender never waits for the pass to run. Draining is the one blocking
//! primitive, used before a unit is taken offline.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::runtime::{
    fail::Fail,
    types::UnitId,
};
use ::crossbeam_channel::{
    bounded,
    unbounded,
    Receiver,
    Sender,
};
use ::std::thread::{
    Builder,
    JoinHandle,
};

//======================================================================================================================
// Enumerations
//======================================================================================================================

/// Signals understood by a unit's executor loop.
enum Signal {
    /// Run one executor pass over the unit's dispatch slot.
    Run,
    /// Rendezvous: acknowledge once every signal queued before this one has been consumed.
    Drain(Sender<()>),
    /// Stop the loop.
    Halt,
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Handle to one unit's executor loop.
pub struct UnitWorker {
    unit: UnitId,
    tx: Sender<Signal>,
    join: Option<JoinHandle<()>>,
}

//======================================================================================================================
// Associate Functions
//======================================================================================================================

/// Associate Functions for Unit Workers
impl UnitWorker {
    /// Spawns the executor loop for `unit`. `pass` runs once per dispatch signal, on the loop's
    /// thread.
    pub fn spawn<F>(unit: UnitId, mut pass: F) -> Result<Self, Fail>
    where
        F: FnMut() + Send + 'static,
    {
        let (tx, rx): (Sender<Signal>, Receiver<Signal>) = unbounded();
        let join: JoinHandle<()> = Builder::new()
            .name(format!("tick-unit-{}", usize::from(unit)))
            .spawn(move || loop {
                match rx.recv() {
                    Ok(Signal::Run) => pass(),
                    Ok(Signal::Drain(ack)) => {
                        // The sender blocks on this rendezvous; channel order guarantees every
                        // earlier Run has completed by now.
                        let _ = ack.send(());
                    },
                    Ok(Signal::Halt) | Err(_) => break,
                }
            })?;
        Ok(Self {
            unit,
            tx,
            join: Some(join),
        })
    }

    pub fn unit(&self) -> UnitId {
        self.unit
    }

    /// Signals the unit to run one executor pass. Fire-and-forget: never blocks, never waits for
    /// completion. Returns false if the loop is gone, in which case the caller must roll back any
    /// in-flight bookkeeping it did for this dispatch.
    pub fn dispatch(&self) -> bool {
        self.tx.send(Signal::Run).is_ok()
    }

    /// Blocks until every signal queued so far has been consumed. This is the drain primitive
    /// used before a unit goes offline.
    pub fn drain(&self) {
        let (ack_tx, ack_rx): (Sender<()>, Receiver<()>) = bounded(0);
        if self.tx.send(Signal::Drain(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Stops the executor loop and joins its thread. Signals already queued are consumed first.
    pub fn halt(mut self) {
        let _ = self.tx.send(Signal::Halt);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("halt(): executor loop for {:?} panicked", self.unit);
            }
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
