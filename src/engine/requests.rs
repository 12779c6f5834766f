//! Pending work shared between the controller, the ticker and the worker.

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::warn;

use crate::circuit::ComponentId;
use crate::state::StateId;
use crate::value::Value;

/// An externally supplied value waiting to be poked into a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InputDrive {
    pub state: StateId,
    pub component: ComponentId,
    pub value: Value,
}

/// Request flags and counters. Only ever touched under the queue lock.
#[derive(Debug, Default)]
pub(crate) struct PendingRequests {
    pub reset: bool,
    pub propagate: bool,
    pub ticks: u32,
    pub steps: u32,
    pub drives: Vec<InputDrive>,
    /// Mirror of the controller's running flag, read by the worker
    pub running: bool,
    pub shutdown: bool,
}

impl PendingRequests {
    fn has_work(&self) -> bool {
        self.reset
            || self.propagate
            || self.steps > 0
            || !self.drives.is_empty()
            || (self.ticks > 0 && self.running)
    }
}

/// Lock-protected request set with a wakeup signal for the worker.
#[derive(Debug)]
pub(crate) struct RequestQueue {
    pending: Mutex<PendingRequests>,
    wake: Condvar,
    max_ticks: u32,
}

impl RequestQueue {
    pub fn new(max_ticks: u32, running: bool) -> Self {
        Self {
            pending: Mutex::new(PendingRequests {
                running,
                ..PendingRequests::default()
            }),
            wake: Condvar::new(),
            max_ticks: max_ticks.max(1),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, PendingRequests> {
        self.pending.lock()
    }

    fn update(&self, f: impl FnOnce(&mut PendingRequests)) {
        let mut pending = self.pending.lock();
        f(&mut pending);
        drop(pending);
        self.wake.notify_all();
    }

    pub fn request_propagate(&self) {
        self.update(|p| p.propagate = true);
    }

    pub fn request_reset(&self) {
        self.update(|p| p.reset = true);
    }

    pub fn request_step(&self) {
        self.update(|p| p.steps = p.steps.saturating_add(1));
    }

    /// Queue one tick. Returns false when the backlog is full and the tick
    /// was dropped.
    pub fn request_tick(&self) -> bool {
        let mut accepted = true;
        self.update(|p| {
            if p.ticks < self.max_ticks {
                p.ticks += 1;
            } else {
                accepted = false;
            }
        });
        if !accepted {
            warn!(max = self.max_ticks, "tick backlog full, dropping tick");
        }
        accepted
    }

    pub fn push_drive(&self, drive: InputDrive) {
        self.update(|p| {
            p.drives.push(drive);
            p.propagate = true;
        });
    }

    pub fn set_running(&self, running: bool) {
        self.update(|p| p.running = running);
    }

    pub fn shutdown(&self) {
        self.update(|p| p.shutdown = true);
    }

    /// Block until there is something to do. Returns false on shutdown.
    ///
    /// Ticks alone do not wake a paused worker; they wait for a step or for
    /// the simulator to run again.
    pub fn wait_for_work(&self) -> bool {
        let mut pending = self.pending.lock();
        while !pending.shutdown && !pending.has_work() {
            self.wake.wait(&mut pending);
        }
        !pending.shutdown
    }

    /// Take one pending tick, if any.
    pub fn take_tick(&self) -> bool {
        let mut pending = self.pending.lock();
        if pending.ticks > 0 {
            pending.ticks -= 1;
            true
        } else {
            false
        }
    }
}
