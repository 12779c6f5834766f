//! Main simulator interface.
//!
//! [`Simulator`] owns a propagation worker thread and a ticker thread. Every
//! public operation only records a request and wakes the worker; the worker
//! is the single writer of circuit state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, error, info, trace};

use super::propagator::{PropagateOutcome, PropagationPoints, Propagator};
use super::requests::{InputDrive, RequestQueue};
use super::ticker::{TickRate, Ticker};
use super::{DEFAULT_ITERATION_LIMIT, DEFAULT_MAX_PENDING_TICKS, DEFAULT_TICK_FREQUENCY};
use crate::circuit::{ComponentId, PointId};
use crate::error::{ComponentFault, GatesimError, Result};
use crate::state::{CircuitState, StateId};
use crate::value::Value;

/// Configuration for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Propagation passes allowed before a circuit is declared oscillating.
    pub iteration_limit: usize,
    /// Maximum number of queued ticks; further ticks are dropped.
    pub max_pending_ticks: u32,
    /// Initial tick frequency in Hz. Zero disables ticking.
    pub tick_frequency: f64,
    /// Seed for shuffling propagation order, or `None` for a fixed order.
    pub randomize: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            iteration_limit: DEFAULT_ITERATION_LIMIT,
            max_pending_ticks: DEFAULT_MAX_PENDING_TICKS,
            tick_frequency: DEFAULT_TICK_FREQUENCY,
            randomize: None,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the oscillation ceiling, in propagation passes.
    ///
    /// Low limits flag slow-settling circuits as oscillating; high limits
    /// take longer to give up on real oscillators.
    pub fn with_iteration_limit(mut self, iteration_limit: usize) -> Self {
        self.iteration_limit = iteration_limit;
        self
    }

    /// Set the tick backlog cap.
    pub fn with_max_pending_ticks(mut self, max_pending_ticks: u32) -> Self {
        self.max_pending_ticks = max_pending_ticks;
        self
    }

    /// Set the initial tick frequency (Hz).
    pub fn with_tick_frequency(mut self, tick_frequency: f64) -> Self {
        self.tick_frequency = tick_frequency;
        self
    }

    /// Shuffle propagation order with the given seed.
    pub fn with_randomize(mut self, seed: Option<u64>) -> Self {
        self.randomize = seed;
        self
    }

    /// Check every parameter.
    pub fn validate(&self) -> Result<()> {
        if self.iteration_limit == 0 {
            return Err(GatesimError::param("iteration limit must be at least 1"));
        }
        if self.max_pending_ticks == 0 {
            return Err(GatesimError::param("tick backlog must hold at least 1 tick"));
        }
        if !self.tick_frequency.is_finite() || self.tick_frequency < 0.0 {
            return Err(GatesimError::param(format!(
                "tick frequency must be non-negative and finite, got {}",
                self.tick_frequency
            )));
        }
        Ok(())
    }
}

/// Notifications sent to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorEvent {
    /// A worker cycle finished (after a propagate, step or reset)
    PropagationCompleted,
    /// A tick was applied in the cycle that just finished
    TickCompleted,
    /// Running, ticking or tick frequency changed
    StateChanged,
}

#[derive(Debug)]
struct ControlState {
    running: bool,
    ticking: bool,
    tick_frequency: f64,
}

/// State shared between the handle, the worker and (through the queue) the ticker.
struct Shared {
    config: SimulatorConfig,
    queue: Arc<RequestQueue>,
    ticker: Ticker,
    /// Lock order: `propagator` before `control` before the queue
    propagator: Mutex<Option<Propagator>>,
    control: Mutex<ControlState>,
    exception: AtomicBool,
    oscillating: AtomicBool,
    step_points: Mutex<PropagationPoints>,
    listeners: Mutex<Vec<Sender<SimulatorEvent>>>,
}

impl Shared {
    fn fire(&self, event: SimulatorEvent) {
        self.listeners.lock().retain(|tx| tx.send(event).is_ok());
    }

    /// The ticker runs only while running, ticking and with a positive frequency.
    fn renew_ticker(&self, control: &ControlState) {
        let awake = control.running && control.ticking && control.tick_frequency > 0.0;
        self.ticker.set_awake(awake);
    }

    fn is_running(&self) -> bool {
        self.control.lock().running
    }

    fn set_running(&self, running: bool) {
        let mut control = self.control.lock();
        if control.running == running {
            return;
        }
        control.running = running;
        self.queue.set_running(running);
        self.renew_ticker(&control);
        drop(control);
        debug!(running, "running state changed");
        self.fire(SimulatorEvent::StateChanged);
    }

    fn report_fault(&self, fault: &ComponentFault) {
        error!(component = %fault.component, message = %fault.message, "component fault, pausing simulation");
        self.exception.store(true, Ordering::SeqCst);
        self.set_running(false);
    }

    /// Running mode: apply at most one tick and propagate to quiescence,
    /// again if another propagate arrived meanwhile. Returns whether a tick
    /// was applied.
    fn run_cycle(&self, propagator: Option<&mut Propagator>) -> bool {
        self.queue.lock().steps = 0;
        self.step_points.lock().clear();
        let Some(propagator) = propagator else {
            let mut pending = self.queue.lock();
            pending.ticks = 0;
            pending.propagate = false;
            return false;
        };

        let ticked = self.queue.take_tick();
        if ticked {
            propagator.tick();
        }
        loop {
            self.queue.lock().propagate = false;
            self.exception.store(false, Ordering::SeqCst);
            match propagator.propagate() {
                Ok(PropagateOutcome::Quiescent { passes }) => {
                    trace!(passes, "propagation settled");
                }
                Ok(PropagateOutcome::Oscillating { .. }) => {
                    self.oscillating.store(true, Ordering::SeqCst);
                    self.set_running(false);
                    let mut pending = self.queue.lock();
                    pending.ticks = 0;
                    pending.propagate = false;
                    break;
                }
                Err(fault) => {
                    self.report_fault(&fault);
                    break;
                }
            }
            if !self.queue.lock().propagate {
                break;
            }
        }
        ticked
    }

    /// Paused mode: perform one requested step, preceded by a single tick if
    /// any were queued. Returns whether a tick was applied.
    fn step_cycle(&self, propagator: Option<&mut Propagator>) -> bool {
        let stepping = {
            let mut pending = self.queue.lock();
            if pending.steps > 0 {
                pending.steps -= 1;
                pending.ticks = pending.ticks.min(1);
                true
            } else {
                false
            }
        };
        let (true, Some(propagator)) = (stepping, propagator) else {
            return false;
        };

        let ticked = self.queue.take_tick();
        if ticked {
            propagator.tick();
        }
        self.exception.store(false, Ordering::SeqCst);
        let mut points = self.step_points.lock();
        points.clear();
        match propagator.step(&mut points) {
            Ok(more) => trace!(more, changed = points.len(), "stepped one pass"),
            Err(fault) => {
                error!(component = %fault.component, message = %fault.message, "component fault during step");
                self.exception.store(true, Ordering::SeqCst);
            }
        }
        ticked
    }
}

fn run_worker(shared: &Shared) {
    info!("propagation worker started");
    while shared.queue.wait_for_work() {
        let (drives, reset) = {
            let mut pending = shared.queue.lock();
            (std::mem::take(&mut pending.drives), std::mem::replace(&mut pending.reset, false))
        };

        let mut slot = shared.propagator.lock();
        if let Some(propagator) = slot.as_mut() {
            for drive in drives {
                if let Err(fault) = propagator.poke(drive.state, drive.component, drive.value) {
                    shared.report_fault(&fault);
                }
            }
        }

        if reset {
            if let Some(propagator) = slot.as_mut() {
                propagator.reset();
            }
            shared.oscillating.store(false, Ordering::SeqCst);
            shared.step_points.lock().clear();
            shared.fire(SimulatorEvent::PropagationCompleted);
            if shared.is_running() {
                shared.queue.lock().propagate = true;
            }
        }

        let has_cycle_work = {
            let pending = shared.queue.lock();
            pending.propagate || pending.ticks > 0 || pending.steps > 0
        };
        if !has_cycle_work {
            continue;
        }

        let ticked = if shared.is_running() {
            shared.run_cycle(slot.as_mut())
        } else {
            shared.queue.lock().propagate = false;
            shared.step_cycle(slot.as_mut())
        };
        drop(slot);

        if ticked {
            shared.fire(SimulatorEvent::TickCompleted);
        }
        shared.fire(SimulatorEvent::PropagationCompleted);
    }
    info!("propagation worker stopped");
}

/// The simulation controller.
///
/// Operations return immediately; their effects are applied asynchronously
/// by the worker thread. Subscribe to [`SimulatorEvent`]s to learn when a
/// cycle has finished.
pub struct Simulator {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    ticker_thread: Option<JoinHandle<()>>,
}

impl Simulator {
    /// Start a simulator with no circuit loaded. It starts running, with
    /// ticking disabled.
    pub fn new(config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        let queue = Arc::new(RequestQueue::new(config.max_pending_ticks, true));
        let (ticker, ticker_thread) = Ticker::spawn(Arc::clone(&queue), TickRate::default())?;
        let initial_frequency = config.tick_frequency;
        let shared = Arc::new(Shared {
            config,
            queue,
            ticker,
            propagator: Mutex::new(None),
            control: Mutex::new(ControlState {
                running: true,
                ticking: false,
                tick_frequency: 0.0,
            }),
            exception: AtomicBool::new(false),
            oscillating: AtomicBool::new(false),
            step_points: Mutex::new(PropagationPoints::new()),
            listeners: Mutex::new(Vec::new()),
        });

        let worker_shared = Arc::clone(&shared);
        let spawned = thread::Builder::new()
            .name("gatesim-propagator".to_string())
            .spawn(move || run_worker(&worker_shared));
        let worker = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                shared.ticker.shutdown();
                let _ = ticker_thread.join();
                return Err(GatesimError::Spawn {
                    name: "propagation worker".to_string(),
                    source,
                });
            }
        };

        let simulator = Self {
            shared,
            worker: Some(worker),
            ticker_thread: Some(ticker_thread),
        };
        simulator.set_tick_frequency(initial_frequency)?;
        info!(
            iteration_limit = simulator.shared.config.iteration_limit,
            tick_frequency = initial_frequency,
            "simulator started"
        );
        Ok(simulator)
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.shared.config
    }

    /// Receive notifications from the worker. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> Receiver<SimulatorEvent> {
        let (tx, rx) = unbounded();
        self.shared.listeners.lock().push(tx);
        rx
    }

    /// Install a circuit state, replacing (and dropping) the previous one.
    ///
    /// Nothing is propagated until a propagate, step, tick or reset is requested.
    pub fn set_circuit_state(&self, state: CircuitState) {
        let propagator = Propagator::new(state, &self.shared.config);
        {
            let mut slot = self.shared.propagator.lock();
            *slot = Some(propagator);
            self.shared.oscillating.store(false, Ordering::SeqCst);
            self.shared.step_points.lock().clear();
            let control = self.shared.control.lock();
            self.shared.renew_ticker(&control);
        }
        debug!("circuit state installed");
        self.shared.fire(SimulatorEvent::StateChanged);
    }

    /// Remove the current circuit state and hand it back.
    pub fn take_circuit_state(&self) -> Option<CircuitState> {
        let propagator = self.shared.propagator.lock().take();
        propagator.map(Propagator::into_state)
    }

    /// Run `f` against the current circuit state. Blocks while the worker
    /// is mid-cycle.
    ///
    /// `f` runs under the state lock, which is not reentrant: calling
    /// [`Simulator::value`], [`Simulator::oscillation_points`],
    /// [`Simulator::take_circuit_state`] or `with_circuit_state` from inside
    /// `f` deadlocks. Read through the `&CircuitState` argument instead.
    pub fn with_circuit_state<R>(&self, f: impl FnOnce(&CircuitState) -> R) -> Option<R> {
        let slot = self.shared.propagator.lock();
        slot.as_ref().map(|p| f(p.state()))
    }

    /// Current value of a top-level point. `None` without a circuit state
    /// or when the point is not part of the circuit.
    pub fn value(&self, point: PointId) -> Option<Value> {
        self.with_circuit_state(|state| (point.0 < state.circuit().point_count()).then(|| state.value(point)))
            .flatten()
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Resume or pause propagation.
    pub fn set_running(&self, running: bool) {
        self.shared.set_running(running);
        if running {
            self.shared.queue.request_propagate();
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.shared.control.lock().ticking
    }

    /// Enable or disable automatic ticking.
    pub fn set_ticking(&self, ticking: bool) {
        let mut control = self.shared.control.lock();
        if control.ticking == ticking {
            return;
        }
        control.ticking = ticking;
        self.shared.renew_ticker(&control);
        drop(control);
        debug!(ticking, "ticking state changed");
        self.shared.fire(SimulatorEvent::StateChanged);
    }

    pub fn tick_frequency(&self) -> f64 {
        self.shared.control.lock().tick_frequency
    }

    /// Change the tick frequency in Hz. Zero stops automatic ticks.
    pub fn set_tick_frequency(&self, hz: f64) -> Result<()> {
        if !hz.is_finite() || hz < 0.0 {
            return Err(GatesimError::param(format!(
                "tick frequency must be non-negative and finite, got {hz}"
            )));
        }
        let mut control = self.shared.control.lock();
        if control.tick_frequency == hz {
            return Ok(());
        }
        if hz > 0.0 {
            let rate = TickRate::from_frequency(hz)?;
            debug!(hz, interval = ?rate.interval, ticks = rate.ticks_per_interval, "tick rate changed");
            self.shared.ticker.set_rate(rate);
        }
        control.tick_frequency = hz;
        self.shared.renew_ticker(&control);
        drop(control);
        self.shared.fire(SimulatorEvent::StateChanged);
        Ok(())
    }

    /// Ask for the state to be propagated to quiescence (when running).
    pub fn request_propagate(&self) {
        self.shared.queue.request_propagate();
    }

    /// Ask for the state to be reset to its initial values.
    pub fn request_reset(&self) {
        self.shared.queue.request_reset();
    }

    /// Queue a single tick. Returns false when the tick backlog is full.
    pub fn tick(&self) -> bool {
        self.shared.ticker.tick_once()
    }

    /// Ask for one propagation pass. Only has an effect while paused.
    pub fn step(&self) {
        self.shared.queue.request_step();
    }

    /// Poke a new value into a top-level component, such as an input pin.
    pub fn drive_input(&self, component: ComponentId, value: Value) {
        self.drive_input_in(StateId::ROOT, component, value);
    }

    /// Poke a new value into a component of any state node.
    pub fn drive_input_in(&self, state: StateId, component: ComponentId, value: Value) {
        self.shared.queue.push_drive(InputDrive {
            state,
            component,
            value,
        });
    }

    /// Whether the last run gave up on an oscillating circuit. Cleared by reset.
    pub fn is_oscillating(&self) -> bool {
        self.shared.oscillating.load(Ordering::SeqCst)
    }

    /// Whether the most recent propagate or step hit a component fault.
    pub fn is_exception_encountered(&self) -> bool {
        self.shared.exception.load(Ordering::SeqCst)
    }

    /// Points that changed during the last step.
    pub fn step_points(&self) -> Vec<(StateId, PointId)> {
        self.shared.step_points.lock().to_vec()
    }

    /// Points still changing when the last run gave up.
    pub fn oscillation_points(&self) -> Vec<(StateId, PointId)> {
        let slot = self.shared.propagator.lock();
        slot.as_ref()
            .map(|p| p.oscillation_points().to_vec())
            .unwrap_or_default()
    }

    /// Stop both threads. Pending requests are discarded.
    pub fn shutdown(&mut self) {
        if self.worker.is_none() && self.ticker_thread.is_none() {
            return;
        }
        self.shared.queue.shutdown();
        self.shared.ticker.shutdown();
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("propagation worker panicked");
            }
        }
        if let Some(handle) = self.ticker_thread.take() {
            if handle.join().is_err() {
                error!("ticker panicked");
            }
        }
        info!("simulator shut down");
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Simulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let control = self.shared.control.lock();
        f.debug_struct("Simulator")
            .field("running", &control.running)
            .field("ticking", &control.ticking)
            .field("tick_frequency", &control.tick_frequency)
            .field("oscillating", &self.is_oscillating())
            .field("exception", &self.is_exception_encountered())
            .finish()
    }
}
