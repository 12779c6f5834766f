//! Simulation engine.
//!
//! The engine has three layers:
//!
//! - [`Propagator`] drives a [`CircuitState`](crate::state::CircuitState)
//!   to a fixed point, one pass at a time, and detects oscillation.
//! - A ticker thread turns a tick frequency into tick requests.
//! - [`Simulator`] owns both plus a propagation worker thread, and exposes
//!   the run/pause/step/reset controls. Callers only ever post requests;
//!   all propagation happens on the worker.
//!
//! ## Threads
//!
//! ```text
//! caller ──request──▶ RequestQueue ◀──tick── ticker
//!                          │
//!                          ▼
//!                   propagation worker ──events──▶ subscribers
//! ```

mod propagator;
mod requests;
mod simulator;
mod ticker;

pub use propagator::{PropagateOutcome, PropagationPoints, Propagator};
pub use simulator::{Simulator, SimulatorConfig, SimulatorEvent};
pub use ticker::TickRate;

/// Default number of propagation passes before a circuit is declared oscillating.
pub const DEFAULT_ITERATION_LIMIT: usize = 1000;

/// Default cap on queued, not yet applied ticks.
pub const DEFAULT_MAX_PENDING_TICKS: u32 = 16;

/// Default tick frequency in Hz.
pub const DEFAULT_TICK_FREQUENCY: f64 = 1.0;
