//! # Gatesim Core
//!
//! A concurrent digital-logic simulation engine.
//!
//! This library provides:
//! - Four-state multi-lane signal values (`0`, `1`, floating, error)
//! - Wire bundle resolution: wire segments grouped into bundles, bundle
//!   lanes joined through splitters into threads
//! - Fixed-point propagation with multi-driver conflict resolution and
//!   oscillation detection
//! - A threaded controller with run/pause/step/reset and a clock ticker
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`value`] - Signal values and lane arithmetic
//! - [`wires`] - Wire bundle and thread resolution
//! - [`circuit`] - Circuit connectivity representation and validation
//! - [`components`] - The component interface and a small catalog
//! - [`state`] - Per-simulation mutable values
//! - [`engine`] - Propagator, ticker and simulation controller
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gatesim_core::components::{InputPin, Not};
//! use gatesim_core::{Circuit, CircuitState, Simulator, SimulatorConfig, SimulatorEvent, Value};
//!
//! let mut b = Circuit::builder("inverter");
//! let a = b.point("a");
//! let y = b.point("y");
//! let input = b.add_component("in", Arc::new(InputPin::new(1)), &[a])?;
//! b.add_component("not", Arc::new(Not::new(1)), &[a, y])?;
//! let circuit = Arc::new(b.build());
//!
//! let sim = Simulator::new(SimulatorConfig::default())?;
//! let events = sim.subscribe();
//! sim.set_circuit_state(CircuitState::new(circuit));
//! sim.drive_input(input, Value::ONE);
//! while let Ok(event) = events.recv() {
//!     if event == SimulatorEvent::PropagationCompleted {
//!         break;
//!     }
//! }
//! assert_eq!(sim.value(y), Some(Value::ZERO));
//! # Ok::<(), gatesim_core::GatesimError>(())
//! ```
//!
//! ## Propagation Method
//!
//! Each propagation pass:
//!
//! 1. Applies every queued driver change to its bundle and re-merges the
//!    affected threads
//! 2. Marks the components attached to changed bundles dirty
//! 3. Recomputes every dirty component, queueing outputs that changed
//!
//! Passes repeat until nothing is queued. A circuit still changing after
//! the iteration limit is declared oscillating and the simulator pauses.

pub mod circuit;
pub mod components;
pub mod engine;
pub mod error;
pub mod state;
pub mod value;
pub mod wires;

// Re-export main types for convenience
pub use circuit::{validate_circuit, Circuit, CircuitBuilder};
pub use engine::{Propagator, Simulator, SimulatorConfig, SimulatorEvent};
pub use error::{ComponentFault, GatesimError, Result};
pub use state::{CircuitState, StateId};
pub use value::{Lane, Value};
