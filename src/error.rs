//! Error types for the Gatesim simulation engine.
//!
//! This module provides a unified error type [`GatesimError`] covering circuit
//! construction, validation and simulator configuration. Component faults
//! raised while propagating are a separate type, [`ComponentFault`], because
//! they never cross the worker boundary: the engine catches them, logs them
//! and latches a flag instead.

use thiserror::Error;

/// Result type alias using [`GatesimError`].
pub type Result<T> = std::result::Result<T, GatesimError>;

/// Unified error type for all Gatesim operations.
#[derive(Error, Debug)]
pub enum GatesimError {
    // ============ Circuit Construction Errors ============
    /// Point not found in circuit
    #[error("Point '{point}' not found in circuit")]
    PointNotFound { point: String },

    /// A component was given the wrong number of pin connections
    #[error("Component '{name}' expects {expected} pins but {actual} were connected")]
    PinCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    /// Duplicate component name
    #[error("Duplicate component name '{name}'")]
    DuplicateComponent { name: String },

    /// Signal width outside the supported range
    #[error("Invalid width {width} for '{name}' (must be 1..={max})")]
    InvalidWidth { name: String, width: usize, max: usize },

    /// Splitter lane out of range for its combined end
    #[error("Splitter lane {lane} out of range for combined width {width}")]
    SplitterLane { lane: usize, width: usize },

    /// Wire segment not found
    #[error("Wire segment {segment} not found")]
    SegmentNotFound { segment: usize },

    // ============ Circuit Validation Errors ============
    /// Ends of different widths attached to one bundle
    #[error("Width conflict on bundle containing point '{point}': {widths:?}")]
    WidthConflict { point: String, widths: Vec<u8> },

    /// Invalid circuit topology
    #[error("Invalid circuit topology: {message}")]
    InvalidTopology { message: String },

    // ============ Simulation Errors ============
    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    /// State node not found in the circuit state arena
    #[error("Circuit state node {state} not found")]
    StateNotFound { state: usize },

    /// A worker thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl GatesimError {
    /// Create an invalid topology error
    pub fn topology(message: impl Into<String>) -> Self {
        Self::InvalidTopology {
            message: message.into(),
        }
    }

    /// Create an invalid simulation parameter error
    pub fn param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }

    /// Create a point-not-found error
    pub fn point_not_found(point: impl Into<String>) -> Self {
        Self::PointNotFound {
            point: point.into(),
        }
    }
}

/// A failure raised by a component while recomputing its outputs.
///
/// Faults are data for the engine, not control flow: the propagator stops the
/// current pass, the controller pauses and latches `exception-encountered`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Component '{component}' failed: {message}")]
pub struct ComponentFault {
    /// Name of the failing component instance
    pub component: String,
    /// Description of the failure
    pub message: String,
}

impl ComponentFault {
    /// Create a fault for the named component.
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
        }
    }
}
