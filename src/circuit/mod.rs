//! Circuit connectivity representation and validation.
//!
//! This module provides the static snapshot the engine simulates: named
//! points, wire segments, splitters, placed components and sub-circuit
//! instances. A [`Circuit`] is immutable once built; topology edits go
//! through [`Circuit::edit`] and produce a new snapshot.

mod graph;
mod types;
mod validate;

pub use graph::{Circuit, CircuitBuilder, Element, ElementKind, PinBinding, Port};
pub use types::*;
pub use validate::validate_circuit;
