//! Component interface and reference catalog.
//!
//! The engine never interprets component behavior. Every logic element is
//! reached through [`LogicComponent`]: a pin layout, an optional opaque
//! per-instance state block, and a function recomputing outputs from inputs.
//!
//! Reference catalog:
//! - Sources: Constant, Input Pin
//! - Gates: AND/OR/XOR/NAND/NOR/XNOR, NOT, Buffer
//! - Clocked: Clock, J-K Flip-Flop

mod clock;
mod flipflop;
mod gates;
mod sources;

pub use clock::{Clock, ClockState};
pub use flipflop::{FlipFlopState, JkFlipFlop};
pub use gates::{Buffer, Gate, GateOp, Not};
pub use sources::{Constant, InputPin};

use std::any::Any;
use std::fmt;

use crate::error::ComponentFault;
use crate::value::Value;

/// Opaque per-instance state owned by the circuit state, interpreted only by
/// the component that created it.
pub type InstanceData = Box<dyn Any + Send>;

/// Output drives produced by a recompute: `(pin index, value)` pairs.
pub type Outputs = Vec<(usize, Value)>;

/// Direction of a pin as seen from the component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinDirection {
    Input,
    Output,
}

/// Width and direction of one pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinSpec {
    pub width: u8,
    pub direction: PinDirection,
}

impl PinSpec {
    pub fn input(width: u8) -> Self {
        Self {
            width,
            direction: PinDirection::Input,
        }
    }

    pub fn output(width: u8) -> Self {
        Self {
            width,
            direction: PinDirection::Output,
        }
    }
}

/// A pluggable logic element.
pub trait LogicComponent: fmt::Debug + Send + Sync {
    /// Short type name, e.g. `"AND"`.
    fn kind(&self) -> &'static str;

    /// Pin layout, in the order pins are bound to points.
    fn pins(&self) -> Vec<PinSpec>;

    /// Fresh internal state for a new or reset instance.
    fn create_data(&self) -> Option<InstanceData> {
        None
    }

    /// Recompute outputs from the current value at every pin.
    ///
    /// `inputs[i]` is the value on the bundle under pin `i`, for output pins
    /// too. Only the returned pins are driven.
    fn recompute_outputs(
        &self,
        inputs: &[Value],
        data: Option<&mut InstanceData>,
    ) -> std::result::Result<Outputs, ComponentFault>;

    /// Advance by one clock edge. Returns true when outputs must be recomputed.
    fn tick(&self, _data: Option<&mut InstanceData>) -> bool {
        false
    }

    /// Accept an externally supplied value (a user poking an input).
    /// Returns true when outputs must be recomputed.
    fn poke(&self, _data: Option<&mut InstanceData>, _value: Value) -> bool {
        false
    }
}

/// Downcast an instance state block to the component's concrete type.
pub fn data_mut<T: 'static>(data: Option<&mut InstanceData>) -> Option<&mut T> {
    data.and_then(|d| d.downcast_mut::<T>())
}

fn missing_state(kind: &str) -> ComponentFault {
    ComponentFault::new(kind, "instance state missing or of the wrong type")
}
