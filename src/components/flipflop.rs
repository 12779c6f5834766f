//! Edge-triggered J-K flip-flop.

use super::{data_mut, missing_state, InstanceData, LogicComponent, Outputs, PinSpec};
use crate::error::ComponentFault;
use crate::value::Value;

/// Pin layout: J, K, clock, Q.
pub const PIN_J: usize = 0;
pub const PIN_K: usize = 1;
pub const PIN_CLOCK: usize = 2;
pub const PIN_Q: usize = 3;

/// Stored bit and the clock level seen on the previous evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlipFlopState {
    pub q: Value,
    pub last_clock: Value,
}

impl Default for FlipFlopState {
    fn default() -> Self {
        Self {
            q: Value::ZERO,
            last_clock: Value::FLOATING,
        }
    }
}

/// Rising-edge J-K flip-flop. With J and K both high it toggles.
#[derive(Debug, Clone, Default)]
pub struct JkFlipFlop;

impl JkFlipFlop {
    pub fn new() -> Self {
        Self
    }
}

impl LogicComponent for JkFlipFlop {
    fn kind(&self) -> &'static str {
        "JK-FF"
    }

    fn pins(&self) -> Vec<PinSpec> {
        vec![
            PinSpec::input(1),
            PinSpec::input(1),
            PinSpec::input(1),
            PinSpec::output(1),
        ]
    }

    fn create_data(&self) -> Option<InstanceData> {
        Some(Box::new(FlipFlopState::default()))
    }

    fn recompute_outputs(
        &self,
        inputs: &[Value],
        data: Option<&mut InstanceData>,
    ) -> Result<Outputs, ComponentFault> {
        let state = data_mut::<FlipFlopState>(data).ok_or_else(|| missing_state(self.kind()))?;
        if inputs.len() < 3 {
            return Err(ComponentFault::new(self.kind(), "missing input values"));
        }
        let clock = inputs[PIN_CLOCK];
        let rising = state.last_clock == Value::ZERO && clock == Value::ONE;
        state.last_clock = clock;

        if rising {
            // Undefined J/K leave the stored bit alone
            state.q = match (inputs[PIN_J].to_bits(), inputs[PIN_K].to_bits()) {
                (Some(1), Some(1)) => state.q.not(),
                (Some(1), Some(0)) => Value::ONE,
                (Some(0), Some(1)) => Value::ZERO,
                _ => state.q,
            };
        }
        Ok(vec![(PIN_Q, state.q)])
    }
}
