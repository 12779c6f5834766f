//! Clock source for sequential circuits.
//!
//! The clock counts ticks and drives `0` for the first `low_ticks` of every
//! period and `1` for the remaining `high_ticks`. It has no notion of wall
//! time: the ticker decides how often ticks happen.

use super::{data_mut, missing_state, InstanceData, LogicComponent, Outputs, PinSpec};
use crate::error::ComponentFault;
use crate::value::Value;

/// Per-instance clock phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockState {
    /// Ticks since reset, modulo the period
    pub phase: u32,
}

/// Square-wave clock source with a single output pin.
#[derive(Debug, Clone)]
pub struct Clock {
    high_ticks: u32,
    low_ticks: u32,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(1, 1)
    }
}

impl Clock {
    /// Create a clock. Durations below one tick are raised to one.
    pub fn new(high_ticks: u32, low_ticks: u32) -> Self {
        Self {
            high_ticks: high_ticks.max(1),
            low_ticks: low_ticks.max(1),
        }
    }

    /// Length of one full cycle in ticks.
    pub fn period(&self) -> u32 {
        self.high_ticks + self.low_ticks
    }

    /// Output level at a given phase.
    pub fn level(&self, phase: u32) -> Value {
        Value::from(phase % self.period() >= self.low_ticks)
    }
}

impl LogicComponent for Clock {
    fn kind(&self) -> &'static str {
        "CLOCK"
    }

    fn pins(&self) -> Vec<PinSpec> {
        vec![PinSpec::output(1)]
    }

    fn create_data(&self) -> Option<InstanceData> {
        Some(Box::new(ClockState::default()))
    }

    fn recompute_outputs(
        &self,
        _inputs: &[Value],
        data: Option<&mut InstanceData>,
    ) -> Result<Outputs, ComponentFault> {
        let state = data_mut::<ClockState>(data).ok_or_else(|| missing_state(self.kind()))?;
        Ok(vec![(0, self.level(state.phase))])
    }

    fn tick(&self, data: Option<&mut InstanceData>) -> bool {
        match data_mut::<ClockState>(data) {
            Some(state) => {
                state.phase = (state.phase + 1) % self.period();
                true
            }
            None => false,
        }
    }
}
