//! Signal sources: Constant and Input Pin.

use super::{data_mut, missing_state, InstanceData, LogicComponent, Outputs, PinSpec};
use crate::error::ComponentFault;
use crate::value::Value;

/// Drives a fixed value on its single pin.
#[derive(Debug, Clone)]
pub struct Constant {
    pub value: Value,
}

impl Constant {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl LogicComponent for Constant {
    fn kind(&self) -> &'static str {
        "CONST"
    }

    fn pins(&self) -> Vec<PinSpec> {
        vec![PinSpec::output(self.value.width())]
    }

    fn recompute_outputs(
        &self,
        _inputs: &[Value],
        _data: Option<&mut InstanceData>,
    ) -> Result<Outputs, ComponentFault> {
        Ok(vec![(0, self.value)])
    }
}

/// A user-controlled input. Starts at all zeros; changed through `poke`.
#[derive(Debug, Clone)]
pub struct InputPin {
    pub width: u8,
}

impl InputPin {
    pub fn new(width: u8) -> Self {
        Self { width }
    }
}

impl LogicComponent for InputPin {
    fn kind(&self) -> &'static str {
        "INPUT"
    }

    fn pins(&self) -> Vec<PinSpec> {
        vec![PinSpec::output(self.width)]
    }

    fn create_data(&self) -> Option<InstanceData> {
        Some(Box::new(Value::from_bits(self.width, 0)))
    }

    fn recompute_outputs(
        &self,
        _inputs: &[Value],
        data: Option<&mut InstanceData>,
    ) -> Result<Outputs, ComponentFault> {
        let value = data_mut::<Value>(data).ok_or_else(|| missing_state(self.kind()))?;
        Ok(vec![(0, *value)])
    }

    fn poke(&self, data: Option<&mut InstanceData>, value: Value) -> bool {
        let Some(current) = data_mut::<Value>(data) else {
            return false;
        };
        // Narrower pokes are padded with floating lanes, wider ones truncated
        let mut next = Value::floating(self.width);
        for i in 0..self.width.min(value.width()) {
            next = next.with_lane(i, value.lane(i));
        }
        if *current == next {
            return false;
        }
        *current = next;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_pin_poke() {
        let pin = InputPin::new(2);
        let mut data = pin.create_data();
        let out = pin.recompute_outputs(&[], data.as_mut()).unwrap();
        assert_eq!(out, vec![(0, Value::from_bits(2, 0))]);

        assert!(pin.poke(data.as_mut(), Value::from_bits(2, 0b10)));
        assert!(!pin.poke(data.as_mut(), Value::from_bits(2, 0b10)));
        let out = pin.recompute_outputs(&[], data.as_mut()).unwrap();
        assert_eq!(out, vec![(0, Value::from_bits(2, 0b10))]);
    }

    #[test]
    fn test_input_pin_without_state_faults() {
        let pin = InputPin::new(1);
        assert!(pin.recompute_outputs(&[], None).is_err());
    }
}
