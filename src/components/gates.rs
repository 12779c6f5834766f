//! Combinational gates.

use super::{InstanceData, LogicComponent, Outputs, PinSpec};
use crate::error::ComponentFault;
use crate::value::Value;

/// Boolean function of a multi-input gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOp {
    And,
    Or,
    Xor,
    Nand,
    Nor,
    Xnor,
}

/// An N-input gate. Pins `0..inputs` are inputs, the last pin is the output.
#[derive(Debug, Clone)]
pub struct Gate {
    pub op: GateOp,
    pub inputs: usize,
    pub width: u8,
}

impl Gate {
    /// Create a gate; at least two inputs are always provided.
    pub fn new(op: GateOp, inputs: usize, width: u8) -> Self {
        Self {
            op,
            inputs: inputs.max(2),
            width,
        }
    }

    fn apply(&self, values: &[Value]) -> Value {
        let fold = |f: fn(&Value, &Value) -> Value| {
            values[1..].iter().fold(values[0], |acc, v| f(&acc, v))
        };
        match self.op {
            GateOp::And => fold(Value::and),
            GateOp::Or => fold(Value::or),
            GateOp::Xor => fold(Value::xor),
            GateOp::Nand => fold(Value::and).not(),
            GateOp::Nor => fold(Value::or).not(),
            GateOp::Xnor => fold(Value::xor).not(),
        }
    }
}

impl LogicComponent for Gate {
    fn kind(&self) -> &'static str {
        match self.op {
            GateOp::And => "AND",
            GateOp::Or => "OR",
            GateOp::Xor => "XOR",
            GateOp::Nand => "NAND",
            GateOp::Nor => "NOR",
            GateOp::Xnor => "XNOR",
        }
    }

    fn pins(&self) -> Vec<PinSpec> {
        let mut pins = vec![PinSpec::input(self.width); self.inputs];
        pins.push(PinSpec::output(self.width));
        pins
    }

    fn recompute_outputs(
        &self,
        inputs: &[Value],
        _data: Option<&mut InstanceData>,
    ) -> Result<Outputs, ComponentFault> {
        if inputs.len() < self.inputs {
            return Err(ComponentFault::new(self.kind(), "missing input values"));
        }
        Ok(vec![(self.inputs, self.apply(&inputs[..self.inputs]))])
    }
}

/// Inverter: pin 0 in, pin 1 out.
#[derive(Debug, Clone)]
pub struct Not {
    pub width: u8,
}

impl Not {
    pub fn new(width: u8) -> Self {
        Self { width }
    }
}

impl LogicComponent for Not {
    fn kind(&self) -> &'static str {
        "NOT"
    }

    fn pins(&self) -> Vec<PinSpec> {
        vec![PinSpec::input(self.width), PinSpec::output(self.width)]
    }

    fn recompute_outputs(
        &self,
        inputs: &[Value],
        _data: Option<&mut InstanceData>,
    ) -> Result<Outputs, ComponentFault> {
        let input = inputs
            .first()
            .ok_or_else(|| ComponentFault::new(self.kind(), "missing input value"))?;
        Ok(vec![(1, input.not())])
    }
}

/// Non-inverting buffer: pin 0 in, pin 1 out. Passes floating lanes through.
#[derive(Debug, Clone)]
pub struct Buffer {
    pub width: u8,
}

impl Buffer {
    pub fn new(width: u8) -> Self {
        Self { width }
    }
}

impl LogicComponent for Buffer {
    fn kind(&self) -> &'static str {
        "BUF"
    }

    fn pins(&self) -> Vec<PinSpec> {
        vec![PinSpec::input(self.width), PinSpec::output(self.width)]
    }

    fn recompute_outputs(
        &self,
        inputs: &[Value],
        _data: Option<&mut InstanceData>,
    ) -> Result<Outputs, ComponentFault> {
        let input = inputs
            .first()
            .ok_or_else(|| ComponentFault::new(self.kind(), "missing input value"))?;
        Ok(vec![(1, *input)])
    }
}
