//! Four-state signal values.
//!
//! A [`Value`] is an immutable vector of up to [`MAX_WIDTH`] lanes. Each lane
//! is `0`, `1`, floating (undriven/unknown) or error. Values are packed into
//! three masks so that merging and gate evaluation are a handful of bit
//! operations regardless of width.
//!
//! Errors are data: no operation here fails, conflicting or malformed input
//! simply produces error lanes.

use std::fmt;

/// Maximum number of lanes in a single value.
pub const MAX_WIDTH: u8 = 32;

/// State of a single bit lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Zero,
    One,
    /// Not driven by anything
    Floating,
    /// Driven to conflicting levels, or derived from such a lane
    Error,
}

impl Lane {
    /// Whether the lane carries a definite logic level.
    pub fn is_defined(self) -> bool {
        matches!(self, Lane::Zero | Lane::One)
    }

    /// Merge two drivers of the same lane.
    pub fn merge(self, other: Lane) -> Lane {
        match (self, other) {
            (Lane::Error, _) | (_, Lane::Error) => Lane::Error,
            (Lane::Floating, x) | (x, Lane::Floating) => x,
            (a, b) if a == b => a,
            _ => Lane::Error,
        }
    }

    fn symbol(self) -> char {
        match self {
            Lane::Zero => '0',
            Lane::One => '1',
            Lane::Floating => 'x',
            Lane::Error => 'E',
        }
    }
}

impl From<bool> for Lane {
    fn from(b: bool) -> Self {
        if b {
            Lane::One
        } else {
            Lane::Zero
        }
    }
}

/// A fixed-width multi-lane logic value.
///
/// Invariants: all masks are confined to the low `width` bits, `floating`
/// and `error` are disjoint, and `bits` is only set on lanes that are `1`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    width: u8,
    bits: u32,
    floating: u32,
    error: u32,
}

fn mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

impl Value {
    /// Single-lane `0`.
    pub const ZERO: Value = Value {
        width: 1,
        bits: 0,
        floating: 0,
        error: 0,
    };
    /// Single-lane `1`.
    pub const ONE: Value = Value {
        width: 1,
        bits: 1,
        floating: 0,
        error: 0,
    };
    /// Single-lane floating.
    pub const FLOATING: Value = Value {
        width: 1,
        bits: 0,
        floating: 1,
        error: 0,
    };
    /// Single-lane error.
    pub const ERROR: Value = Value {
        width: 1,
        bits: 0,
        floating: 0,
        error: 1,
    };

    fn clamp_width(width: u8) -> u8 {
        width.min(MAX_WIDTH)
    }

    /// All lanes floating.
    pub fn floating(width: u8) -> Self {
        let width = Self::clamp_width(width);
        Self {
            width,
            bits: 0,
            floating: mask(width),
            error: 0,
        }
    }

    /// All lanes error.
    pub fn error(width: u8) -> Self {
        let width = Self::clamp_width(width);
        Self {
            width,
            bits: 0,
            floating: 0,
            error: mask(width),
        }
    }

    /// A fully defined value from the low `width` bits of `bits`.
    pub fn from_bits(width: u8, bits: u32) -> Self {
        let width = Self::clamp_width(width);
        Self {
            width,
            bits: bits & mask(width),
            floating: 0,
            error: 0,
        }
    }

    /// Build a value from lanes, least significant first.
    ///
    /// Lanes past [`MAX_WIDTH`] are dropped.
    pub fn from_lanes(lanes: &[Lane]) -> Self {
        let mut value = Self {
            width: Self::clamp_width(lanes.len().min(MAX_WIDTH as usize) as u8),
            bits: 0,
            floating: 0,
            error: 0,
        };
        for (i, lane) in lanes.iter().take(MAX_WIDTH as usize).enumerate() {
            let bit = 1u32 << i;
            match lane {
                Lane::Zero => {}
                Lane::One => value.bits |= bit,
                Lane::Floating => value.floating |= bit,
                Lane::Error => value.error |= bit,
            }
        }
        value
    }

    /// Number of lanes.
    pub fn width(&self) -> u8 {
        self.width
    }

    /// The state of lane `index`; lanes outside the width read as error.
    pub fn lane(&self, index: u8) -> Lane {
        if index >= self.width {
            return Lane::Error;
        }
        let bit = 1u32 << index;
        if self.error & bit != 0 {
            Lane::Error
        } else if self.floating & bit != 0 {
            Lane::Floating
        } else if self.bits & bit != 0 {
            Lane::One
        } else {
            Lane::Zero
        }
    }

    /// Copy of this value with one lane replaced. Out-of-range indices are ignored.
    pub fn with_lane(&self, index: u8, lane: Lane) -> Self {
        if index >= self.width {
            return *self;
        }
        let bit = 1u32 << index;
        let mut v = Self {
            width: self.width,
            bits: self.bits & !bit,
            floating: self.floating & !bit,
            error: self.error & !bit,
        };
        match lane {
            Lane::Zero => {}
            Lane::One => v.bits |= bit,
            Lane::Floating => v.floating |= bit,
            Lane::Error => v.error |= bit,
        }
        v
    }

    /// All lanes, least significant first.
    pub fn lanes(&self) -> Vec<Lane> {
        (0..self.width).map(|i| self.lane(i)).collect()
    }

    /// Mask of lanes that are `0` or `1`.
    fn defined(&self) -> u32 {
        mask(self.width) & !self.floating & !self.error
    }

    /// True when every lane is `0` or `1`.
    pub fn is_fully_defined(&self) -> bool {
        self.width > 0 && self.defined() == mask(self.width)
    }

    /// True when any lane is error.
    pub fn has_error(&self) -> bool {
        self.error != 0
    }

    /// True when every lane is floating.
    pub fn is_floating(&self) -> bool {
        self.floating == mask(self.width)
    }

    /// The integer value, if fully defined.
    pub fn to_bits(&self) -> Option<u32> {
        self.is_fully_defined().then_some(self.bits)
    }

    /// Merge two drivers lane by lane.
    ///
    /// Commutative, associative and idempotent. Floating is the identity,
    /// error absorbs, and two different defined levels yield error. When
    /// widths differ, the missing lanes of the narrower value count as
    /// floating.
    pub fn merge(&self, other: &Value) -> Value {
        let width = self.width.max(other.width);
        let full = mask(width);
        // Lanes past a value's width behave as floating.
        let a_float = self.floating | (full & !mask(self.width));
        let b_float = other.floating | (full & !mask(other.width));
        let a_def = full & !a_float & !self.error;
        let b_def = full & !b_float & !other.error;

        let error = (self.error | other.error | (a_def & b_def & (self.bits ^ other.bits))) & full;
        let floating = a_float & b_float & !error;
        let bits = (self.bits | other.bits) & full & !error & !floating;
        Value {
            width,
            bits,
            floating,
            error,
        }
    }

    /// Lane-wise inversion. Floating and error lanes become error.
    pub fn not(&self) -> Value {
        let full = mask(self.width);
        let defined = self.defined();
        Value {
            width: self.width,
            bits: !self.bits & defined,
            floating: 0,
            error: full & !defined,
        }
    }

    /// Lane-wise AND. A defined `0` dominates; otherwise undefined lanes give error.
    pub fn and(&self, other: &Value) -> Value {
        let width = self.width.max(other.width);
        let full = mask(width);
        let a_zero = self.defined() & !self.bits;
        let b_zero = other.defined() & !other.bits;
        let zero = (a_zero | b_zero) & full;
        let one = self.bits & other.bits & self.defined() & other.defined() & full;
        Value {
            width,
            bits: one,
            floating: 0,
            error: full & !zero & !one,
        }
    }

    /// Lane-wise OR. A defined `1` dominates; otherwise undefined lanes give error.
    pub fn or(&self, other: &Value) -> Value {
        let width = self.width.max(other.width);
        let full = mask(width);
        let one = ((self.bits & self.defined()) | (other.bits & other.defined())) & full;
        let zero = self.defined() & other.defined() & !self.bits & !other.bits & full;
        Value {
            width,
            bits: one,
            floating: 0,
            error: full & !zero & !one,
        }
    }

    /// Lane-wise XOR. Any undefined input lane gives error.
    pub fn xor(&self, other: &Value) -> Value {
        let width = self.width.max(other.width);
        let full = mask(width);
        let defined = self.defined() & other.defined() & full;
        Value {
            width,
            bits: (self.bits ^ other.bits) & defined,
            floating: 0,
            error: full & !defined,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        if b {
            Value::ONE
        } else {
            Value::ZERO
        }
    }
}

impl From<Lane> for Value {
    fn from(lane: Lane) -> Self {
        Value::from_lanes(&[lane])
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Most significant lane first, like a bus readout
        for i in (0..self.width).rev() {
            write!(f, "{}", self.lane(i).symbol())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({}'{})", self.width, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Value> {
        vec![
            Value::ZERO,
            Value::ONE,
            Value::FLOATING,
            Value::ERROR,
            Value::from_lanes(&[Lane::One, Lane::Floating, Lane::Zero, Lane::Error]),
            Value::from_lanes(&[Lane::Zero, Lane::One, Lane::Floating, Lane::Floating]),
            Value::from_bits(4, 0b1010),
            Value::floating(4),
        ]
    }

    #[test]
    fn test_merge_laws() {
        let vals = samples();
        for a in &vals {
            assert_eq!(a.merge(a), *a, "idempotent for {a}");
            assert_eq!(a.merge(&Value::floating(a.width())), *a, "floating identity for {a}");
            for b in &vals {
                assert_eq!(a.merge(b), b.merge(a), "commutative for {a}, {b}");
                for c in &vals {
                    assert_eq!(
                        a.merge(b).merge(c),
                        a.merge(&b.merge(c)),
                        "associative for {a}, {b}, {c}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_merge_conflict_is_error() {
        assert_eq!(Value::ONE.merge(&Value::ZERO), Value::ERROR);
        let a = Value::from_bits(4, 0b1100);
        let b = Value::from_bits(4, 0b1010);
        let m = a.merge(&b);
        assert_eq!(m.lanes(), vec![Lane::Zero, Lane::Error, Lane::Error, Lane::One]);
    }

    #[test]
    fn test_merge_error_absorbs() {
        for v in samples() {
            let e = Value::error(v.width());
            assert_eq!(v.merge(&e), e);
        }
    }

    #[test]
    fn test_merge_mixed_width() {
        let narrow = Value::from_bits(2, 0b01);
        let wide = Value::floating(4);
        let m = narrow.merge(&wide);
        assert_eq!(m.width(), 4);
        assert_eq!(m.lanes(), vec![Lane::One, Lane::Zero, Lane::Floating, Lane::Floating]);
    }

    #[test]
    fn test_lane_extraction() {
        let v = Value::from_lanes(&[Lane::One, Lane::Floating, Lane::Zero, Lane::Error]);
        assert_eq!(v.width(), 4);
        assert_eq!(v.lane(0), Lane::One);
        assert_eq!(v.lane(1), Lane::Floating);
        assert_eq!(v.lane(2), Lane::Zero);
        assert_eq!(v.lane(3), Lane::Error);
        assert_eq!(v.lane(9), Lane::Error);
        assert_eq!(v.to_string(), "E0x1");
    }

    #[test]
    fn test_with_lane() {
        let v = Value::floating(3).with_lane(1, Lane::One);
        assert_eq!(v.lanes(), vec![Lane::Floating, Lane::One, Lane::Floating]);
        assert_eq!(v.with_lane(7, Lane::Zero), v);
    }

    #[test]
    fn test_gate_ops() {
        assert_eq!(Value::ZERO.and(&Value::FLOATING), Value::ZERO);
        assert_eq!(Value::ONE.and(&Value::FLOATING), Value::ERROR);
        assert_eq!(Value::ONE.or(&Value::ERROR), Value::ONE);
        assert_eq!(Value::ZERO.or(&Value::FLOATING), Value::ERROR);
        assert_eq!(Value::ONE.xor(&Value::ONE), Value::ZERO);
        assert_eq!(Value::ONE.xor(&Value::FLOATING), Value::ERROR);
        assert_eq!(Value::FLOATING.not(), Value::ERROR);
        assert_eq!(Value::from_bits(4, 0b0011).not().to_bits(), Some(0b1100));
    }

    #[test]
    fn test_full_width() {
        let v = Value::from_bits(32, u32::MAX);
        assert!(v.is_fully_defined());
        assert_eq!(v.to_bits(), Some(u32::MAX));
        assert_eq!(Value::floating(40).width(), MAX_WIDTH);
        assert!(Value::floating(32).is_floating());
    }
}
