//! Element-wise unary and binary operations.
//!
//! Integers wrap on overflow; integer division by zero is an
//! `ArithmeticError`; floating-point follows IEEE-754 without signaling.

use std::fmt;
use std::str::FromStr;

use crate::error::{ForgeResult, GraphForgeError};
use crate::graph::Element;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperationType {
    None,
    Exp,
    Log,
    Sqrt,
    LogicalNot,
    Tanh,
    Square,
    Sin,
    Cos,
}

impl UnaryOperationType {
    pub const ALL: [UnaryOperationType; 9] = [
        UnaryOperationType::None,
        UnaryOperationType::Exp,
        UnaryOperationType::Log,
        UnaryOperationType::Sqrt,
        UnaryOperationType::LogicalNot,
        UnaryOperationType::Tanh,
        UnaryOperationType::Square,
        UnaryOperationType::Sin,
        UnaryOperationType::Cos,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            UnaryOperationType::None => "none",
            UnaryOperationType::Exp => "exp",
            UnaryOperationType::Log => "log",
            UnaryOperationType::Sqrt => "sqrt",
            UnaryOperationType::LogicalNot => "logicalNot",
            UnaryOperationType::Tanh => "tanh",
            UnaryOperationType::Square => "square",
            UnaryOperationType::Sin => "sin",
            UnaryOperationType::Cos => "cos",
        }
    }
}

impl fmt::Display for UnaryOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for UnaryOperationType {
    type Err = GraphForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s.trim())
            .ok_or_else(|| GraphForgeError::arg_parse("operation", s, "not a unary operation"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperationType {
    None,
    Add,
    Subtract,
    CoordinatewiseMultiply,
    CoordinatewiseDivide,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    ShiftLeft,
    LogicalShiftRight,
    ArithmeticShiftRight,
}

impl BinaryOperationType {
    pub const ALL: [BinaryOperationType; 11] = [
        BinaryOperationType::None,
        BinaryOperationType::Add,
        BinaryOperationType::Subtract,
        BinaryOperationType::CoordinatewiseMultiply,
        BinaryOperationType::CoordinatewiseDivide,
        BinaryOperationType::LogicalAnd,
        BinaryOperationType::LogicalOr,
        BinaryOperationType::LogicalXor,
        BinaryOperationType::ShiftLeft,
        BinaryOperationType::LogicalShiftRight,
        BinaryOperationType::ArithmeticShiftRight,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BinaryOperationType::None => "none",
            BinaryOperationType::Add => "add",
            BinaryOperationType::Subtract => "subtract",
            BinaryOperationType::CoordinatewiseMultiply => "coordinatewiseMultiply",
            BinaryOperationType::CoordinatewiseDivide => "coordinatewiseDivide",
            BinaryOperationType::LogicalAnd => "logicalAnd",
            BinaryOperationType::LogicalOr => "logicalOr",
            BinaryOperationType::LogicalXor => "logicalXor",
            BinaryOperationType::ShiftLeft => "shiftLeft",
            BinaryOperationType::LogicalShiftRight => "logicalShiftRight",
            BinaryOperationType::ArithmeticShiftRight => "arithmeticShiftRight",
        }
    }
}

impl fmt::Display for BinaryOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BinaryOperationType {
    type Err = GraphForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name() == s.trim())
            .ok_or_else(|| GraphForgeError::arg_parse("operation", s, "not a binary operation"))
    }
}

/// Per-element-type semantics of the operation enumerations
pub trait Arithmetic: Element {
    fn supports_unary(op: UnaryOperationType) -> bool;
    fn supports_binary(op: BinaryOperationType) -> bool;
    fn unary(op: UnaryOperationType, x: Self) -> ForgeResult<Self>;
    fn binary(op: BinaryOperationType, a: Self, b: Self) -> ForgeResult<Self>;
}

fn unsupported<T: Element>(op: impl fmt::Display) -> GraphForgeError {
    crate::invalid_argument!("operation {} is not defined for {}", op, T::PORT_TYPE)
}

macro_rules! impl_integer_arithmetic {
    ($t:ty, $unsigned:ty) => {
        impl Arithmetic for $t {
            fn supports_unary(op: UnaryOperationType) -> bool {
                matches!(op, UnaryOperationType::None | UnaryOperationType::Square)
            }

            fn supports_binary(op: BinaryOperationType) -> bool {
                !matches!(
                    op,
                    BinaryOperationType::LogicalAnd
                        | BinaryOperationType::LogicalOr
                        | BinaryOperationType::LogicalXor
                )
            }

            fn unary(op: UnaryOperationType, x: Self) -> ForgeResult<Self> {
                match op {
                    UnaryOperationType::None => Ok(x),
                    UnaryOperationType::Square => Ok(x.wrapping_mul(x)),
                    other => Err(unsupported::<Self>(other)),
                }
            }

            fn binary(op: BinaryOperationType, a: Self, b: Self) -> ForgeResult<Self> {
                match op {
                    BinaryOperationType::None => Ok(a),
                    BinaryOperationType::Add => Ok(a.wrapping_add(b)),
                    BinaryOperationType::Subtract => Ok(a.wrapping_sub(b)),
                    BinaryOperationType::CoordinatewiseMultiply => Ok(a.wrapping_mul(b)),
                    BinaryOperationType::CoordinatewiseDivide => {
                        if b == 0 {
                            Err(GraphForgeError::ArithmeticError(format!(
                                "{} division by zero",
                                <$t as Element>::PORT_TYPE
                            )))
                        } else {
                            Ok(a.wrapping_div(b))
                        }
                    }
                    BinaryOperationType::ShiftLeft => Ok(a.wrapping_shl(b as u32)),
                    BinaryOperationType::LogicalShiftRight => {
                        Ok((a as $unsigned).wrapping_shr(b as u32) as $t)
                    }
                    BinaryOperationType::ArithmeticShiftRight => Ok(a.wrapping_shr(b as u32)),
                    other => Err(unsupported::<Self>(other)),
                }
            }
        }
    };
}

impl_integer_arithmetic!(i8, u8);
impl_integer_arithmetic!(i16, u16);
impl_integer_arithmetic!(i32, u32);
impl_integer_arithmetic!(i64, u64);

macro_rules! impl_float_arithmetic {
    ($t:ty) => {
        impl Arithmetic for $t {
            fn supports_unary(op: UnaryOperationType) -> bool {
                !matches!(op, UnaryOperationType::LogicalNot)
            }

            fn supports_binary(op: BinaryOperationType) -> bool {
                matches!(
                    op,
                    BinaryOperationType::None
                        | BinaryOperationType::Add
                        | BinaryOperationType::Subtract
                        | BinaryOperationType::CoordinatewiseMultiply
                        | BinaryOperationType::CoordinatewiseDivide
                )
            }

            fn unary(op: UnaryOperationType, x: Self) -> ForgeResult<Self> {
                match op {
                    UnaryOperationType::None => Ok(x),
                    UnaryOperationType::Exp => Ok(x.exp()),
                    UnaryOperationType::Log => Ok(x.ln()),
                    UnaryOperationType::Sqrt => Ok(x.sqrt()),
                    UnaryOperationType::Tanh => Ok(x.tanh()),
                    UnaryOperationType::Square => Ok(x * x),
                    UnaryOperationType::Sin => Ok(x.sin()),
                    UnaryOperationType::Cos => Ok(x.cos()),
                    other => Err(unsupported::<Self>(other)),
                }
            }

            fn binary(op: BinaryOperationType, a: Self, b: Self) -> ForgeResult<Self> {
                match op {
                    BinaryOperationType::None => Ok(a),
                    BinaryOperationType::Add => Ok(a + b),
                    BinaryOperationType::Subtract => Ok(a - b),
                    BinaryOperationType::CoordinatewiseMultiply => Ok(a * b),
                    BinaryOperationType::CoordinatewiseDivide => Ok(a / b),
                    other => Err(unsupported::<Self>(other)),
                }
            }
        }
    };
}

impl_float_arithmetic!(f32);
impl_float_arithmetic!(f64);

impl Arithmetic for bool {
    fn supports_unary(op: UnaryOperationType) -> bool {
        matches!(op, UnaryOperationType::None | UnaryOperationType::LogicalNot)
    }

    fn supports_binary(op: BinaryOperationType) -> bool {
        matches!(
            op,
            BinaryOperationType::None
                | BinaryOperationType::LogicalAnd
                | BinaryOperationType::LogicalOr
                | BinaryOperationType::LogicalXor
        )
    }

    fn unary(op: UnaryOperationType, x: Self) -> ForgeResult<Self> {
        match op {
            UnaryOperationType::None => Ok(x),
            UnaryOperationType::LogicalNot => Ok(!x),
            other => Err(unsupported::<Self>(other)),
        }
    }

    fn binary(op: BinaryOperationType, a: Self, b: Self) -> ForgeResult<Self> {
        match op {
            BinaryOperationType::None => Ok(a),
            BinaryOperationType::LogicalAnd => Ok(a && b),
            BinaryOperationType::LogicalOr => Ok(a || b),
            BinaryOperationType::LogicalXor => Ok(a ^ b),
            other => Err(unsupported::<Self>(other)),
        }
    }
}

/// Apply `op` to every element
pub fn unary_map<T: Arithmetic>(op: UnaryOperationType, values: &[T]) -> ForgeResult<Vec<T>> {
    values.iter().map(|&x| T::unary(op, x)).collect()
}

/// Apply `op` coordinate-wise; `a` and `b` must have equal length
pub fn binary_map<T: Arithmetic>(
    op: BinaryOperationType,
    a: &[T],
    b: &[T],
) -> ForgeResult<Vec<T>> {
    if a.len() != b.len() {
        return Err(GraphForgeError::SizeMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    a.iter().zip(b).map(|(&x, &y)| T::binary(op, x, y)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for op in UnaryOperationType::ALL {
            assert_eq!(op.name().parse::<UnaryOperationType>().unwrap(), op);
        }
        for op in BinaryOperationType::ALL {
            assert_eq!(op.name().parse::<BinaryOperationType>().unwrap(), op);
        }
        assert!("multiply".parse::<BinaryOperationType>().is_err());
    }

    #[test]
    fn test_integer_wraps() {
        assert_eq!(
            i8::binary(BinaryOperationType::Add, 127, 1).unwrap(),
            -128
        );
        assert_eq!(i16::unary(UnaryOperationType::Square, 300).unwrap(), 300i16.wrapping_mul(300));
    }

    #[test]
    fn test_integer_division_by_zero() {
        let err = i32::binary(BinaryOperationType::CoordinatewiseDivide, 1, 0).unwrap_err();
        assert!(matches!(err, GraphForgeError::ArithmeticError(_)));
        assert_eq!(
            i32::binary(BinaryOperationType::CoordinatewiseDivide, i32::MIN, -1).unwrap(),
            i32::MIN
        );
    }

    #[test]
    fn test_float_division_by_zero_is_ieee() {
        let inf = f32::binary(BinaryOperationType::CoordinatewiseDivide, 1.0, 0.0).unwrap();
        assert!(inf.is_infinite());
        let nan = f64::binary(BinaryOperationType::CoordinatewiseDivide, 0.0, 0.0).unwrap();
        assert!(nan.is_nan());
    }

    #[test]
    fn test_shifts() {
        assert_eq!(i8::binary(BinaryOperationType::ShiftLeft, 1, 3).unwrap(), 8);
        assert_eq!(
            i8::binary(BinaryOperationType::LogicalShiftRight, -128, 7).unwrap(),
            1
        );
        assert_eq!(
            i8::binary(BinaryOperationType::ArithmeticShiftRight, -128, 7).unwrap(),
            -1
        );
    }

    #[test]
    fn test_support_tables() {
        assert!(bool::supports_binary(BinaryOperationType::LogicalXor));
        assert!(!bool::supports_binary(BinaryOperationType::Add));
        assert!(!f32::supports_binary(BinaryOperationType::ShiftLeft));
        assert!(!i32::supports_unary(UnaryOperationType::Exp));
        assert!(f64::supports_unary(UnaryOperationType::Cos));
    }

    #[test]
    fn test_binary_map_size_mismatch() {
        assert!(binary_map(BinaryOperationType::Add, &[1i32, 2], &[1]).is_err());
    }
}
