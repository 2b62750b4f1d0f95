//! Element types carried by ports.
//!
//! Every port carries exactly one [`PortType`]. Values flowing through the
//! interpretive compute path are held as [`PortData`], one vector variant per
//! element type; kernels are written once over [`Element`] and selected by tag
//! with [`dispatch_element!`](crate::dispatch_element).

use std::fmt;
use std::str::FromStr;

use crate::error::{ForgeResult, GraphForgeError};

/// Scalar kind of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PortType {
    Boolean,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl PortType {
    /// Default floating-point type ("real")
    pub const REAL: PortType = PortType::Float64;
    /// Reduced-precision floating-point type
    pub const SMALL_REAL: PortType = PortType::Float32;

    pub const ALL: [PortType; 7] = [
        PortType::Boolean,
        PortType::Int8,
        PortType::Int16,
        PortType::Int32,
        PortType::Int64,
        PortType::Float32,
        PortType::Float64,
    ];

    /// Stable archive name
    pub fn name(&self) -> &'static str {
        match self {
            PortType::Boolean => "bool",
            PortType::Int8 => "int8",
            PortType::Int16 => "int16",
            PortType::Int32 => "int32",
            PortType::Int64 => "int64",
            PortType::Float32 => "float",
            PortType::Float64 => "double",
        }
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(self, PortType::Float32 | PortType::Float64)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            PortType::Int8 | PortType::Int16 | PortType::Int32 | PortType::Int64
        )
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, PortType::Boolean)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PortType {
    type Err = GraphForgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bool" | "boolean" => Ok(PortType::Boolean),
            "int8" => Ok(PortType::Int8),
            "int16" => Ok(PortType::Int16),
            "int32" | "int" | "integer" => Ok(PortType::Int32),
            "int64" | "bigInt" => Ok(PortType::Int64),
            "float" | "float32" | "smallReal" => Ok(PortType::Float32),
            "double" | "float64" | "real" => Ok(PortType::Float64),
            other => Err(GraphForgeError::arg_parse(
                "port type",
                other,
                "not a known element type",
            )),
        }
    }
}

/// Scalar types that can flow through a port.
pub trait Element: Copy + Default + PartialEq + PartialOrd + fmt::Debug + Send + Sync + 'static {
    const PORT_TYPE: PortType;

    /// Conversion used for constants and casts; integers truncate and saturate.
    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn from_bool(value: bool) -> Self;
    fn is_truthy(self) -> bool;

    fn slice_of(data: &PortData) -> Option<&[Self]>;
    fn into_data(values: Vec<Self>) -> PortData;
}

macro_rules! impl_numeric_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const PORT_TYPE: PortType = PortType::$variant;

            fn from_f64(value: f64) -> Self {
                value as $t
            }

            fn to_f64(self) -> f64 {
                self as f64
            }

            fn from_bool(value: bool) -> Self {
                if value {
                    1 as $t
                } else {
                    0 as $t
                }
            }

            fn is_truthy(self) -> bool {
                self != (0 as $t)
            }

            fn slice_of(data: &PortData) -> Option<&[Self]> {
                match data {
                    PortData::$variant(values) => Some(values),
                    _ => None,
                }
            }

            fn into_data(values: Vec<Self>) -> PortData {
                PortData::$variant(values)
            }
        }
    };
}

impl_numeric_element!(i8, Int8);
impl_numeric_element!(i16, Int16);
impl_numeric_element!(i32, Int32);
impl_numeric_element!(i64, Int64);
impl_numeric_element!(f32, Float32);
impl_numeric_element!(f64, Float64);

impl Element for bool {
    const PORT_TYPE: PortType = PortType::Boolean;

    fn from_f64(value: f64) -> Self {
        value != 0.0
    }

    fn to_f64(self) -> f64 {
        if self {
            1.0
        } else {
            0.0
        }
    }

    fn from_bool(value: bool) -> Self {
        value
    }

    fn is_truthy(self) -> bool {
        self
    }

    fn slice_of(data: &PortData) -> Option<&[Self]> {
        match data {
            PortData::Boolean(values) => Some(values),
            _ => None,
        }
    }

    fn into_data(values: Vec<Self>) -> PortData {
        PortData::Boolean(values)
    }
}

/// Expand `$body` once per element type with `$T` bound to the Rust scalar.
///
/// ```ignore
/// let zeros = dispatch_element!(port_type, T => T::into_data(vec![T::default(); n]));
/// ```
#[macro_export]
macro_rules! dispatch_element {
    ($port_type:expr, $T:ident => $body:expr) => {
        match $port_type {
            $crate::graph::PortType::Boolean => {
                type $T = bool;
                $body
            }
            $crate::graph::PortType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::graph::PortType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::graph::PortType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::graph::PortType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::graph::PortType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::graph::PortType::Float64 => {
                type $T = f64;
                $body
            }
        }
    };
}

/// Like [`dispatch_element!`] but only for floating-point types; other types
/// produce an `InvalidArgument` error. `$body` must evaluate to a `ForgeResult`.
#[macro_export]
macro_rules! dispatch_real {
    ($port_type:expr, $T:ident => $body:expr) => {
        match $port_type {
            $crate::graph::PortType::Float32 => {
                type $T = f32;
                $body
            }
            $crate::graph::PortType::Float64 => {
                type $T = f64;
                $body
            }
            other => Err($crate::invalid_argument!(
                "operation requires a floating-point element type, got {}",
                other
            )),
        }
    };
}

/// Values held by an output port, tagged by element type
#[derive(Debug, Clone, PartialEq)]
pub enum PortData {
    Boolean(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

impl PortData {
    /// Zero-filled (false-filled) data of the given type and size
    pub fn zeros(port_type: PortType, size: usize) -> Self {
        dispatch_element!(port_type, T => T::into_data(vec![T::default(); size]))
    }

    /// Convert `values` into the given element type
    pub fn from_f64s(port_type: PortType, values: &[f64]) -> Self {
        dispatch_element!(port_type, T => {
            T::into_data(values.iter().map(|v| T::from_f64(*v)).collect())
        })
    }

    pub fn port_type(&self) -> PortType {
        match self {
            PortData::Boolean(_) => PortType::Boolean,
            PortData::Int8(_) => PortType::Int8,
            PortData::Int16(_) => PortType::Int16,
            PortData::Int32(_) => PortType::Int32,
            PortData::Int64(_) => PortType::Int64,
            PortData::Float32(_) => PortType::Float32,
            PortData::Float64(_) => PortType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            PortData::Boolean(v) => v.len(),
            PortData::Int8(v) => v.len(),
            PortData::Int16(v) => v.len(),
            PortData::Int32(v) => v.len(),
            PortData::Int64(v) => v.len(),
            PortData::Float32(v) => v.len(),
            PortData::Float64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Typed view; fails with `TypeMismatch` when `T` is not the held type
    pub fn as_slice<T: Element>(&self) -> ForgeResult<&[T]> {
        T::slice_of(self).ok_or(GraphForgeError::TypeMismatch {
            expected: T::PORT_TYPE,
            actual: self.port_type(),
        })
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch_element!(self.port_type(), T => match T::slice_of(self) {
            Some(values) => values.iter().map(|v| v.to_f64()).collect(),
            None => Vec::new(),
        })
    }

    pub fn get_f64(&self, index: usize) -> Option<f64> {
        dispatch_element!(self.port_type(), T => {
            T::slice_of(self).and_then(|v| v.get(index)).map(|v| v.to_f64())
        })
    }

    pub fn is_truthy_at(&self, index: usize) -> bool {
        dispatch_element!(self.port_type(), T => T::slice_of(self)
            .and_then(|v| v.get(index))
            .map(|v| v.is_truthy())
            .unwrap_or(false))
    }

    /// Copy `count` elements starting at `start` into a new vector
    pub fn slice(&self, start: usize, count: usize) -> ForgeResult<PortData> {
        let end = start.checked_add(count).unwrap_or(usize::MAX);
        if end > self.len() {
            return Err(GraphForgeError::OutOfRange {
                index: end.saturating_sub(1),
                size: self.len(),
            });
        }
        Ok(dispatch_element!(self.port_type(), T => match T::slice_of(self) {
            Some(values) => T::into_data(values[start..end].to_vec()),
            None => PortData::zeros(self.port_type(), 0),
        }))
    }

    /// Append `other`, which must hold the same element type
    pub fn extend(&mut self, other: &PortData) -> ForgeResult<()> {
        match (self, other) {
            (PortData::Boolean(a), PortData::Boolean(b)) => a.extend_from_slice(b),
            (PortData::Int8(a), PortData::Int8(b)) => a.extend_from_slice(b),
            (PortData::Int16(a), PortData::Int16(b)) => a.extend_from_slice(b),
            (PortData::Int32(a), PortData::Int32(b)) => a.extend_from_slice(b),
            (PortData::Int64(a), PortData::Int64(b)) => a.extend_from_slice(b),
            (PortData::Float32(a), PortData::Float32(b)) => a.extend_from_slice(b),
            (PortData::Float64(a), PortData::Float64(b)) => a.extend_from_slice(b),
            (this, other) => {
                return Err(GraphForgeError::TypeMismatch {
                    expected: this.port_type(),
                    actual: other.port_type(),
                })
            }
        }
        Ok(())
    }

    /// Element-wise conversion to another element type
    pub fn cast(&self, target: PortType) -> PortData {
        if target == self.port_type() {
            return self.clone();
        }
        if target == PortType::Boolean {
            return PortData::Boolean((0..self.len()).map(|i| self.is_truthy_at(i)).collect());
        }
        PortData::from_f64s(target, &self.to_f64_vec())
    }
}

impl<T: Element> From<Vec<T>> for PortData {
    fn from(values: Vec<T>) -> Self {
        T::into_data(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_type_names_round_trip() {
        for ty in PortType::ALL {
            assert_eq!(ty.name().parse::<PortType>().unwrap(), ty);
        }
        assert_eq!("real".parse::<PortType>().unwrap(), PortType::REAL);
        assert!("complex".parse::<PortType>().is_err());
    }

    #[test]
    fn test_zeros_and_len() {
        let data = PortData::zeros(PortType::Int16, 5);
        assert_eq!(data.len(), 5);
        assert_eq!(data.port_type(), PortType::Int16);
        assert_eq!(data.as_slice::<i16>().unwrap(), &[0; 5]);
    }

    #[test]
    fn test_as_slice_type_mismatch() {
        let data = PortData::from(vec![1.0f32, 2.0]);
        assert!(matches!(
            data.as_slice::<f64>(),
            Err(GraphForgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_slice_and_extend() {
        let data = PortData::from(vec![1i32, 2, 3, 4]);
        let mut head = data.slice(0, 2).unwrap();
        let tail = data.slice(3, 1).unwrap();
        head.extend(&tail).unwrap();
        assert_eq!(head, PortData::from(vec![1i32, 2, 4]));
        assert!(data.slice(3, 2).is_err());
        assert!(head.extend(&PortData::from(vec![true])).is_err());
    }

    #[test]
    fn test_cast() {
        let data = PortData::from(vec![1.7f64, -2.2, 0.0]);
        assert_eq!(data.cast(PortType::Int32), PortData::from(vec![1i32, -2, 0]));
        assert_eq!(
            data.cast(PortType::Boolean),
            PortData::from(vec![true, true, false])
        );
    }
}
