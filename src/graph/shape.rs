//! Shape helpers.

use std::fmt;

use crate::error::ForgeResult;
use crate::invalid_argument;

/// Product of `shape`, or `None` when it does not fit in `usize`
pub fn checked_element_count(shape: &[usize]) -> Option<usize> {
    if shape.contains(&0) {
        return Some(0);
    }
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// Product of `shape`, saturating at `usize::MAX`
pub fn element_count(shape: &[usize]) -> usize {
    checked_element_count(shape).unwrap_or(usize::MAX)
}

/// Compact 3-D shape (rows, columns, channels), channels innermost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TensorShape {
    pub rows: usize,
    pub columns: usize,
    pub channels: usize,
}

impl TensorShape {
    pub fn new(rows: usize, columns: usize, channels: usize) -> Self {
        Self {
            rows,
            columns,
            channels,
        }
    }

    /// A 1 x 1 x `size` shape, used for flat vectors
    pub fn vector(size: usize) -> Self {
        Self::new(1, 1, size)
    }

    /// Element count, saturating at `usize::MAX`; see [`validate`](Self::validate)
    pub fn size(&self) -> usize {
        self.checked_size().unwrap_or(usize::MAX)
    }

    pub fn checked_size(&self) -> Option<usize> {
        checked_element_count(&[self.rows, self.columns, self.channels])
    }

    /// Element count, rejecting shapes whose volume overflows `usize`
    pub fn validate(&self) -> ForgeResult<usize> {
        self.checked_size()
            .ok_or_else(|| invalid_argument!("shape {} has too many elements", self))
    }

    pub fn to_vec(&self) -> Vec<usize> {
        vec![self.rows, self.columns, self.channels]
    }

    pub fn from_slice(dims: &[usize]) -> Option<Self> {
        match dims {
            [size] => Some(Self::vector(*size)),
            [rows, columns, channels] => Some(Self::new(*rows, *columns, *channels)),
            _ => None,
        }
    }

    /// Row-major offset of (row, column, channel)
    pub fn offset(&self, row: usize, column: usize, channel: usize) -> usize {
        (row * self.columns + column) * self.channels + channel
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.rows, self.columns, self.channels)
    }
}
