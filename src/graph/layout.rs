//! Strided multi-dimensional memory layouts.
//!
//! A [`PortMemoryLayout`] describes an *active* region of `size` elements per
//! dimension placed at `offset` inside an allocated region of `extent`
//! elements per dimension. Memory is row-major: the last dimension is
//! innermost. The extent is the layout's stride: the allocated length of
//! each dimension, written as `stride` in archives and argument strings.

use std::fmt;

use crate::error::ForgeResult;
use crate::invalid_argument;

use super::shape::{checked_element_count, element_count};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortMemoryLayout {
    size: Vec<usize>,
    extent: Vec<usize>,
    offset: Vec<usize>,
}

impl PortMemoryLayout {
    /// Create a layout; all vectors must have equal rank and
    /// `offset[d] + size[d] <= extent[d]` for each dimension.
    pub fn new(size: Vec<usize>, extent: Vec<usize>, offset: Vec<usize>) -> ForgeResult<Self> {
        if size.len() != extent.len() || size.len() != offset.len() {
            return Err(invalid_argument!(
                "layout rank mismatch: size {}, extent {}, offset {}",
                size.len(),
                extent.len(),
                offset.len()
            ));
        }
        for d in 0..size.len() {
            if offset[d].checked_add(size[d]).map_or(true, |end| end > extent[d]) {
                return Err(invalid_argument!(
                    "layout dimension {}: offset {} + size {} exceeds extent {}",
                    d,
                    offset[d],
                    size[d],
                    extent[d]
                ));
            }
        }
        let mut increment = 1usize;
        for d in (1..extent.len()).rev() {
            increment = increment.checked_mul(extent[d]).ok_or_else(|| {
                invalid_argument!("layout extent {:?} has too many elements", extent)
            })?;
        }
        if checked_element_count(&extent).is_none() {
            return Err(invalid_argument!("layout extent {:?} has too many elements", extent));
        }
        Ok(Self {
            size,
            extent,
            offset,
        })
    }

    /// Dense layout with no padding
    pub fn from_size(size: Vec<usize>) -> Self {
        let extent = size.clone();
        let offset = vec![0; size.len()];
        Self {
            size,
            extent,
            offset,
        }
    }

    /// Layout with `padding[d]` elements on both sides of each dimension
    pub fn with_padding(size: Vec<usize>, padding: &[usize]) -> ForgeResult<Self> {
        if padding.len() != size.len() {
            return Err(invalid_argument!(
                "padding rank {} does not match layout rank {}",
                padding.len(),
                size.len()
            ));
        }
        let extent = size
            .iter()
            .zip(padding)
            .map(|(s, p)| p.checked_mul(2).and_then(|p2| s.checked_add(p2)))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| invalid_argument!("padding {:?} overflows layout {:?}", padding, size))?;
        Self::new(size, extent, padding.to_vec())
    }

    pub fn rank(&self) -> usize {
        self.size.len()
    }

    pub fn size(&self) -> &[usize] {
        &self.size
    }

    pub fn extent(&self) -> &[usize] {
        &self.extent
    }

    pub fn offset(&self) -> &[usize] {
        &self.offset
    }

    /// Number of active elements
    pub fn num_elements(&self) -> usize {
        element_count(&self.size)
    }

    /// Number of allocated elements, padding included
    pub fn memory_size(&self) -> usize {
        element_count(&self.extent)
    }

    pub fn is_contiguous(&self) -> bool {
        self.size == self.extent
    }

    /// Distance in memory between consecutive entries of each dimension
    pub fn cumulative_increments(&self) -> Vec<usize> {
        let mut increments: Vec<usize> = vec![1; self.rank()];
        for d in (0..self.rank().saturating_sub(1)).rev() {
            increments[d] = increments[d + 1].saturating_mul(self.extent[d + 1]);
        }
        increments
    }

    /// Memory offset of an active-region coordinate
    pub fn entry_offset(&self, coordinates: &[usize]) -> usize {
        let increments = self.cumulative_increments();
        coordinates
            .iter()
            .zip(&self.offset)
            .zip(&increments)
            .map(|((c, o), inc)| (c + o) * inc)
            .sum()
    }

    /// The same layout with dimensions permuted: dimension `i` of the result
    /// is dimension `order[i]` of `self`.
    pub fn permuted(&self, order: &[usize]) -> ForgeResult<Self> {
        validate_order(order, self.rank())?;
        Ok(Self {
            size: order.iter().map(|&d| self.size[d]).collect(),
            extent: order.iter().map(|&d| self.extent[d]).collect(),
            offset: order.iter().map(|&d| self.offset[d]).collect(),
        })
    }

    /// Row-major iteration over every active coordinate
    pub fn active_coordinates(&self) -> ActiveCoordinates {
        ActiveCoordinates::new(self.size.clone())
    }
}

impl fmt::Display for PortMemoryLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "size={:?};stride={:?};offset={:?}",
            self.size, self.extent, self.offset
        )
    }
}

/// Check that `order` is a permutation of `0..rank`
pub fn validate_order(order: &[usize], rank: usize) -> ForgeResult<()> {
    if order.len() != rank {
        return Err(invalid_argument!(
            "dimension order has {} entries, layout rank is {}",
            order.len(),
            rank
        ));
    }
    let mut seen = vec![false; rank];
    for &d in order {
        if d >= rank || seen[d] {
            return Err(invalid_argument!(
                "dimension order {:?} is not a permutation",
                order
            ));
        }
        seen[d] = true;
    }
    Ok(())
}

/// Iterator over coordinates of a dense box, last dimension fastest
#[derive(Debug, Clone)]
pub struct ActiveCoordinates {
    size: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl ActiveCoordinates {
    fn new(size: Vec<usize>) -> Self {
        let next = if size.iter().any(|&s| s == 0) {
            None
        } else {
            Some(vec![0; size.len()])
        };
        Self { size, next }
    }
}

impl Iterator for ActiveCoordinates {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next.take()?;
        let mut advanced = current.clone();
        let mut d = advanced.len();
        let mut carried = true;
        while carried && d > 0 {
            d -= 1;
            advanced[d] += 1;
            if advanced[d] < self.size[d] {
                carried = false;
            } else {
                advanced[d] = 0;
            }
        }
        if !carried {
            self.next = Some(advanced);
        }
        Some(current)
    }
}
