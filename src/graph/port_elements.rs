//! Edge representation: ordered concatenations of output-port slices.

use std::fmt;

use crate::error::{ForgeResult, GraphForgeError};

use super::port::OutputPortRef;
use super::port_type::PortType;

/// `count` consecutive elements of one output port starting at `start`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    pub port: OutputPortRef,
    pub start: usize,
    pub count: usize,
}

impl PortRange {
    pub fn new(port: OutputPortRef, start: usize, count: usize) -> Self {
        Self { port, start, count }
    }

    pub fn end(&self) -> usize {
        self.start + self.count
    }

    /// True when `other` continues this range on the same port
    fn is_adjacent_to(&self, other: &PortRange) -> bool {
        self.port == other.port && self.end() == other.start
    }
}

/// A single element of an output port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortElement {
    pub port: OutputPortRef,
    pub index: usize,
}

/// Typed, ordered concatenation of output-port slices.
///
/// Every range references an output port of the same element type; the total
/// size is the sum of range counts. Adjacent ranges over the same port are
/// merged on construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortElements {
    element_type: PortType,
    ranges: Vec<PortRange>,
}

impl PortElements {
    pub fn empty(element_type: PortType) -> Self {
        Self {
            element_type,
            ranges: Vec::new(),
        }
    }

    pub fn from_range(element_type: PortType, range: PortRange) -> Self {
        let mut elements = Self::empty(element_type);
        elements.push_range(range);
        elements
    }

    /// Concatenate several element lists, which must share one element type
    pub fn concat<'a, I>(parts: I) -> ForgeResult<Self>
    where
        I: IntoIterator<Item = &'a PortElements>,
    {
        let mut iter = parts.into_iter();
        let mut result = match iter.next() {
            Some(first) => first.clone(),
            None => {
                return Err(crate::invalid_argument!(
                    "cannot concatenate an empty list of port elements"
                ))
            }
        };
        for part in iter {
            result.append(part)?;
        }
        Ok(result)
    }

    pub fn element_type(&self) -> PortType {
        self.element_type
    }

    pub fn ranges(&self) -> &[PortRange] {
        &self.ranges
    }

    pub fn size(&self) -> usize {
        self.ranges.iter().map(|r| r.count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append another element list of the same element type
    pub fn append(&mut self, other: &PortElements) -> ForgeResult<()> {
        if other.element_type != self.element_type {
            if self.ranges.is_empty() {
                self.element_type = other.element_type;
            } else if !other.ranges.is_empty() {
                return Err(GraphForgeError::TypeMismatch {
                    expected: self.element_type,
                    actual: other.element_type,
                });
            }
        }
        for range in &other.ranges {
            self.push_range(*range);
        }
        Ok(())
    }

    fn push_range(&mut self, range: PortRange) {
        if range.count == 0 {
            return;
        }
        if let Some(last) = self.ranges.last_mut() {
            if last.is_adjacent_to(&range) {
                last.count += range.count;
                return;
            }
        }
        self.ranges.push(range);
    }

    /// Map a global index to its output port and port-local index
    pub fn resolve(&self, index: usize) -> ForgeResult<PortElement> {
        let mut remaining = index;
        for range in &self.ranges {
            if remaining < range.count {
                return Ok(PortElement {
                    port: range.port,
                    index: range.start + remaining,
                });
            }
            remaining -= range.count;
        }
        Err(GraphForgeError::OutOfRange {
            index,
            size: self.size(),
        })
    }

    /// Sub-sequence of `count` elements starting at global index `start`
    pub fn slice(&self, start: usize, count: usize) -> ForgeResult<PortElements> {
        let size = self.size();
        match start.checked_add(count) {
            Some(end) if end <= size => {}
            end => {
                return Err(GraphForgeError::OutOfRange {
                    index: end.map_or(usize::MAX, |end| end - 1),
                    size,
                })
            }
        }
        let mut result = Self::empty(self.element_type);
        let mut skip = start;
        let mut wanted = count;
        for range in &self.ranges {
            if wanted == 0 {
                break;
            }
            if skip >= range.count {
                skip -= range.count;
                continue;
            }
            let take = (range.count - skip).min(wanted);
            result.push_range(PortRange::new(range.port, range.start + skip, take));
            wanted -= take;
            skip = 0;
        }
        Ok(result)
    }

    /// Single-element sub-sequence
    pub fn element(&self, index: usize) -> ForgeResult<PortElements> {
        self.slice(index, 1)
    }

    /// Lazy, restartable iteration over individual elements in declaration order
    pub fn iter(&self) -> PortElementIter<'_> {
        PortElementIter {
            ranges: &self.ranges,
            range: 0,
            offset: 0,
        }
    }
}

impl fmt::Display for PortElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(
                f,
                "{}.{}[{}..{}]",
                range.port.node.0,
                range.port.port,
                range.start,
                range.end()
            )?;
        }
        write!(f, "}}")
    }
}

impl<'a> IntoIterator for &'a PortElements {
    type Item = PortElement;
    type IntoIter = PortElementIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the individual elements of a [`PortElements`]
#[derive(Debug, Clone)]
pub struct PortElementIter<'a> {
    ranges: &'a [PortRange],
    range: usize,
    offset: usize,
}

impl Iterator for PortElementIter<'_> {
    type Item = PortElement;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(range) = self.ranges.get(self.range) {
            if self.offset < range.count {
                let element = PortElement {
                    port: range.port,
                    index: range.start + self.offset,
                };
                self.offset += 1;
                return Some(element);
            }
            self.range += 1;
            self.offset = 0;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{ModelId, NodeId};

    fn port(node: usize) -> OutputPortRef {
        OutputPortRef::new(ModelId(1), NodeId(node), 0)
    }

    fn scattered() -> PortElements {
        let mut elements =
            PortElements::from_range(PortType::Float32, PortRange::new(port(0), 0, 2));
        elements
            .append(&PortElements::from_range(
                PortType::Float32,
                PortRange::new(port(1), 2, 1),
            ))
            .unwrap();
        elements
    }

    #[test]
    fn test_size_and_resolve() {
        let elements = scattered();
        assert_eq!(elements.size(), 3);
        assert_eq!(
            elements.resolve(2).unwrap(),
            PortElement {
                port: port(1),
                index: 2
            }
        );
        assert!(matches!(
            elements.resolve(3),
            Err(GraphForgeError::OutOfRange { index: 3, size: 3 })
        ));
    }

    #[test]
    fn test_adjacent_ranges_merge() {
        let mut elements =
            PortElements::from_range(PortType::Int32, PortRange::new(port(0), 0, 2));
        elements
            .append(&PortElements::from_range(
                PortType::Int32,
                PortRange::new(port(0), 2, 3),
            ))
            .unwrap();
        assert_eq!(elements.ranges().len(), 1);
        assert_eq!(elements.size(), 5);
    }

    #[test]
    fn test_append_type_mismatch() {
        let mut elements = scattered();
        let other = PortElements::from_range(PortType::Int32, PortRange::new(port(2), 0, 1));
        assert!(matches!(
            elements.append(&other),
            Err(GraphForgeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_iter_is_restartable() {
        let elements = scattered();
        let first: Vec<_> = elements.iter().map(|e| (e.port.node.0, e.index)).collect();
        let second: Vec<_> = elements.iter().map(|e| (e.port.node.0, e.index)).collect();
        assert_eq!(first, vec![(0, 0), (0, 1), (1, 2)]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_slice_across_ranges() {
        let elements = scattered();
        let middle = elements.slice(1, 2).unwrap();
        let items: Vec<_> = middle.iter().map(|e| (e.port.node.0, e.index)).collect();
        assert_eq!(items, vec![(0, 1), (1, 2)]);
        assert!(elements.slice(2, 2).is_err());
        assert!(elements.slice(3, 0).unwrap().is_empty());
    }

    #[test]
    fn test_slice_bounds_do_not_overflow() {
        let elements = scattered();
        assert!(matches!(
            elements.slice(usize::MAX, 1),
            Err(GraphForgeError::OutOfRange { index: usize::MAX, size: 3 })
        ));
        assert!(matches!(
            elements.slice(1, usize::MAX),
            Err(GraphForgeError::OutOfRange { size: 3, .. })
        ));
        assert!(elements.element(usize::MAX).is_err());
    }
}
