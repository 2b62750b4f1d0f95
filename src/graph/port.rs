//! Typed input/output endpoints on nodes.

use std::fmt;

use super::node::{ModelId, NodeId};
use super::port_elements::PortElements;
use super::port_type::{PortData, PortType};

/// Name of the single output port most nodes expose
pub const DEFAULT_OUTPUT: &str = "output";
/// Name of the single input port most nodes expose
pub const DEFAULT_INPUT: &str = "input";

/// Non-owning reference to an output port: (model, node, output index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputPortRef {
    pub model: ModelId,
    pub node: NodeId,
    pub port: usize,
}

impl OutputPortRef {
    pub fn new(model: ModelId, node: NodeId, port: usize) -> Self {
        Self { model, node, port }
    }
}

impl fmt::Display for OutputPortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node.0, self.port)
    }
}

/// Declared shape of a port: name, element type and size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    pub name: &'static str,
    pub element_type: PortType,
    pub size: usize,
}

impl PortSpec {
    pub fn new(name: &'static str, element_type: PortType, size: usize) -> Self {
        Self {
            name,
            element_type,
            size,
        }
    }

    pub fn input(element_type: PortType, size: usize) -> Self {
        Self::new(DEFAULT_INPUT, element_type, size)
    }

    pub fn output(element_type: PortType, size: usize) -> Self {
        Self::new(DEFAULT_OUTPUT, element_type, size)
    }
}

/// Consumes values from producer output ports
#[derive(Debug, Clone)]
pub struct InputPort {
    name: &'static str,
    element_type: PortType,
    size: usize,
    elements: PortElements,
}

impl InputPort {
    pub(crate) fn new(spec: &PortSpec, elements: PortElements) -> Self {
        Self {
            name: spec.name,
            element_type: spec.element_type,
            size: spec.size,
            elements,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn element_type(&self) -> PortType {
        self.element_type
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Producers this port reads from
    pub fn elements(&self) -> &PortElements {
        &self.elements
    }

    pub(crate) fn spec(&self) -> PortSpec {
        PortSpec::new(self.name, self.element_type, self.size)
    }

    pub(crate) fn set_elements(&mut self, elements: PortElements) {
        self.elements = elements;
    }
}

/// Produces a fixed-size vector; keeps the most recently computed value
#[derive(Debug, Clone)]
pub struct OutputPort {
    name: &'static str,
    element_type: PortType,
    size: usize,
    value: PortData,
}

impl OutputPort {
    pub(crate) fn new(spec: &PortSpec) -> Self {
        Self {
            name: spec.name,
            element_type: spec.element_type,
            size: spec.size,
            value: PortData::zeros(spec.element_type, spec.size),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn element_type(&self) -> PortType {
        self.element_type
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Most recently computed value
    pub fn value(&self) -> &PortData {
        &self.value
    }

    pub(crate) fn set_value(&mut self, value: PortData) {
        self.value = value;
    }
}
