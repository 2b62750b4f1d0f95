//! Model: exclusive owner of a DAG of nodes.
//!
//! Nodes live in an arena indexed by [`NodeId`]; edges are [`PortElements`]
//! holding ids, never pointers. Every mutation validates before touching the
//! arena, so a failed operation leaves the model unchanged.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{ForgeResult, GraphForgeError};
use crate::nodes::io::{InputNode, OutputNode};
use crate::{internal_error, invalid_argument};

use super::host::HostContext;
use super::node::{ModelId, Node, NodeId, NodeKind};
use super::port::{InputPort, OutputPort, OutputPortRef, PortSpec};
use super::port_elements::{PortElements, PortRange};
use super::port_type::PortData;

/// Global counter for unique model IDs.
static MODEL_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_model_id() -> ModelId {
    ModelId(MODEL_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
}

#[derive(Debug)]
pub struct Model {
    id: ModelId,
    nodes: Vec<Node>,
}

impl Default for Model {
    fn default() -> Self {
        Self::new()
    }
}

impl Model {
    pub fn new() -> Self {
        Self {
            id: next_model_id(),
            nodes: Vec::new(),
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> ForgeResult<&Node> {
        self.nodes
            .get(id.0)
            .ok_or_else(|| invalid_argument!("node {} does not exist in model {}", id, self.id.0))
    }

    fn node_mut(&mut self, id: NodeId) -> ForgeResult<&mut Node> {
        let model = self.id.0;
        self.nodes
            .get_mut(id.0)
            .ok_or_else(|| invalid_argument!("node {} does not exist in model {}", id, model))
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Every element of the named output port of `node`
    pub fn output_port(&self, node: NodeId, name: &str) -> ForgeResult<PortElements> {
        let owner = self.node(node)?;
        let index = owner.output_index(name).ok_or_else(|| {
            invalid_argument!("node {} ({}) has no output '{}'", node, owner.type_name(), name)
        })?;
        Ok(self.port_elements(owner, index))
    }

    /// Every element of the first output port of `node`
    pub fn output(&self, node: NodeId) -> ForgeResult<PortElements> {
        let owner = self.node(node)?;
        if owner.outputs().is_empty() {
            return Err(invalid_argument!(
                "node {} ({}) has no outputs",
                node,
                owner.type_name()
            ));
        }
        Ok(self.port_elements(owner, 0))
    }

    fn port_elements(&self, owner: &Node, index: usize) -> PortElements {
        let port = &owner.outputs()[index];
        PortElements::from_range(
            port.element_type(),
            PortRange::new(
                OutputPortRef::new(self.id, owner.id(), index),
                0,
                port.size(),
            ),
        )
    }

    /// Check that `elements` may be bound to an input declared by `spec`
    pub fn validate_binding(&self, spec: &PortSpec, elements: &PortElements) -> ForgeResult<()> {
        for range in elements.ranges() {
            if range.port.model != self.id {
                return Err(GraphForgeError::CrossModel {
                    expected: self.id.0,
                    found: range.port.model.0,
                });
            }
        }
        if !elements.is_empty() && elements.element_type() != spec.element_type {
            return Err(GraphForgeError::TypeMismatch {
                expected: spec.element_type,
                actual: elements.element_type(),
            });
        }
        for range in elements.ranges() {
            let producer = self.node(range.port.node)?;
            let output = producer.outputs().get(range.port.port).ok_or_else(|| {
                invalid_argument!(
                    "node {} ({}) has no output #{}",
                    producer.id(),
                    producer.type_name(),
                    range.port.port
                )
            })?;
            if output.element_type() != spec.element_type {
                return Err(GraphForgeError::TypeMismatch {
                    expected: spec.element_type,
                    actual: output.element_type(),
                });
            }
            if range.end() > output.size() {
                return Err(GraphForgeError::OutOfRange {
                    index: range.end() - 1,
                    size: output.size(),
                });
            }
        }
        if elements.size() != spec.size {
            return Err(GraphForgeError::SizeMismatch {
                expected: spec.size,
                actual: elements.size(),
            });
        }
        Ok(())
    }

    /// Validate and append a node. `inputs` holds one entry per declared input port.
    pub(crate) fn add_node(
        &mut self,
        kind: Box<dyn NodeKind>,
        inputs: Vec<PortElements>,
    ) -> ForgeResult<NodeId> {
        let input_specs = kind.input_ports();
        if input_specs.len() != inputs.len() {
            return Err(invalid_argument!(
                "{} declares {} inputs, {} given",
                kind.type_name(),
                input_specs.len(),
                inputs.len()
            ));
        }
        for (spec, elements) in input_specs.iter().zip(&inputs) {
            self.validate_binding(spec, elements)?;
        }

        let id = NodeId(self.nodes.len());
        let input_ports = input_specs
            .iter()
            .zip(inputs)
            .map(|(spec, elements)| InputPort::new(spec, elements))
            .collect();
        let output_ports = kind.output_ports().iter().map(OutputPort::new).collect();
        tracing::trace!(node = id.0, kind = %kind.type_name(), "node added");
        self.nodes.push(Node::new(id, kind, input_ports, output_ports));
        Ok(id)
    }

    /// Drop every node added after the model had `len` nodes
    pub(crate) fn truncate(&mut self, len: usize) {
        self.nodes.truncate(len);
    }

    /// Re-target one named input of an existing node
    pub fn reset_input(
        &mut self,
        node: NodeId,
        port_name: &str,
        elements: PortElements,
    ) -> ForgeResult<()> {
        let target = self.node(node)?;
        let index = target.input_index(port_name).ok_or_else(|| {
            invalid_argument!(
                "node {} ({}) has no input '{}'",
                node,
                target.type_name(),
                port_name
            )
        })?;
        let spec = target.inputs()[index].spec();
        self.validate_binding(&spec, &elements)?;

        let producers: Vec<NodeId> = elements.ranges().iter().map(|r| r.port.node).collect();
        if self.reaches(&producers, node) {
            return Err(GraphForgeError::CycleIntroduced {
                node: node.0,
                port: port_name.to_string(),
            });
        }

        tracing::debug!(node = node.0, port = port_name, elements = %elements, "input reset");
        self.node_mut(node)?.inputs_mut()[index].set_elements(elements);
        Ok(())
    }

    /// True if `target` is one of `starts` or an ancestor of one of them
    fn reaches(&self, starts: &[NodeId], target: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack: Vec<NodeId> = starts.to_vec();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current.0) {
                stack.extend(node.dependencies());
            }
        }
        false
    }

    /// Topological order; ties broken by insertion order
    pub fn topological_order(&self) -> Vec<NodeId> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut consumers: Vec<Vec<usize>> = vec![Vec::new(); n];
        for node in &self.nodes {
            let producers: BTreeSet<NodeId> = node.dependencies().collect();
            for producer in producers {
                if producer.0 < n {
                    consumers[producer.0].push(node.id().0);
                    in_degree[node.id().0] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);
        while let Some(Reverse(current)) = ready.pop() {
            order.push(NodeId(current));
            for &consumer in &consumers[current] {
                in_degree[consumer] -= 1;
                if in_degree[consumer] == 0 {
                    ready.push(Reverse(consumer));
                }
            }
        }
        order
    }

    /// Concatenate the current values referenced by `elements`
    pub fn gather(&self, elements: &PortElements) -> ForgeResult<PortData> {
        let mut result = PortData::zeros(elements.element_type(), 0);
        for range in elements.ranges() {
            if range.port.model != self.id {
                return Err(GraphForgeError::CrossModel {
                    expected: self.id.0,
                    found: range.port.model.0,
                });
            }
            let producer = self.node(range.port.node)?;
            let output = producer
                .outputs()
                .get(range.port.port)
                .ok_or_else(|| internal_error!("dangling output reference {}", range.port))?;
            result.extend(&output.value().slice(range.start, range.count)?)?;
        }
        Ok(result)
    }

    /// Most recent value of the first output port of `node`
    pub fn output_value(&self, node: NodeId) -> ForgeResult<&PortData> {
        let owner = self.node(node)?;
        owner
            .outputs()
            .first()
            .map(|p| p.value())
            .ok_or_else(|| invalid_argument!("node {} has no outputs", node))
    }

    /// Set the value an input node emits on the next compute
    pub fn set_input_value(&mut self, node: NodeId, value: PortData) -> ForgeResult<()> {
        let target = self.node_mut(node)?;
        let type_name = target.type_name();
        let input = target
            .downcast_mut::<InputNode>()
            .ok_or_else(|| {
                invalid_argument!("node {} ({}) is not an input node", node, type_name)
            })?;
        input.set_value(value)
    }

    /// Input nodes in insertion order
    pub fn input_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.downcast::<InputNode>().is_some())
            .map(|n| n.id())
            .collect()
    }

    /// Output nodes in insertion order
    pub fn output_nodes(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.downcast::<OutputNode>().is_some())
            .map(|n| n.id())
            .collect()
    }

    /// Evaluate every node in topological order with no host callbacks
    pub fn compute(&mut self) -> ForgeResult<()> {
        self.compute_with(&mut HostContext::new())
    }

    /// Evaluate every node in topological order
    pub fn compute_with(&mut self, host: &mut HostContext) -> ForgeResult<()> {
        for id in self.topological_order() {
            let inputs = self.nodes[id.0]
                .inputs()
                .iter()
                .map(|port| self.gather(port.elements()))
                .collect::<ForgeResult<Vec<_>>>()?;

            let node = &mut self.nodes[id.0];
            let outputs = node.kind_mut().compute(&inputs, host)?;
            if outputs.len() != node.outputs().len() {
                return Err(internal_error!(
                    "{} produced {} outputs, declares {}",
                    node.type_name(),
                    outputs.len(),
                    node.outputs().len()
                ));
            }
            for (port, value) in node.outputs_mut().iter_mut().zip(outputs) {
                if value.port_type() != port.element_type() || value.len() != port.size() {
                    return Err(internal_error!(
                        "output '{}' expects {}x{}, computed {}x{}",
                        port.name(),
                        port.element_type(),
                        port.size(),
                        value.port_type(),
                        value.len()
                    ));
                }
                port.set_value(value);
            }
            tracing::trace!(node = id.0, "computed");
        }
        Ok(())
    }

    /// Clear compute-time state of every node
    pub fn reset_state(&mut self) {
        for node in &mut self.nodes {
            node.kind_mut().reset();
            for port in node.outputs_mut() {
                port.set_value(PortData::zeros(port.element_type(), port.size()));
            }
        }
    }

    /// Re-check every graph invariant
    pub fn verify(&self) -> ForgeResult<()> {
        for node in &self.nodes {
            let declared = node.kind().input_ports();
            if declared.len() != node.inputs().len() {
                return Err(internal_error!(
                    "node {} has {} inputs, kind declares {}",
                    node.id(),
                    node.inputs().len(),
                    declared.len()
                ));
            }
            for input in node.inputs() {
                self.validate_binding(&input.spec(), input.elements())?;
            }
        }
        if self.topological_order().len() != self.nodes.len() {
            return Err(internal_error!("model {} contains a cycle", self.id.0));
        }
        Ok(())
    }

    /// Kind names and edges in topological order, identities renumbered
    pub fn structural_fingerprint(&self) -> Vec<String> {
        let order = self.topological_order();
        let mut position = vec![0usize; self.nodes.len()];
        for (i, id) in order.iter().enumerate() {
            position[id.0] = i;
        }
        order
            .iter()
            .map(|id| {
                let node = &self.nodes[id.0];
                let inputs: Vec<String> = node
                    .inputs()
                    .iter()
                    .map(|input| {
                        let ranges: Vec<String> = input
                            .elements()
                            .ranges()
                            .iter()
                            .map(|r| {
                                format!(
                                    "{}.{}[{}..{}]",
                                    position[r.port.node.0],
                                    r.port.port,
                                    r.start,
                                    r.end()
                                )
                            })
                            .collect();
                        format!("{}={{{}}}", input.name(), ranges.join(","))
                    })
                    .collect();
                format!("{}({})", node.type_name(), inputs.join(";"))
            })
            .collect()
    }
}
