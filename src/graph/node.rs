//! Node base: identity, port rosters and the per-kind capability set.

use std::any::Any;
use std::fmt;

use crate::error::ForgeResult;

use super::archive::ArchiveObject;
use super::host::HostContext;
use super::port::{InputPort, OutputPort, PortSpec};
use super::port_type::{PortData, PortType};
use super::transformer::ModelTransformer;

/// Stable node identity within one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-unique model identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(pub u64);

/// Semantics of one node kind.
///
/// Construction parameters live in the implementing struct; the declared port
/// shapes are a pure function of them. `Copy` is provided generically by the
/// transformer, so kinds only implement `refine` when they are composite.
pub trait NodeKind: fmt::Debug + Send + Any {
    /// Registered base name, e.g. `UnaryOperationNode`
    fn kind_name(&self) -> &'static str;

    /// Display name including element type parameters
    fn type_name(&self) -> String {
        self.kind_name().to_string()
    }

    fn input_ports(&self) -> Vec<PortSpec>;

    fn output_ports(&self) -> Vec<PortSpec>;

    /// Primitive kinds are fixed points of refinement
    fn is_primitive(&self) -> bool {
        true
    }

    /// Read `inputs` (one entry per input port, in declaration order) and
    /// produce one value per output port.
    fn compute(&mut self, inputs: &[PortData], host: &mut HostContext)
        -> ForgeResult<Vec<PortData>>;

    /// Emit successor nodes into the transformer's target model. Returns true
    /// if the node was lowered into other kinds.
    fn refine(&self, node: &Node, transformer: &mut ModelTransformer) -> ForgeResult<bool> {
        transformer.copy_node(node)?;
        Ok(false)
    }

    /// Write construction parameters under stable field names
    fn write_to_archive(&self, archive: &mut ArchiveObject);

    /// Fresh instance with identical construction parameters
    fn clone_kind(&self) -> Box<dyn NodeKind>;

    /// Clear compute-time state (buffers, recurrent state, timers)
    fn reset(&mut self) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// `Name<type, ...>` display name
pub fn templated_name(kind: &str, types: &[PortType]) -> String {
    let args: Vec<&str> = types.iter().map(|t| t.name()).collect();
    format!("{}<{}>", kind, args.join(","))
}

/// Boilerplate shared by every [`NodeKind`] implementation whose struct is `Clone`.
#[macro_export]
macro_rules! node_kind_common {
    () => {
        fn clone_kind(&self) -> Box<dyn $crate::graph::NodeKind> {
            let mut kind = self.clone();
            $crate::graph::NodeKind::reset(&mut kind);
            Box::new(kind)
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

/// A node owned by a model
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    kind: Box<dyn NodeKind>,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        kind: Box<dyn NodeKind>,
        inputs: Vec<InputPort>,
        outputs: Vec<OutputPort>,
    ) -> Self {
        Self {
            id,
            kind,
            inputs,
            outputs,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> &dyn NodeKind {
        self.kind.as_ref()
    }

    pub(crate) fn kind_mut(&mut self) -> &mut dyn NodeKind {
        self.kind.as_mut()
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.kind_name()
    }

    pub fn type_name(&self) -> String {
        self.kind.type_name()
    }

    pub fn is_primitive(&self) -> bool {
        self.kind.is_primitive()
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut [InputPort] {
        &mut self.inputs
    }

    pub(crate) fn outputs_mut(&mut self) -> &mut [OutputPort] {
        &mut self.outputs
    }

    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|p| p.name() == name)
    }

    pub fn input_index(&self, name: &str) -> Option<usize> {
        self.inputs.iter().position(|p| p.name() == name)
    }

    pub fn output_index(&self, name: &str) -> Option<usize> {
        self.outputs.iter().position(|p| p.name() == name)
    }

    /// Producer nodes, in input declaration order (may repeat)
    pub fn dependencies(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs
            .iter()
            .flat_map(|input| input.elements().ranges().iter().map(|r| r.port.node))
    }

    /// Downcast the kind to a concrete node type
    pub fn downcast<K: NodeKind>(&self) -> Option<&K> {
        self.kind.as_any().downcast_ref::<K>()
    }

    pub(crate) fn downcast_mut<K: NodeKind>(&mut self) -> Option<&mut K> {
        self.kind.as_any_mut().downcast_mut::<K>()
    }

    /// Structural clone into the transformer's target model
    pub fn copy(&self, transformer: &mut ModelTransformer) -> ForgeResult<()> {
        transformer.copy_node(self).map(|_| ())
    }

    /// Lower this node into the transformer's target model
    pub fn refine(&self, transformer: &mut ModelTransformer) -> ForgeResult<bool> {
        self.kind.refine(self, transformer)
    }
}
