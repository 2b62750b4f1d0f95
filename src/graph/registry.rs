//! Node-kind registry: stable type names mapped to unarchive and generic
//! AddNode entry points.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::ForgeResult;

use super::archive::ArchiveObject;
use super::args::{ArgSpec, NodeArgs};
use super::builder::ModelBuilder;
use super::model::Model;
use super::node::{NodeId, NodeKind};

/// Rebuild a kind from its archived construction parameters
pub type UnarchiveFn = fn(&ArchiveObject) -> ForgeResult<Box<dyn NodeKind>>;

/// Generic AddNode entry point: parse `args` and call the typed builder method
pub type AddNodeFn = fn(&ModelBuilder<'_>, &mut Model, &NodeArgs<'_>) -> ForgeResult<NodeId>;

/// Argument schema and entry point for string-constructible kinds
#[derive(Debug, Clone, Copy)]
pub struct AddNodeSchema {
    pub arguments: &'static [ArgSpec],
    pub add: AddNodeFn,
}

#[derive(Debug, Clone, Copy)]
pub struct NodeRegistration {
    pub kind_name: &'static str,
    pub unarchive: UnarchiveFn,
    /// `None` for kinds that carry descriptors and are not string-constructible
    pub schema: Option<AddNodeSchema>,
}

impl NodeRegistration {
    pub fn new(kind_name: &'static str, unarchive: UnarchiveFn) -> Self {
        Self {
            kind_name,
            unarchive,
            schema: None,
        }
    }

    pub fn with_schema(mut self, arguments: &'static [ArgSpec], add: AddNodeFn) -> Self {
        self.schema = Some(AddNodeSchema { arguments, add });
        self
    }
}

static GLOBAL_REGISTRY: Lazy<NodeRegistry> = Lazy::new(NodeRegistry::with_builtin_kinds);

#[derive(Debug, Default, Clone)]
pub struct NodeRegistry {
    entries: HashMap<&'static str, NodeRegistration>,
}

impl NodeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every node kind in the library
    pub fn with_builtin_kinds() -> Self {
        let mut registry = Self::new();
        for registration in crate::nodes::builtin_registrations() {
            registry.register(registration);
        }
        registry
    }

    /// Shared registry of built-in kinds
    pub fn global() -> &'static NodeRegistry {
        &GLOBAL_REGISTRY
    }

    /// Add or replace a registration
    pub fn register(&mut self, registration: NodeRegistration) -> &mut Self {
        self.entries.insert(registration.kind_name, registration);
        self
    }

    pub fn get(&self, kind_name: &str) -> Option<&NodeRegistration> {
        self.entries.get(kind_name)
    }

    pub fn contains(&self, kind_name: &str) -> bool {
        self.entries.contains_key(kind_name)
    }

    /// Registered names, sorted
    pub fn kind_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.entries.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_registered() {
        let registry = NodeRegistry::global();
        for name in [
            "InputNode",
            "OutputNode",
            "ConstantNode",
            "UnaryOperationNode",
            "BinaryOperationNode",
            "ClockNode",
            "SinkNode",
            "LSTMNode",
            "FullyConnectedLayerNode",
            "NeuralNetworkPredictorNode",
        ] {
            assert!(registry.contains(name), "{} not registered", name);
        }
        assert!(!registry.contains("TeleportNode"));
    }

    #[test]
    fn test_layer_kinds_have_no_schema() {
        let registry = NodeRegistry::global();
        let fc = registry.get("FullyConnectedLayerNode").unwrap();
        assert!(fc.schema.is_none());
        let unary = registry.get("UnaryOperationNode").unwrap();
        assert!(unary.schema.is_some());
    }

    #[test]
    fn test_kind_names_sorted() {
        let names = NodeRegistry::global().kind_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
