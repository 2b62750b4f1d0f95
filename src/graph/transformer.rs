//! Model transformer: copy and refinement passes.
//!
//! A pass walks a source model in topological order and asks each node to
//! copy or refine itself into a fresh target model. The correspondence maps
//! every source output port to the target elements that now carry its values.
//!
//! # Passes
//!
//! - **Copy**: structural clone with fresh identities
//! - **Refine**: lowers composite kinds one level; repeated until every node
//!   is primitive or a pass lowers nothing

use std::collections::HashMap;

use tracing::{debug, info, trace, warn};

use crate::config::TransformerConfig;
use crate::error::{ForgeResult, GraphForgeError};
use crate::internal_error;

use super::model::Model;
use super::node::{ModelId, Node, NodeId, NodeKind};
use super::port::{InputPort, OutputPortRef};
use super::port_elements::{PortElements, PortRange};

/// Source output port, keyed without its model id
type PortKey = (NodeId, usize);

type Correspondence = HashMap<PortKey, PortElements>;

#[derive(Debug, Clone, Copy)]
enum PassKind {
    Copy,
    Refine,
}

/// Counters for the last `copy_model` or `refine_model` run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformStats {
    pub passes: usize,
    pub source_nodes: usize,
    pub target_nodes: usize,
    pub nodes_refined: usize,
}

#[derive(Debug)]
pub struct ModelTransformer {
    config: TransformerConfig,
    /// Model being written by the current pass
    target: Model,
    /// Model being read by the current pass
    source: Option<ModelId>,
    /// Source of the whole run, for `get_corresponding_outputs`
    origin: Option<ModelId>,
    correspondence: Correspondence,
    /// Origin ports to final-model elements, composed across passes
    composed: Correspondence,
    stats: TransformStats,
}

impl Default for ModelTransformer {
    fn default() -> Self {
        Self::new(TransformerConfig::default())
    }
}

impl ModelTransformer {
    pub fn new(config: TransformerConfig) -> Self {
        Self {
            config,
            target: Model::new(),
            source: None,
            origin: None,
            correspondence: HashMap::new(),
            composed: HashMap::new(),
            stats: TransformStats::default(),
        }
    }

    pub fn config(&self) -> &TransformerConfig {
        &self.config
    }

    pub fn stats(&self) -> TransformStats {
        self.stats
    }

    /// Model under construction by the current pass
    pub fn target(&self) -> &Model {
        &self.target
    }

    // ========== Node-facing API ==========

    /// Translate the elements bound to `input` into the target model
    pub fn get_corresponding_inputs(&self, input: &InputPort) -> ForgeResult<PortElements> {
        let source = self
            .source
            .ok_or_else(|| internal_error!("no transformation pass is running"))?;
        translate(&self.correspondence, source, input.elements())
    }

    /// Add a node to the target model
    pub fn add_node(
        &mut self,
        kind: Box<dyn NodeKind>,
        inputs: Vec<PortElements>,
    ) -> ForgeResult<NodeId> {
        self.target.add_node(kind, inputs)
    }

    /// Every element of the first output port of target node `id`
    pub fn output(&self, id: NodeId) -> ForgeResult<PortElements> {
        self.target.output(id)
    }

    /// Record that output `port` of source `node` is now carried by `elements`
    pub fn map_node_output(
        &mut self,
        node: &Node,
        port: usize,
        elements: PortElements,
    ) -> ForgeResult<()> {
        let output = node.outputs().get(port).ok_or(GraphForgeError::OutOfRange {
            index: port,
            size: node.outputs().len(),
        })?;
        if elements.element_type() != output.element_type() {
            return Err(GraphForgeError::TypeMismatch {
                expected: output.element_type(),
                actual: elements.element_type(),
            });
        }
        if elements.size() != output.size() {
            return Err(GraphForgeError::SizeMismatch {
                expected: output.size(),
                actual: elements.size(),
            });
        }
        if let Some(range) = elements.ranges().iter().find(|r| r.port.model != self.target.id()) {
            return Err(GraphForgeError::CrossModel {
                expected: self.target.id().0,
                found: range.port.model.0,
            });
        }
        self.correspondence.insert((node.id(), port), elements);
        Ok(())
    }

    /// Clone `node` into the target with translated inputs; maps every output
    pub fn copy_node(&mut self, node: &Node) -> ForgeResult<NodeId> {
        let inputs = node
            .inputs()
            .iter()
            .map(|input| self.get_corresponding_inputs(input))
            .collect::<ForgeResult<Vec<_>>>()?;
        let id = self.target.add_node(node.kind().clone_kind(), inputs)?;
        let target_id = self.target.id();
        for (index, output) in node.outputs().iter().enumerate() {
            let elements = PortElements::from_range(
                output.element_type(),
                PortRange::new(OutputPortRef::new(target_id, id, index), 0, output.size()),
            );
            self.correspondence.insert((node.id(), index), elements);
        }
        Ok(id)
    }

    /// Translate elements of the model given to the last `copy_model` or
    /// `refine_model` into the model it returned
    pub fn get_corresponding_outputs(&self, elements: &PortElements) -> ForgeResult<PortElements> {
        let origin = self
            .origin
            .ok_or_else(|| internal_error!("no model has been transformed yet"))?;
        translate(&self.composed, origin, elements)
    }

    // ========== Drivers ==========

    /// Structural clone of `source` with fresh identities
    pub fn copy_model(&mut self, source: &Model) -> ForgeResult<Model> {
        self.origin = None;
        self.stats = TransformStats {
            source_nodes: source.len(),
            ..TransformStats::default()
        };
        let (model, _) = self.run_pass(source, PassKind::Copy)?;
        self.composed = std::mem::take(&mut self.correspondence);
        self.origin = Some(source.id());
        self.stats.passes = 1;
        self.stats.target_nodes = model.len();
        Ok(model)
    }

    /// Refine until every node is primitive or a pass lowers nothing.
    ///
    /// Fails with `RefinementDivergence` when the configured pass cap is
    /// reached first.
    pub fn refine_model(&mut self, source: &Model) -> ForgeResult<Model> {
        self.origin = None;
        self.stats = TransformStats {
            source_nodes: source.len(),
            ..TransformStats::default()
        };
        let cap = self.config.max_refine_iterations.max(1);

        let (mut current, mut refined) = self.run_pass(source, PassKind::Refine)?;
        let mut composed = std::mem::take(&mut self.correspondence);
        let mut passes = 1;

        while refined > 0 && !current.nodes().all(Node::is_primitive) {
            if passes >= cap {
                warn!(
                    passes,
                    nodes = current.len(),
                    "refinement did not reach a fixed point"
                );
                return Err(GraphForgeError::RefinementDivergence { iterations: passes });
            }
            let (next, count) = self.run_pass(&current, PassKind::Refine)?;
            let step = std::mem::take(&mut self.correspondence);
            composed = compose(&composed, &step, current.id())?;
            current = next;
            refined = count;
            passes += 1;
        }

        self.composed = composed;
        self.origin = Some(source.id());
        self.stats.passes = passes;
        self.stats.target_nodes = current.len();
        info!(
            passes,
            source_nodes = source.len(),
            target_nodes = current.len(),
            refined = self.stats.nodes_refined,
            "refinement complete"
        );
        Ok(current)
    }

    /// One topological walk over `source`; returns the successor and the
    /// number of nodes that lowered themselves
    fn run_pass(&mut self, source: &Model, kind: PassKind) -> ForgeResult<(Model, usize)> {
        self.target = Model::new();
        self.source = Some(source.id());
        self.correspondence.clear();

        let result = self.walk(source, kind);
        self.source = None;
        let target = std::mem::take(&mut self.target);
        let refined = match result {
            Ok(refined) => refined,
            Err(e) => {
                self.correspondence.clear();
                return Err(e);
            }
        };

        if self.config.verify_each_pass {
            target.verify()?;
        }
        debug!(
            pass = ?kind,
            source_nodes = source.len(),
            target_nodes = target.len(),
            refined,
            "pass complete"
        );
        self.stats.nodes_refined += refined;
        Ok((target, refined))
    }

    fn walk(&mut self, source: &Model, kind: PassKind) -> ForgeResult<usize> {
        let mut refined = 0;
        for id in source.topological_order() {
            let node = source.node(id)?;
            match kind {
                PassKind::Copy => node.copy(self)?,
                PassKind::Refine => {
                    if node.refine(self)? {
                        trace!(node = id.0, kind = %node.type_name(), "node refined");
                        refined += 1;
                    }
                }
            }
            for port in 0..node.outputs().len() {
                if !self.correspondence.contains_key(&(id, port)) {
                    return Err(internal_error!(
                        "{} (node {}) did not map output {}",
                        node.type_name(),
                        id,
                        port
                    ));
                }
            }
        }
        Ok(refined)
    }
}

/// Rewrite `elements` of model `source` through `map`
fn translate(
    map: &Correspondence,
    source: ModelId,
    elements: &PortElements,
) -> ForgeResult<PortElements> {
    let mut result = PortElements::empty(elements.element_type());
    for range in elements.ranges() {
        if range.port.model != source {
            return Err(GraphForgeError::CrossModel {
                expected: source.0,
                found: range.port.model.0,
            });
        }
        let mapped = map.get(&(range.port.node, range.port.port)).ok_or_else(|| {
            internal_error!(
                "output {} of node {} has no corresponding elements",
                range.port.port,
                range.port.node
            )
        })?;
        result.append(&mapped.slice(range.start, range.count)?)?;
    }
    Ok(result)
}

/// `first` followed by `second`, where `second` reads model `middle`
fn compose(
    first: &Correspondence,
    second: &Correspondence,
    middle: ModelId,
) -> ForgeResult<Correspondence> {
    first
        .iter()
        .map(|(key, elements)| Ok((*key, translate(second, middle, elements)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{
        ArchiveObject, HostContext, ModelBuilder, PortData, PortSpec, PortType, TensorShape,
    };
    use crate::math::UnaryOperationType;
    use crate::neural::{Layer, NeuralNetworkPredictor};

    fn chain() -> (Model, NodeId, NodeId) {
        let builder = ModelBuilder::new();
        let mut model = Model::new();
        let input = builder
            .add_input_node(&mut model, TensorShape::vector(4), PortType::Float64)
            .unwrap();
        let input_out = model.output(input).unwrap();
        let abs = builder
            .add_unary_operation_node(&mut model, &input_out, UnaryOperationType::Square)
            .unwrap();
        (model, input, abs)
    }

    #[test]
    fn test_copy_model_keeps_structure() {
        let (model, _, abs) = chain();
        let mut transformer = ModelTransformer::default();
        let copy = transformer.copy_model(&model).unwrap();
        assert_ne!(copy.id(), model.id());
        assert_eq!(copy.structural_fingerprint(), model.structural_fingerprint());

        let old = model.output(abs).unwrap();
        let new = transformer.get_corresponding_outputs(&old).unwrap();
        assert_eq!(new.size(), 4);
        assert_eq!(new.ranges()[0].port.model, copy.id());
        assert_eq!(transformer.stats().passes, 1);
    }

    #[test]
    fn test_translate_slices() {
        let (model, input, _) = chain();
        let mut transformer = ModelTransformer::default();
        let copy = transformer.copy_model(&model).unwrap();
        let slice = model.output(input).unwrap().slice(1, 2).unwrap();
        let new = transformer.get_corresponding_outputs(&slice).unwrap();
        assert_eq!(new.ranges()[0].start, 1);
        assert_eq!(new.size(), 2);
        assert_eq!(new.ranges()[0].port.model, copy.id());
    }

    #[test]
    fn test_foreign_elements_rejected() {
        let (model, _, _) = chain();
        let (other, other_input, _) = chain();
        let mut transformer = ModelTransformer::default();
        transformer.copy_model(&model).unwrap();
        let foreign = other.output(other_input).unwrap();
        assert!(matches!(
            transformer.get_corresponding_outputs(&foreign),
            Err(GraphForgeError::CrossModel { .. })
        ));
    }

    #[test]
    fn test_refine_primitive_model_is_one_pass() {
        let (model, _, _) = chain();
        let mut transformer = ModelTransformer::default();
        let refined = transformer.refine_model(&model).unwrap();
        assert_eq!(refined.structural_fingerprint(), model.structural_fingerprint());
        assert_eq!(transformer.stats().passes, 1);
        assert_eq!(transformer.stats().nodes_refined, 0);
    }

    /// Composite kind that refines into another copy of itself
    #[derive(Debug, Clone)]
    struct Forever;

    impl NodeKind for Forever {
        fn kind_name(&self) -> &'static str {
            "ForeverNode"
        }

        fn input_ports(&self) -> Vec<PortSpec> {
            Vec::new()
        }

        fn output_ports(&self) -> Vec<PortSpec> {
            vec![PortSpec::output(PortType::Float64, 1)]
        }

        fn is_primitive(&self) -> bool {
            false
        }

        fn compute(
            &mut self,
            _inputs: &[PortData],
            _host: &mut HostContext,
        ) -> ForgeResult<Vec<PortData>> {
            Ok(vec![PortData::Float64(vec![0.0])])
        }

        fn refine(&self, node: &Node, transformer: &mut ModelTransformer) -> ForgeResult<bool> {
            let id = transformer.add_node(Box::new(Forever), Vec::new())?;
            let output = transformer.output(id)?;
            transformer.map_node_output(node, 0, output)?;
            Ok(true)
        }

        fn write_to_archive(&self, _archive: &mut ArchiveObject) {}

        crate::node_kind_common!();
    }

    #[test]
    fn test_refine_divergence() {
        let mut model = Model::new();
        model.add_node(Box::new(Forever), Vec::new()).unwrap();
        let mut transformer =
            ModelTransformer::new(TransformerConfig::default().with_max_refine_iterations(3));
        let err = transformer.refine_model(&model).unwrap_err();
        assert!(matches!(err, GraphForgeError::RefinementDivergence { iterations: 3 }));
    }

    #[test]
    fn test_unmapped_output_is_internal_error() {
        #[derive(Debug, Clone)]
        struct Forgetful;

        impl NodeKind for Forgetful {
            fn kind_name(&self) -> &'static str {
                "ForgetfulNode"
            }
            fn input_ports(&self) -> Vec<PortSpec> {
                Vec::new()
            }
            fn output_ports(&self) -> Vec<PortSpec> {
                vec![PortSpec::output(PortType::Float64, 1)]
            }
            fn compute(
                &mut self,
                _inputs: &[PortData],
                _host: &mut HostContext,
            ) -> ForgeResult<Vec<PortData>> {
                Ok(vec![PortData::Float64(vec![0.0])])
            }
            fn refine(
                &self,
                _node: &Node,
                _transformer: &mut ModelTransformer,
            ) -> ForgeResult<bool> {
                Ok(false)
            }
            fn write_to_archive(&self, _archive: &mut ArchiveObject) {}
            crate::node_kind_common!();
        }

        let mut model = Model::new();
        model.add_node(Box::new(Forgetful), Vec::new()).unwrap();
        let err = ModelTransformer::default().refine_model(&model).unwrap_err();
        assert!(err.is_internal_error());
    }

    #[test]
    fn test_refine_predictor_lowers_everything() {
        let builder = ModelBuilder::new();
        let mut model = Model::new();
        let input = builder
            .add_input_node(&mut model, TensorShape::vector(2), PortType::Float64)
            .unwrap();
        let input = model.output(input).unwrap();
        let predictor = NeuralNetworkPredictor::new(
            TensorShape::vector(2),
            vec![Layer::bias(TensorShape::vector(2), vec![1.0, -1.0]).unwrap()],
        )
        .unwrap();
        let node = builder
            .add_neural_network_predictor_node(&mut model, &input, predictor)
            .unwrap();

        let mut transformer =
            ModelTransformer::new(TransformerConfig::default().with_verify_each_pass(true));
        let refined = transformer.refine_model(&model).unwrap();
        assert!(refined.nodes().all(Node::is_primitive));
        assert!(refined.len() > model.len());
        let out = transformer
            .get_corresponding_outputs(&model.output(node).unwrap())
            .unwrap();
        assert_eq!(out.size(), 2);
    }
}
