//! Whole-network predictor node: evaluates every layer in one compute and
//! refines into the per-layer primitive decomposition.

use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, Element, HostContext, ModelTransformer, Node, NodeKind,
    NodeRegistration, PortData, PortSpec, PortType,
};
use crate::neural::NeuralNetworkPredictor;
use crate::node_kind_common;
use crate::nodes::{input_slice, require_real};

use super::lowering::lower_layer;

/// Runs a whole feed-forward network.
///
/// Refines layer by layer into primitive nodes; a predictor with no layers
/// refines into a pass-through of its input elements.
#[derive(Debug, Clone)]
pub struct NeuralNetworkPredictorNode {
    element_type: PortType,
    predictor: NeuralNetworkPredictor,
}

impl NeuralNetworkPredictorNode {
    pub const KIND: &'static str = "NeuralNetworkPredictorNode";

    pub fn new(element_type: PortType, predictor: NeuralNetworkPredictor) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        Ok(Self {
            element_type,
            predictor,
        })
    }

    pub fn predictor(&self) -> &NeuralNetworkPredictor {
        &self.predictor
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let predictor =
            NeuralNetworkPredictor::read_from_archive(archive.get_object("predictor")?)?;
        Ok(Box::new(Self::new(archive.get_port_type("elementType")?, predictor)?))
    }

    pub(crate) fn registration() -> NodeRegistration {
        NodeRegistration::new(Self::KIND, Self::unarchive)
    }
}

impl NodeKind for NeuralNetworkPredictorNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.predictor.input_shape().size())]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.predictor.output_shape().size())]
    }

    fn is_primitive(&self) -> bool {
        false
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_real!(self.element_type, T => {
            let y = self.predictor.compute(input_slice::<T>(inputs, 0)?)?;
            Ok(vec![T::into_data(y)])
        })
    }

    fn refine(&self, node: &Node, transformer: &mut ModelTransformer) -> ForgeResult<bool> {
        let mut current = transformer.get_corresponding_inputs(&node.inputs()[0])?;
        for layer in self.predictor.layers() {
            current = lower_layer(transformer, layer, self.element_type, current)?;
        }
        transformer.map_node_output(node, 0, current)?;
        Ok(true)
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_object("predictor", self.predictor.write_to_archive());
    }

    node_kind_common!();
}
