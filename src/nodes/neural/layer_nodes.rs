//! Per-layer nodes, kept so archives that contain them still load.
//!
//! Each wraps one [`Layer`] and refines into the same primitives as the
//! predictor node. They are never produced by refinement.

use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, Element, HostContext, ModelTransformer, Node, NodeKind,
    NodeRegistration, PortData, PortSpec, PortType,
};
use crate::neural::Layer;
use crate::node_kind_common;
use crate::nodes::{input_slice, require_real};

use super::lowering::lower_layer;

pub const LAYER_NODE_KINDS: [&str; 10] = [
    "ActivationLayerNode",
    "BatchNormalizationLayerNode",
    "BiasLayerNode",
    "BinaryConvolutionalLayerNode",
    "ConvolutionalLayerNode",
    "FullyConnectedLayerNode",
    "PoolingLayerNode",
    "RegionDetectionLayerNode",
    "ScalingLayerNode",
    "SoftmaxLayerNode",
];

#[derive(Debug, Clone)]
pub struct NeuralLayerNode {
    element_type: PortType,
    layer: Layer,
}

impl NeuralLayerNode {
    pub fn new(element_type: PortType, layer: Layer) -> ForgeResult<Self> {
        require_real(layer.kind().node_name(), element_type)?;
        Ok(Self {
            element_type,
            layer,
        })
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let layer = Layer::read_from_archive(archive.get_object("layer")?)?;
        Ok(Box::new(Self::new(archive.get_port_type("elementType")?, layer)?))
    }

    pub(crate) fn registrations() -> Vec<NodeRegistration> {
        LAYER_NODE_KINDS
            .iter()
            .map(|&kind| NodeRegistration::new(kind, Self::unarchive))
            .collect()
    }
}

impl NodeKind for NeuralLayerNode {
    fn kind_name(&self) -> &'static str {
        self.layer.kind().node_name()
    }

    fn type_name(&self) -> String {
        templated_name(self.kind_name(), &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.layer.input_shape().size())]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.layer.output_shape().size())]
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
            let y = self.layer.compute(input_slice::<T>(inputs, 0)?)?;
            Ok(vec![T::into_data(y)])
        })
    }

    fn refine(&self, node: &Node, transformer: &mut ModelTransformer) -> ForgeResult<bool> {
        let input = transformer.get_corresponding_inputs(&node.inputs()[0])?;
        let output = lower_layer(transformer, &self.layer, self.element_type, input)?;
        transformer.map_node_output(node, 0, output)?;
        Ok(true)
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_object("layer", self.layer.write_to_archive());
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::TensorShape;
    use crate::neural::LayerKind;

    #[test]
    fn test_kind_names_cover_every_layer() {
        let shape = TensorShape::vector(2);
        let layers = [
            Layer::bias(shape, vec![1.0, 2.0]).unwrap(),
            Layer::softmax(shape).unwrap(),
        ];
        for layer in layers {
            assert!(LAYER_NODE_KINDS.contains(&layer.kind().node_name()));
        }
        assert_eq!(LAYER_NODE_KINDS.len(), 10);
    }

    #[test]
    fn test_compute_matches_layer() {
        let layer = Layer::scaling(TensorShape::new(1, 2, 2), vec![2.0, -1.0]).unwrap();
        let mut node = NeuralLayerNode::new(PortType::Float64, layer).unwrap();
        assert_eq!(node.kind_name(), "ScalingLayerNode");
        assert!(matches!(node.layer().kind(), LayerKind::Scaling(_)));
        let out = node
            .compute(&[PortData::from(vec![1.0, 1.0, 3.0, 3.0])], &mut HostContext::new())
            .unwrap();
        assert_eq!(out[0].to_f64_vec(), vec![2.0, -1.0, 6.0, -3.0]);
    }
}
