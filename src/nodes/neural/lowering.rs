//! Lowering of one neural layer into primitive nodes.
//!
//! Shared by the predictor node and the per-layer nodes so both refine into
//! the same decomposition.

use crate::error::ForgeResult;
use crate::graph::{ModelTransformer, NodeKind, PortData, PortElements, PortType};
use crate::internal_error;
use crate::math::BinaryOperationType;
use crate::neural::{ActivationType, Layer, LayerKind};
use crate::nodes::constant::ConstantNode;
use crate::nodes::matrix::MatrixVectorMultiplyNode;
use crate::nodes::operations::BinaryOperationNode;

use super::primitives::{
    ActivationNode, ConvolutionNode, PoolingNode, RegionDetectionNode, SoftmaxNode,
};

fn emit(
    transformer: &mut ModelTransformer,
    kind: Box<dyn NodeKind>,
    inputs: Vec<PortElements>,
) -> ForgeResult<PortElements> {
    let id = transformer.add_node(kind, inputs)?;
    transformer.output(id)
}

fn constant(
    transformer: &mut ModelTransformer,
    element_type: PortType,
    values: &[f64],
) -> ForgeResult<PortElements> {
    let node = ConstantNode::vector(PortData::from_f64s(element_type, values));
    emit(transformer, Box::new(node), Vec::new())
}

/// `input op constant(values)`, element by element
fn with_constant(
    transformer: &mut ModelTransformer,
    element_type: PortType,
    operation: BinaryOperationType,
    input: PortElements,
    values: &[f64],
) -> ForgeResult<PortElements> {
    let operand = constant(transformer, element_type, values)?;
    let node = BinaryOperationNode::new(element_type, values.len(), operation)?;
    emit(transformer, Box::new(node), vec![input, operand])
}

/// Emit the primitive decomposition of `layer` reading from `input` and
/// return the elements holding its output.
pub(crate) fn lower_layer(
    transformer: &mut ModelTransformer,
    layer: &Layer,
    element_type: PortType,
    input: PortElements,
) -> ForgeResult<PortElements> {
    let size = layer.output_shape().size();
    match layer.kind() {
        LayerKind::FullyConnected { weights, bias } => {
            let rows = size;
            let columns = layer.input_shape().size();
            let matrix = constant(transformer, element_type, weights)?;
            let product = emit(
                transformer,
                Box::new(MatrixVectorMultiplyNode::new(element_type, rows, columns)?),
                vec![matrix, input],
            )?;
            match bias {
                Some(bias) => with_constant(
                    transformer,
                    element_type,
                    BinaryOperationType::Add,
                    product,
                    bias,
                ),
                None => Ok(product),
            }
        }
        LayerKind::Bias(bias) => with_constant(
            transformer,
            element_type,
            BinaryOperationType::Add,
            input,
            &layer.expand_per_channel(bias),
        ),
        LayerKind::Scaling(scale) => with_constant(
            transformer,
            element_type,
            BinaryOperationType::CoordinatewiseMultiply,
            input,
            &layer.expand_per_channel(scale),
        ),
        LayerKind::BatchNormalization { .. } => {
            let (scale, shift) = layer
                .batch_norm_coefficients()
                .ok_or_else(|| internal_error!("batch normalization without coefficients"))?;
            let scaled = with_constant(
                transformer,
                element_type,
                BinaryOperationType::CoordinatewiseMultiply,
                input,
                &scale,
            )?;
            with_constant(
                transformer,
                element_type,
                BinaryOperationType::Add,
                scaled,
                &shift,
            )
        }
        LayerKind::Activation(ActivationType::Softmax) | LayerKind::Softmax => emit(
            transformer,
            Box::new(SoftmaxNode::new(element_type, size)?),
            vec![input],
        ),
        LayerKind::Activation(activation) => emit(
            transformer,
            Box::new(ActivationNode::new(element_type, size, *activation)?),
            vec![input],
        ),
        LayerKind::Convolutional { .. } | LayerKind::BinaryConvolutional { .. } => {
            let filters = layer
                .effective_filters()
                .ok_or_else(|| internal_error!("convolution without filters"))?;
            let binarize = matches!(layer.kind(), LayerKind::BinaryConvolutional { .. });
            let filters = constant(transformer, element_type, &filters)?;
            emit(
                transformer,
                Box::new(ConvolutionNode::new(element_type, layer.geometry()?, binarize)?),
                vec![input, filters],
            )
        }
        LayerKind::Pooling { pooling, .. } => emit(
            transformer,
            Box::new(PoolingNode::new(element_type, layer.geometry()?, *pooling)?),
            vec![input],
        ),
        LayerKind::RegionDetection(parameters) => emit(
            transformer,
            Box::new(RegionDetectionNode::new(element_type, *parameters)?),
            vec![input],
        ),
    }
}
