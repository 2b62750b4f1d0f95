//! ModelBuilder: typed and generic node factories.
//!
//! Every entry point validates before the model is touched. Entry points that
//! add helper nodes (default triggers, reset constants) roll the model back to
//! its previous length when a later step fails.

use tracing::debug;

use crate::error::{ForgeResult, GraphForgeError};
use crate::invalid_argument;
use crate::math::signal::FilterScale;
use crate::math::{BinaryOperationType, UnaryOperationType};
use crate::neural::{
    ActivationType, Layer, NeuralNetworkPredictor, PoolingType, RegionDetectionParameters,
    WindowGeometry,
};
use crate::nodes::buffer::{BufferNode, ConcatenationNode};
use crate::nodes::constant::ConstantNode;
use crate::nodes::dsp::{
    DCTNode, DTWNode, FFTNode, FilterBankNode, HammingWindowNode, IIRFilterNode,
    VoiceActivityDetectorNode, VoiceActivityDetectorParameters,
};
use crate::nodes::host::{ClockNode, SinkNode, SourceNode};
use crate::nodes::io::{InputNode, OutputNode};
use crate::nodes::matrix::MatrixVectorMultiplyNode;
use crate::nodes::neural::{
    ActivationNode, ConvolutionNode, NeuralLayerNode, NeuralNetworkPredictorNode, PoolingNode,
    RegionDetectionNode, SoftmaxNode,
};
use crate::nodes::operations::{BinaryOperationNode, TypeCastNode, UnaryOperationNode};
use crate::nodes::recurrent::{RecurrentCell, RecurrentNode};
use crate::nodes::reorder::ReorderDataNode;

use super::archive::base_kind_name;
use super::args::NodeArgs;
use super::layout::PortMemoryLayout;
use super::model::Model;
use super::node::{templated_name, NodeId, NodeKind};
use super::port_elements::PortElements;
use super::port_type::{PortData, PortType};
use super::registry::NodeRegistry;
use super::shape::TensorShape;

/// Inputs of a recurrent cell besides the sample itself
#[derive(Debug, Clone, Copy)]
pub struct RecurrentWeights<'a> {
    pub input_weights: &'a PortElements,
    pub hidden_weights: &'a PortElements,
    pub input_bias: &'a PortElements,
    pub hidden_bias: &'a PortElements,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelBuilder<'r> {
    registry: &'r NodeRegistry,
}

impl Default for ModelBuilder<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder<'static> {
    /// Builder whose generic entry point knows every built-in kind
    pub fn new() -> Self {
        Self {
            registry: NodeRegistry::global(),
        }
    }
}

impl<'r> ModelBuilder<'r> {
    pub fn with_registry(registry: &'r NodeRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &'r NodeRegistry {
        self.registry
    }

    fn add(
        &self,
        model: &mut Model,
        kind: impl NodeKind,
        inputs: Vec<PortElements>,
    ) -> ForgeResult<NodeId> {
        let type_name = kind.type_name();
        let id = model.add_node(Box::new(kind), inputs)?;
        debug!(model = model.id().0, node = id.0, kind = %type_name, "node added");
        Ok(id)
    }

    /// Run `build`, dropping every node it added if it fails
    fn transaction<F>(&self, model: &mut Model, build: F) -> ForgeResult<NodeId>
    where
        F: FnOnce(&mut Model) -> ForgeResult<NodeId>,
    {
        let len = model.len();
        let result = build(model);
        if result.is_err() {
            model.truncate(len);
        }
        result
    }

    /// Generic entry point: `kind_name` is a registered base name with an
    /// optional template suffix such as `UnaryOperationNode<float>`.
    pub fn add_node(
        &self,
        model: &mut Model,
        kind_name: &str,
        args: &[&str],
    ) -> ForgeResult<NodeId> {
        let base = base_kind_name(kind_name);
        let schema = self
            .registry
            .get(base)
            .and_then(|registration| registration.schema)
            .ok_or_else(|| GraphForgeError::UnknownKind(kind_name.to_string()))?;
        let template = template_types(kind_name)?;
        let args = NodeArgs::new(base, schema.arguments, args)?;

        self.transaction(model, |model| {
            let id = (schema.add)(self, model, &args)?;
            if let Some(types) = &template {
                let node = model.node(id)?;
                let expected = templated_name(node.kind_name(), types);
                if node.type_name() != expected {
                    return Err(invalid_argument!(
                        "'{}' was requested but the arguments build '{}'",
                        kind_name,
                        node.type_name()
                    ));
                }
            }
            Ok(id)
        })
    }

    /// Re-target one named input of an existing node
    pub fn reset_input(
        &self,
        model: &mut Model,
        node: NodeId,
        port_name: &str,
        elements: PortElements,
    ) -> ForgeResult<()> {
        model.reset_input(node, port_name, elements)
    }

    // ========== Graph boundary ==========

    pub fn add_input_node(
        &self,
        model: &mut Model,
        shape: TensorShape,
        element_type: PortType,
    ) -> ForgeResult<NodeId> {
        shape.validate()?;
        self.add(model, InputNode::new(element_type, shape), Vec::new())
    }

    pub fn add_output_node(
        &self,
        model: &mut Model,
        shape: TensorShape,
        input: &PortElements,
    ) -> ForgeResult<NodeId> {
        check_size("output", input, shape.validate()?)?;
        self.add(model, OutputNode::new(input.element_type(), shape), vec![input.clone()])
    }

    pub fn add_constant_node(
        &self,
        model: &mut Model,
        values: &[f64],
        element_type: PortType,
    ) -> ForgeResult<NodeId> {
        self.add_constant_data_node(model, PortData::from_f64s(element_type, values))
    }

    pub fn add_constant_node_with_shape(
        &self,
        model: &mut Model,
        values: &[f64],
        shape: TensorShape,
        element_type: PortType,
    ) -> ForgeResult<NodeId> {
        shape.validate()?;
        let node = ConstantNode::new(PortData::from_f64s(element_type, values), shape)?;
        self.add(model, node, Vec::new())
    }

    /// Constant emitting `values` with their own element type
    pub fn add_constant_data_node(
        &self,
        model: &mut Model,
        values: PortData,
    ) -> ForgeResult<NodeId> {
        self.add(model, ConstantNode::vector(values), Vec::new())
    }

    // ========== Arithmetic ==========

    pub fn add_unary_operation_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        operation: UnaryOperationType,
    ) -> ForgeResult<NodeId> {
        let node = UnaryOperationNode::new(input.element_type(), input.size(), operation)?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_binary_operation_node(
        &self,
        model: &mut Model,
        input1: &PortElements,
        input2: &PortElements,
        operation: BinaryOperationType,
    ) -> ForgeResult<NodeId> {
        check_same_type(input1, input2)?;
        check_size("input2", input2, input1.size())?;
        let node = BinaryOperationNode::new(input1.element_type(), input1.size(), operation)?;
        self.add(model, node, vec![input1.clone(), input2.clone()])
    }

    /// Binary operation over strided, possibly padded, memory layouts
    pub fn add_binary_operation_node_with_layouts(
        &self,
        model: &mut Model,
        input1: &PortElements,
        input1_layout: PortMemoryLayout,
        input2: &PortElements,
        input2_layout: PortMemoryLayout,
        output_layout: PortMemoryLayout,
        operation: BinaryOperationType,
    ) -> ForgeResult<NodeId> {
        check_same_type(input1, input2)?;
        check_size("input1", input1, input1_layout.memory_size())?;
        check_size("input2", input2, input2_layout.memory_size())?;
        let node = BinaryOperationNode::with_layouts(
            input1.element_type(),
            operation,
            input1_layout,
            input2_layout,
            output_layout,
        )?;
        self.add(model, node, vec![input1.clone(), input2.clone()])
    }

    pub fn add_type_cast_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        output_type: PortType,
    ) -> ForgeResult<NodeId> {
        let node = TypeCastNode::new(input.element_type(), output_type, input.size());
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_matrix_vector_multiply_node(
        &self,
        model: &mut Model,
        matrix: &PortElements,
        rows: usize,
        columns: usize,
        vector: &PortElements,
    ) -> ForgeResult<NodeId> {
        check_same_type(matrix, vector)?;
        check_size("matrix", matrix, rows * columns)?;
        check_size("vector", vector, columns)?;
        let node = MatrixVectorMultiplyNode::new(matrix.element_type(), rows, columns)?;
        self.add(model, node, vec![matrix.clone(), vector.clone()])
    }

    // ========== Data movement ==========

    pub fn add_buffer_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        window_size: usize,
    ) -> ForgeResult<NodeId> {
        let node = BufferNode::new(input.element_type(), input.size(), window_size)?;
        self.add(model, node, vec![input.clone()])
    }

    /// Concatenate `inputs` into one output of `shape`
    pub fn add_concatenation_node(
        &self,
        model: &mut Model,
        shape: TensorShape,
        inputs: &[PortElements],
    ) -> ForgeResult<NodeId> {
        let input = PortElements::concat(inputs)?;
        check_size("concatenation", &input, shape.validate()?)?;
        let node = ConcatenationNode::new(input.element_type(), shape);
        self.add(model, node, vec![input])
    }

    pub fn add_reorder_data_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        input_layout: PortMemoryLayout,
        output_layout: PortMemoryLayout,
        order: Vec<usize>,
        padding_value: f64,
    ) -> ForgeResult<NodeId> {
        check_size("reorder", input, input_layout.memory_size())?;
        let node = ReorderDataNode::new(
            input.element_type(),
            input_layout,
            output_layout,
            order,
            padding_value,
        )?;
        self.add(model, node, vec![input.clone()])
    }

    // ========== Host runtime ==========

    pub fn add_clock_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        interval: f64,
        lag_threshold: f64,
        lag_notification_name: &str,
    ) -> ForgeResult<NodeId> {
        let node = ClockNode::new(interval, lag_threshold, lag_notification_name)?;
        self.add(model, node, vec![input.clone()])
    }

    /// With no trigger, or an empty one, the sink fires on every compute
    pub fn add_sink_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        shape: TensorShape,
        sink_function_name: &str,
        trigger: Option<&PortElements>,
    ) -> ForgeResult<NodeId> {
        check_size("sink", input, shape.validate()?)?;
        let node = SinkNode::new(input.element_type(), shape, sink_function_name)?;
        self.transaction(model, |model| {
            let trigger = match trigger {
                Some(trigger) if !trigger.is_empty() => trigger.clone(),
                _ => {
                    let always = self.add_constant_data_node(model, PortData::Boolean(vec![true]))?;
                    model.output(always)?
                }
            };
            self.add(model, node, vec![input.clone(), trigger])
        })
    }

    pub fn add_source_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        output_type: PortType,
        shape: TensorShape,
        source_function_name: &str,
    ) -> ForgeResult<NodeId> {
        shape.validate()?;
        let node = SourceNode::new(output_type, shape, source_function_name)?;
        self.add(model, node, vec![input.clone()])
    }

    // ========== Signal processing ==========

    pub fn add_dct_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        num_filters: usize,
    ) -> ForgeResult<NodeId> {
        let node = DCTNode::new(input.element_type(), input.size(), num_filters)?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_fft_node(&self, model: &mut Model, input: &PortElements) -> ForgeResult<NodeId> {
        let node = FFTNode::new(input.element_type(), input.size())?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_hamming_window_node(
        &self,
        model: &mut Model,
        input: &PortElements,
    ) -> ForgeResult<NodeId> {
        let node = HammingWindowNode::new(input.element_type(), input.size())?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_mel_filter_bank_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        sample_rate: f64,
        num_filters: usize,
        num_filters_to_use: usize,
    ) -> ForgeResult<NodeId> {
        self.add_filter_bank(
            model,
            FilterScale::Mel,
            input,
            sample_rate,
            num_filters,
            num_filters_to_use,
        )
    }

    pub fn add_linear_filter_bank_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        sample_rate: f64,
        num_filters: usize,
        num_filters_to_use: usize,
    ) -> ForgeResult<NodeId> {
        self.add_filter_bank(
            model,
            FilterScale::Linear,
            input,
            sample_rate,
            num_filters,
            num_filters_to_use,
        )
    }

    fn add_filter_bank(
        &self,
        model: &mut Model,
        scale: FilterScale,
        input: &PortElements,
        sample_rate: f64,
        num_filters: usize,
        num_filters_to_use: usize,
    ) -> ForgeResult<NodeId> {
        let node = FilterBankNode::new(
            input.element_type(),
            scale,
            input.size(),
            sample_rate,
            num_filters,
            num_filters_to_use,
        )?;
        self.add(model, node, vec![input.clone()])
    }

    /// `a` may be empty for a pure FIR filter
    pub fn add_iir_filter_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        b: Vec<f64>,
        a: Vec<f64>,
    ) -> ForgeResult<NodeId> {
        let node = IIRFilterNode::new(input.element_type(), input.size(), b, a)?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_dtw_node(
        &self,
        model: &mut Model,
        prototype: Vec<Vec<f64>>,
        input: &PortElements,
    ) -> ForgeResult<NodeId> {
        let node = DTWNode::new(input.element_type(), prototype)?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_voice_activity_detector_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        parameters: VoiceActivityDetectorParameters,
    ) -> ForgeResult<NodeId> {
        let node = VoiceActivityDetectorNode::new(input.element_type(), input.size(), parameters)?;
        self.add(model, node, vec![input.clone()])
    }

    // ========== Recurrent cells ==========

    #[allow(clippy::too_many_arguments)]
    pub fn add_rnn_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        reset: &PortElements,
        hidden_units: usize,
        input_weights: &PortElements,
        hidden_weights: &PortElements,
        input_bias: &PortElements,
        hidden_bias: &PortElements,
        activation: ActivationType,
    ) -> ForgeResult<NodeId> {
        let weights = RecurrentWeights {
            input_weights,
            hidden_weights,
            input_bias,
            hidden_bias,
        };
        self.add_recurrent_node(
            model,
            RecurrentCell::Rnn,
            input,
            reset,
            hidden_units,
            weights,
            activation,
            ActivationType::Sigmoid,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_gru_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        reset: &PortElements,
        hidden_units: usize,
        input_weights: &PortElements,
        hidden_weights: &PortElements,
        input_bias: &PortElements,
        hidden_bias: &PortElements,
        activation: ActivationType,
        recurrent_activation: ActivationType,
    ) -> ForgeResult<NodeId> {
        let weights = RecurrentWeights {
            input_weights,
            hidden_weights,
            input_bias,
            hidden_bias,
        };
        self.add_recurrent_node(
            model,
            RecurrentCell::Gru,
            input,
            reset,
            hidden_units,
            weights,
            activation,
            recurrent_activation,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_lstm_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        reset: &PortElements,
        hidden_units: usize,
        input_weights: &PortElements,
        hidden_weights: &PortElements,
        input_bias: &PortElements,
        hidden_bias: &PortElements,
        activation: ActivationType,
        recurrent_activation: ActivationType,
    ) -> ForgeResult<NodeId> {
        let weights = RecurrentWeights {
            input_weights,
            hidden_weights,
            input_bias,
            hidden_bias,
        };
        self.add_recurrent_node(
            model,
            RecurrentCell::Lstm,
            input,
            reset,
            hidden_units,
            weights,
            activation,
            recurrent_activation,
        )
    }

    /// An empty `reset` is bound to a constant `false`
    #[allow(clippy::too_many_arguments)]
    pub fn add_recurrent_node(
        &self,
        model: &mut Model,
        cell: RecurrentCell,
        input: &PortElements,
        reset: &PortElements,
        hidden_units: usize,
        weights: RecurrentWeights<'_>,
        activation: ActivationType,
        recurrent_activation: ActivationType,
    ) -> ForgeResult<NodeId> {
        for part in [
            weights.input_weights,
            weights.hidden_weights,
            weights.input_bias,
            weights.hidden_bias,
        ] {
            check_same_type(input, part)?;
        }
        let node = RecurrentNode::new(
            cell,
            input.element_type(),
            input.size(),
            hidden_units,
            activation,
            recurrent_activation,
        )?;
        let specs = node.input_ports();
        for (spec, part) in specs[2..].iter().zip([
            weights.input_weights,
            weights.hidden_weights,
            weights.input_bias,
            weights.hidden_bias,
        ]) {
            check_size(spec.name, part, spec.size)?;
        }

        self.transaction(model, |model| {
            let reset = if reset.is_empty() {
                let never = self.add_constant_data_node(model, PortData::Boolean(vec![false]))?;
                model.output(never)?
            } else {
                reset.clone()
            };
            self.add(
                model,
                node,
                vec![
                    input.clone(),
                    reset,
                    weights.input_weights.clone(),
                    weights.hidden_weights.clone(),
                    weights.input_bias.clone(),
                    weights.hidden_bias.clone(),
                ],
            )
        })
    }

    // ========== Neural ==========

    pub fn add_activation_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        activation: ActivationType,
    ) -> ForgeResult<NodeId> {
        let node = ActivationNode::new(input.element_type(), input.size(), activation)?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_softmax_node(&self, model: &mut Model, input: &PortElements) -> ForgeResult<NodeId> {
        let node = SoftmaxNode::new(input.element_type(), input.size())?;
        self.add(model, node, vec![input.clone()])
    }

    /// The filter count is derived from the size of `filters`
    #[allow(clippy::too_many_arguments)]
    pub fn add_convolution_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        input_shape: TensorShape,
        filters: &PortElements,
        receptive_field: usize,
        stride: usize,
        padding: usize,
        binarize_input: bool,
    ) -> ForgeResult<NodeId> {
        check_same_type(input, filters)?;
        check_size("convolution input", input, input_shape.validate()?)?;
        let volume = receptive_field
            .checked_mul(receptive_field)
            .and_then(|area| area.checked_mul(input_shape.channels))
            .unwrap_or(0);
        if volume == 0 || filters.size() % volume != 0 {
            return Err(invalid_argument!(
                "{} filter values do not split into filters of {}",
                filters.size(),
                volume
            ));
        }
        let geometry = WindowGeometry::new(
            input_shape,
            receptive_field,
            stride,
            padding,
            filters.size() / volume,
        )?;
        let node = ConvolutionNode::new(input.element_type(), geometry, binarize_input)?;
        self.add(model, node, vec![input.clone(), filters.clone()])
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_pooling_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        input_shape: TensorShape,
        pooling: PoolingType,
        pool_size: usize,
        stride: usize,
        padding: usize,
    ) -> ForgeResult<NodeId> {
        check_size("pooling input", input, input_shape.validate()?)?;
        let geometry =
            WindowGeometry::new(input_shape, pool_size, stride, padding, input_shape.channels)?;
        let node = PoolingNode::new(input.element_type(), geometry, pooling)?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_region_detection_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        parameters: RegionDetectionParameters,
    ) -> ForgeResult<NodeId> {
        check_size("region detection input", input, parameters.shape().size())?;
        let node = RegionDetectionNode::new(input.element_type(), parameters)?;
        self.add(model, node, vec![input.clone()])
    }

    pub fn add_neural_network_predictor_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        predictor: NeuralNetworkPredictor,
    ) -> ForgeResult<NodeId> {
        check_size("predictor input", input, predictor.input_shape().size())?;
        let node = NeuralNetworkPredictorNode::new(input.element_type(), predictor)?;
        self.add(model, node, vec![input.clone()])
    }

    /// Per-layer node; prefer
    /// [`add_neural_network_predictor_node`](Self::add_neural_network_predictor_node)
    pub fn add_neural_layer_node(
        &self,
        model: &mut Model,
        input: &PortElements,
        layer: Layer,
    ) -> ForgeResult<NodeId> {
        check_size("layer input", input, layer.input_shape().size())?;
        let node = NeuralLayerNode::new(input.element_type(), layer)?;
        self.add(model, node, vec![input.clone()])
    }
}

fn check_size(what: &str, elements: &PortElements, expected: usize) -> ForgeResult<()> {
    if elements.size() != expected {
        return Err(invalid_argument!(
            "{} has {} elements, expected {}",
            what,
            elements.size(),
            expected
        ));
    }
    Ok(())
}

fn check_same_type(a: &PortElements, b: &PortElements) -> ForgeResult<()> {
    if a.element_type() != b.element_type() {
        return Err(GraphForgeError::TypeMismatch {
            expected: a.element_type(),
            actual: b.element_type(),
        });
    }
    Ok(())
}

/// Element types named by a `Kind<t1,t2>` suffix, if any
fn template_types(kind_name: &str) -> ForgeResult<Option<Vec<PortType>>> {
    let Some((_, rest)) = kind_name.split_once('<') else {
        return Ok(None);
    };
    let inner = rest.strip_suffix('>').ok_or_else(|| {
        GraphForgeError::arg_parse("kind", kind_name, "template suffix is not closed")
    })?;
    inner
        .split(',')
        .map(|t| t.trim().parse::<PortType>())
        .collect::<ForgeResult<Vec<_>>>()
        .map(Some)
}
