//! Spectral transforms and windows: DCT, FFT and Hamming.

use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder,
    ModelTransformer, Node, NodeArgs, NodeId, NodeKind, NodeRegistration, PortData, PortSpec,
    PortType,
};
use crate::math::linalg::matrix_vector_multiply;
use crate::math::signal::{dct_matrix, fft_magnitude, hamming_window};
use crate::math::{cast_slice, BinaryOperationType};
use crate::nodes::constant::ConstantNode;
use crate::nodes::matrix::MatrixVectorMultiplyNode;
use crate::nodes::operations::BinaryOperationNode;
use crate::nodes::{input_data, input_slice, require_real};
use crate::{invalid_argument, node_kind_common};

/// Orthonormal DCT-II keeping the first `num_filters` coefficients.
///
/// Refines into a constant basis matrix and a matrix-vector multiply.
#[derive(Debug, Clone)]
pub struct DCTNode {
    element_type: PortType,
    window_size: usize,
    num_filters: usize,
}

impl DCTNode {
    pub const KIND: &'static str = "DCTNode";

    pub fn new(
        element_type: PortType,
        window_size: usize,
        num_filters: usize,
    ) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        if num_filters == 0 || num_filters > window_size {
            return Err(invalid_argument!(
                "DCT needs between 1 and {} filters, got {}",
                window_size,
                num_filters
            ));
        }
        Ok(Self {
            element_type,
            window_size,
            num_filters,
        })
    }

    pub fn num_filters(&self) -> usize {
        self.num_filters
    }

    fn basis(&self) -> Vec<f64> {
        dct_matrix(self.num_filters, self.window_size)
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("windowSize")?,
            archive.get_usize("numFilters")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_dct_node(model, &input, args.parse(1)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input"), ArgSpec::required("numFilters")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for DCTNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.window_size)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.num_filters)]
    }

    fn is_primitive(&self) -> bool {
        false
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let basis = self.basis();
        dispatch_real!(self.element_type, T => {
            let basis = cast_slice::<T>(&basis);
            let input = input_slice::<T>(inputs, 0)?;
            let y = matrix_vector_multiply(
                self.num_filters,
                self.window_size,
                &basis,
                self.window_size,
                input,
                1,
            );
            Ok(vec![T::into_data(y)])
        })
    }

    fn refine(&self, node: &Node, transformer: &mut ModelTransformer) -> ForgeResult<bool> {
        let input = transformer.get_corresponding_inputs(&node.inputs()[0])?;
        let basis = transformer.add_node(
            Box::new(ConstantNode::vector(PortData::from_f64s(
                self.element_type,
                &self.basis(),
            ))),
            Vec::new(),
        )?;
        let basis = transformer.output(basis)?;
        let product = transformer.add_node(
            Box::new(MatrixVectorMultiplyNode::new(
                self.element_type,
                self.num_filters,
                self.window_size,
            )?),
            vec![basis, input],
        )?;
        let product = transformer.output(product)?;
        transformer.map_node_output(node, 0, product)?;
        Ok(true)
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("windowSize", self.window_size)
            .set_usize("numFilters", self.num_filters);
    }

    node_kind_common!();
}

/// Magnitude spectrum of a power-of-two length frame
#[derive(Debug, Clone)]
pub struct FFTNode {
    element_type: PortType,
    size: usize,
}

impl FFTNode {
    pub const KIND: &'static str = "FFTNode";

    pub fn new(element_type: PortType, size: usize) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        if size == 0 || !size.is_power_of_two() {
            return Err(invalid_argument!("FFT size must be a power of two, got {}", size));
        }
        Ok(Self { element_type, size })
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("size")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_fft_node(model, &input)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for FFTNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.size)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.size)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let signal = input_data(inputs, 0)?.to_f64_vec();
        let magnitude = fft_magnitude(&signal)?;
        Ok(vec![PortData::from_f64s(self.element_type, &magnitude)])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("size", self.size);
    }

    node_kind_common!();
}

/// Multiplies a frame by a symmetric Hamming window.
///
/// Refines into a constant window and a coordinate-wise multiply.
#[derive(Debug, Clone)]
pub struct HammingWindowNode {
    element_type: PortType,
    size: usize,
}

impl HammingWindowNode {
    pub const KIND: &'static str = "HammingWindowNode";

    pub fn new(element_type: PortType, size: usize) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        if size == 0 {
            return Err(invalid_argument!("Hamming window must not be empty"));
        }
        Ok(Self { element_type, size })
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("size")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_hamming_window_node(model, &input)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for HammingWindowNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.size)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.size)]
    }

    fn is_primitive(&self) -> bool {
        false
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let window = hamming_window(self.size);
        dispatch_real!(self.element_type, T => {
            let window = cast_slice::<T>(&window);
            let input = input_slice::<T>(inputs, 0)?;
            let y: Vec<T> = input.iter().zip(&window).map(|(&x, &w)| x * w).collect();
            Ok(vec![T::into_data(y)])
        })
    }

    fn refine(&self, node: &Node, transformer: &mut ModelTransformer) -> ForgeResult<bool> {
        let input = transformer.get_corresponding_inputs(&node.inputs()[0])?;
        let window = transformer.add_node(
            Box::new(ConstantNode::vector(PortData::from_f64s(
                self.element_type,
                &hamming_window(self.size),
            ))),
            Vec::new(),
        )?;
        let window = transformer.output(window)?;
        let product = transformer.add_node(
            Box::new(BinaryOperationNode::new(
                self.element_type,
                self.size,
                BinaryOperationType::CoordinatewiseMultiply,
            )?),
            vec![input, window],
        )?;
        let product = transformer.output(product)?;
        transformer.map_node_output(node, 0, product)?;
        Ok(true)
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("size", self.size);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dct_of_constant_frame() {
        let mut node = DCTNode::new(PortType::Float64, 4, 2).unwrap();
        let out = node
            .compute(&[PortData::from(vec![1.0f64; 4])], &mut HostContext::new())
            .unwrap();
        let values = out[0].as_slice::<f64>().unwrap();
        assert!((values[0] - 2.0).abs() < 1e-12);
        assert!(values[1].abs() < 1e-12);
    }

    #[test]
    fn test_dct_filter_count_checked() {
        assert!(DCTNode::new(PortType::Float32, 4, 5).is_err());
        assert!(DCTNode::new(PortType::Int32, 4, 2).is_err());
    }

    #[test]
    fn test_fft_size_checked() {
        assert!(FFTNode::new(PortType::Float32, 6).is_err());
        assert!(FFTNode::new(PortType::Float32, 8).is_ok());
    }

    #[test]
    fn test_hamming_applies_window() {
        let mut node = HammingWindowNode::new(PortType::Float32, 3).unwrap();
        let out = node
            .compute(&[PortData::from(vec![2.0f32; 3])], &mut HostContext::new())
            .unwrap();
        let values = out[0].as_slice::<f32>().unwrap();
        assert!((values[0] - 0.16).abs() < 1e-6);
        assert!((values[1] - 2.0).abs() < 1e-6);
    }
}
