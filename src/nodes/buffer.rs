//! Sliding windows and concatenation.

use crate::dispatch_element;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortElements, PortSpec, PortType, TensorShape,
};
use crate::{invalid_argument, node_kind_common};

use super::{input_data, input_slice};

/// Keeps the most recent `window_size` input samples.
///
/// Every compute shifts the window left by the input size and appends the
/// new input at the end; the oldest samples fall off the front.
#[derive(Debug, Clone)]
pub struct BufferNode {
    element_type: PortType,
    input_size: usize,
    window_size: usize,
    samples: PortData,
}

impl BufferNode {
    pub const KIND: &'static str = "BufferNode";

    pub fn new(element_type: PortType, input_size: usize, window_size: usize) -> ForgeResult<Self> {
        if window_size < input_size {
            return Err(invalid_argument!(
                "buffer window {} is smaller than its input {}",
                window_size,
                input_size
            ));
        }
        Ok(Self {
            element_type,
            input_size,
            window_size,
            samples: PortData::zeros(element_type, window_size),
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    fn shift_in<T: Element>(&mut self, input: &[T]) -> ForgeResult<PortData> {
        let mut window = self.samples.as_slice::<T>()?.to_vec();
        window.rotate_left(input.len());
        let keep = window.len() - input.len();
        window[keep..].copy_from_slice(input);
        self.samples = T::into_data(window);
        Ok(self.samples.clone())
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("inputSize")?,
            archive.get_usize("windowSize")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_buffer_node(model, &input, args.parse(1)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input"), ArgSpec::required("windowSize")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for BufferNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.input_size)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.window_size)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let window = dispatch_element!(self.element_type, T => {
            self.shift_in(input_slice::<T>(inputs, 0)?)?
        });
        Ok(vec![window])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("inputSize", self.input_size)
            .set_usize("windowSize", self.window_size);
    }

    fn reset(&mut self) {
        self.samples = PortData::zeros(self.element_type, self.window_size);
    }

    node_kind_common!();
}

/// Copies a concatenation of producer slices into one output of a given shape
#[derive(Debug, Clone)]
pub struct ConcatenationNode {
    element_type: PortType,
    shape: TensorShape,
}

impl ConcatenationNode {
    pub const KIND: &'static str = "ConcatenationNode";

    pub fn new(element_type: PortType, shape: TensorShape) -> Self {
        Self {
            element_type,
            shape,
        }
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_shape("shape")?,
        )))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let shape = args.shape(0)?;
        let input: PortElements = args.port_elements(1, model)?;
        builder.add_concatenation_node(model, shape, &[input])
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("shape"), ArgSpec::required("inputs")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for ConcatenationNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.shape.size())]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.shape.size())]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        Ok(vec![input_data(inputs, 0)?.clone()])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_shape("shape", &self.shape);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_slides() {
        let mut node = BufferNode::new(PortType::Int32, 2, 5).unwrap();
        let mut host = HostContext::new();
        let out = node
            .compute(&[PortData::from(vec![1i32, 2])], &mut host)
            .unwrap();
        assert_eq!(out[0], PortData::from(vec![0i32, 0, 0, 1, 2]));
        let out = node
            .compute(&[PortData::from(vec![3i32, 4])], &mut host)
            .unwrap();
        assert_eq!(out[0], PortData::from(vec![0i32, 1, 2, 3, 4]));
        let out = node
            .compute(&[PortData::from(vec![5i32, 6])], &mut host)
            .unwrap();
        assert_eq!(out[0], PortData::from(vec![2i32, 3, 4, 5, 6]));

        node.reset();
        let out = node
            .compute(&[PortData::from(vec![7i32, 8])], &mut host)
            .unwrap();
        assert_eq!(out[0], PortData::from(vec![0i32, 0, 0, 7, 8]));
    }

    #[test]
    fn test_buffer_window_must_hold_input() {
        assert!(BufferNode::new(PortType::Float32, 4, 3).is_err());
        assert!(BufferNode::new(PortType::Float32, 4, 4).is_ok());
    }

    #[test]
    fn test_clone_kind_starts_empty() {
        let mut node = BufferNode::new(PortType::Float64, 1, 2).unwrap();
        node.compute(&[PortData::from(vec![9.0f64])], &mut HostContext::new())
            .unwrap();
        let mut copy = node.clone_kind();
        let out = copy
            .compute(&[PortData::from(vec![1.0f64])], &mut HostContext::new())
            .unwrap();
        assert_eq!(out[0], PortData::from(vec![0.0f64, 1.0]));
    }
}
