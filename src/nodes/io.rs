//! Model boundary: input and output nodes.

use crate::error::{ForgeResult, GraphForgeError};
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, HostContext, Model, ModelBuilder, NodeArgs, NodeId,
    NodeKind, NodeRegistration, PortData, PortSpec, PortType, TensorShape,
};
use crate::node_kind_common;

/// Emits a client-supplied value of fixed type and shape
#[derive(Debug, Clone)]
pub struct InputNode {
    element_type: PortType,
    shape: TensorShape,
    value: PortData,
}

impl InputNode {
    pub const KIND: &'static str = "InputNode";

    pub fn new(element_type: PortType, shape: TensorShape) -> Self {
        Self {
            element_type,
            shape,
            value: PortData::zeros(element_type, shape.size()),
        }
    }

    pub fn element_type(&self) -> PortType {
        self.element_type
    }

    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn value(&self) -> &PortData {
        &self.value
    }

    /// Value emitted by the next compute; type and size must match the port
    pub fn set_value(&mut self, value: PortData) -> ForgeResult<()> {
        if value.port_type() != self.element_type {
            return Err(GraphForgeError::TypeMismatch {
                expected: self.element_type,
                actual: value.port_type(),
            });
        }
        if value.len() != self.shape.size() {
            return Err(GraphForgeError::SizeMismatch {
                expected: self.shape.size(),
                actual: value.len(),
            });
        }
        self.value = value;
        Ok(())
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
        builder.add_input_node(model, args.shape(0)?, args.port_type(1)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("shape"), ArgSpec::required("type")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for InputNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.shape.size())]
    }

    fn compute(
        &mut self,
        _inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        Ok(vec![self.value.clone()])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_shape("shape", &self.shape);
    }

    fn reset(&mut self) {
        self.value = PortData::zeros(self.element_type, self.shape.size());
    }

    node_kind_common!();
}

/// Marks a model output; passes its input through unchanged
#[derive(Debug, Clone)]
pub struct OutputNode {
    element_type: PortType,
    shape: TensorShape,
}

impl OutputNode {
    pub const KIND: &'static str = "OutputNode";

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
        let input = args.port_elements(1, model)?;
        builder.add_output_node(model, shape, &input)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("shape"), ArgSpec::required("input")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for OutputNode {
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
        Ok(vec![super::input_data(inputs, 0)?.clone()])
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
    fn test_set_value_checks_type_and_size() {
        let mut input = InputNode::new(PortType::Float32, TensorShape::vector(2));
        assert!(input.set_value(PortData::from(vec![1.0f32, 2.0])).is_ok());
        assert!(matches!(
            input.set_value(PortData::from(vec![1.0f64, 2.0])),
            Err(GraphForgeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            input.set_value(PortData::from(vec![1.0f32])),
            Err(GraphForgeError::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_type_names() {
        let input = InputNode::new(PortType::Int16, TensorShape::new(1, 2, 3));
        assert_eq!(input.type_name(), "InputNode<int16>");
        assert_eq!(input.output_ports()[0].size, 6);
        let output = OutputNode::new(PortType::Float64, TensorShape::vector(4));
        assert_eq!(output.type_name(), "OutputNode<double>");
    }
}
