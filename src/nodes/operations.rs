//! Element-wise arithmetic and type conversion nodes.

use crate::dispatch_element;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortMemoryLayout, PortSpec, PortType,
};
use crate::math::operations::{binary_map, unary_map};
use crate::math::{Arithmetic, BinaryOperationType, UnaryOperationType};
use crate::{invalid_argument, node_kind_common};

use super::{input_data, input_slice};

#[derive(Debug, Clone)]
pub struct UnaryOperationNode {
    element_type: PortType,
    size: usize,
    operation: UnaryOperationType,
}

impl UnaryOperationNode {
    pub const KIND: &'static str = "UnaryOperationNode";

    pub fn new(
        element_type: PortType,
        size: usize,
        operation: UnaryOperationType,
    ) -> ForgeResult<Self> {
        let supported =
            dispatch_element!(element_type, T => <T as Arithmetic>::supports_unary(operation));
        if !supported {
            return Err(invalid_argument!(
                "unary operation {} is not defined for {}",
                operation,
                element_type
            ));
        }
        Ok(Self {
            element_type,
            size,
            operation,
        })
    }

    pub fn operation(&self) -> UnaryOperationType {
        self.operation
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("size")?,
            archive.get_string("operation")?.parse()?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_unary_operation_node(model, &input, args.parse(1)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input"), ArgSpec::required("operation")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for UnaryOperationNode {
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
        let operation = self.operation;
        dispatch_element!(self.element_type, T => {
            let values = unary_map(operation, input_slice::<T>(inputs, 0)?)?;
            Ok(vec![T::into_data(values)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("size", self.size)
            .set_string("operation", self.operation.name());
    }

    node_kind_common!();
}

/// Coordinate-wise binary operation, optionally over strided layouts.
///
/// Without layouts both inputs and the output are dense vectors of one size.
/// With layouts every port has its own padded memory layout; the active
/// regions must agree and output padding is zero.
#[derive(Debug, Clone)]
pub struct BinaryOperationNode {
    element_type: PortType,
    operation: BinaryOperationType,
    input1_layout: PortMemoryLayout,
    input2_layout: PortMemoryLayout,
    output_layout: PortMemoryLayout,
}

impl BinaryOperationNode {
    pub const KIND: &'static str = "BinaryOperationNode";

    pub fn new(
        element_type: PortType,
        size: usize,
        operation: BinaryOperationType,
    ) -> ForgeResult<Self> {
        let dense = PortMemoryLayout::from_size(vec![size]);
        Self::with_layouts(element_type, operation, dense.clone(), dense.clone(), dense)
    }

    pub fn with_layouts(
        element_type: PortType,
        operation: BinaryOperationType,
        input1_layout: PortMemoryLayout,
        input2_layout: PortMemoryLayout,
        output_layout: PortMemoryLayout,
    ) -> ForgeResult<Self> {
        let supported =
            dispatch_element!(element_type, T => <T as Arithmetic>::supports_binary(operation));
        if !supported {
            return Err(invalid_argument!(
                "binary operation {} is not defined for {}",
                operation,
                element_type
            ));
        }
        if input1_layout.size() != output_layout.size()
            || input2_layout.size() != output_layout.size()
        {
            return Err(invalid_argument!(
                "active regions differ: input1 {:?}, input2 {:?}, output {:?}",
                input1_layout.size(),
                input2_layout.size(),
                output_layout.size()
            ));
        }
        Ok(Self {
            element_type,
            operation,
            input1_layout,
            input2_layout,
            output_layout,
        })
    }

    pub fn operation(&self) -> BinaryOperationType {
        self.operation
    }

    fn is_dense(&self) -> bool {
        self.input1_layout.is_contiguous()
            && self.input2_layout.is_contiguous()
            && self.output_layout.is_contiguous()
    }

    fn apply<T: Arithmetic>(&self, a: &[T], b: &[T]) -> ForgeResult<Vec<T>> {
        if self.is_dense() {
            return binary_map(self.operation, a, b);
        }
        let mut output = vec![T::default(); self.output_layout.memory_size()];
        for coordinates in self.output_layout.active_coordinates() {
            let x = a[self.input1_layout.entry_offset(&coordinates)];
            let y = b[self.input2_layout.entry_offset(&coordinates)];
            let offset = self.output_layout.entry_offset(&coordinates);
            output[offset] = T::binary(self.operation, x, y)?;
        }
        Ok(output)
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::with_layouts(
            archive.get_port_type("elementType")?,
            archive.get_string("operation")?.parse()?,
            archive.get_layout("input1Layout")?,
            archive.get_layout("input2Layout")?,
            archive.get_layout("outputLayout")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input1 = args.port_elements(0, model)?;
        let input2 = args.port_elements(1, model)?;
        builder.add_binary_operation_node(model, &input1, &input2, args.parse(2)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input1"),
            ArgSpec::required("input2"),
            ArgSpec::required("operation"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for BinaryOperationNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("input1", self.element_type, self.input1_layout.memory_size()),
            PortSpec::new("input2", self.element_type, self.input2_layout.memory_size()),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.output_layout.memory_size())]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_element!(self.element_type, T => {
            let values = self.apply(input_slice::<T>(inputs, 0)?, input_slice::<T>(inputs, 1)?)?;
            Ok(vec![T::into_data(values)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_string("operation", self.operation.name())
            .set_layout("input1Layout", &self.input1_layout)
            .set_layout("input2Layout", &self.input2_layout)
            .set_layout("outputLayout", &self.output_layout);
    }

    node_kind_common!();
}

/// Converts every element to another element type
#[derive(Debug, Clone)]
pub struct TypeCastNode {
    input_type: PortType,
    output_type: PortType,
    size: usize,
}

impl TypeCastNode {
    pub const KIND: &'static str = "TypeCastNode";

    pub fn new(input_type: PortType, output_type: PortType, size: usize) -> Self {
        Self {
            input_type,
            output_type,
            size,
        }
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("inputType")?,
            archive.get_port_type("outputType")?,
            archive.get_usize("size")?,
        )))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_type_cast_node(model, &input, args.port_type(1)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input"), ArgSpec::required("outputType")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for TypeCastNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.input_type, self.output_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.input_type, self.size)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.output_type, self.size)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        Ok(vec![input_data(inputs, 0)?.cast(self.output_type)])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("inputType", self.input_type)
            .set_port_type("outputType", self.output_type)
            .set_usize("size", self.size);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(kind: &mut dyn NodeKind, inputs: &[PortData]) -> PortData {
        kind.compute(inputs, &mut HostContext::new())
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_unary_square() {
        let mut node =
            UnaryOperationNode::new(PortType::Float32, 3, UnaryOperationType::Square).unwrap();
        let out = run(&mut node, &[PortData::from(vec![2.0f32, -3.0, 4.0])]);
        assert_eq!(out, PortData::from(vec![4.0f32, 9.0, 16.0]));
    }

    #[test]
    fn test_unsupported_operations_rejected() {
        assert!(UnaryOperationNode::new(PortType::Int32, 2, UnaryOperationType::Exp).is_err());
        let not = UnaryOperationType::LogicalNot;
        assert!(UnaryOperationNode::new(PortType::Float64, 2, not).is_err());
        assert!(BinaryOperationNode::new(PortType::Boolean, 2, BinaryOperationType::Add).is_err());
        let shift = BinaryOperationType::ShiftLeft;
        assert!(BinaryOperationNode::new(PortType::Float32, 2, shift).is_err());
    }

    #[test]
    fn test_binary_with_layouts() {
        // 2x2 active region inside a 3x3 padded output
        let dense = PortMemoryLayout::from_size(vec![2, 2]);
        let mut node = BinaryOperationNode::with_layouts(
            PortType::Int32,
            BinaryOperationType::Add,
            dense.clone(),
            dense,
            PortMemoryLayout::new(vec![2, 2], vec![3, 3], vec![1, 1]).unwrap(),
        )
        .unwrap();
        assert_eq!(node.output_ports()[0].size, 9);
        let out = run(
            &mut node,
            &[PortData::from(vec![1i32, 2, 3, 4]), PortData::from(vec![10i32, 20, 30, 40])],
        );
        assert_eq!(out, PortData::from(vec![0i32, 0, 0, 0, 11, 22, 0, 33, 44]));
    }

    #[test]
    fn test_integer_division_by_zero_propagates() {
        let mut node =
            BinaryOperationNode::new(PortType::Int16, 1, BinaryOperationType::CoordinatewiseDivide)
                .unwrap();
        let result = node.compute(
            &[PortData::from(vec![4i16]), PortData::from(vec![0i16])],
            &mut HostContext::new(),
        );
        assert!(matches!(
            result,
            Err(crate::error::GraphForgeError::ArithmeticError(_))
        ));
    }

    #[test]
    fn test_type_cast() {
        let mut node = TypeCastNode::new(PortType::Float64, PortType::Int8, 2);
        assert_eq!(node.type_name(), "TypeCastNode<double,int8>");
        let out = run(&mut node, &[PortData::from(vec![3.9f64, -1.2])]);
        assert_eq!(out, PortData::from(vec![3i8, -1]));
    }
}
