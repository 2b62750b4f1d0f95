use crate::dispatch_element;
use crate::error::ForgeResult;
use crate::graph::{
    layout::validate_order, templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model,
    ModelBuilder, NodeArgs, NodeId, NodeKind, NodeRegistration, PortData, PortMemoryLayout,
    PortSpec, PortType,
};
use crate::{invalid_argument, node_kind_common};

use super::input_slice;

/// Moves data between memory layouts, optionally permuting dimensions.
///
/// Output dimension `i` is input dimension `order[i]`. Output padding is
/// filled with `padding_value`.
#[derive(Debug, Clone)]
pub struct ReorderDataNode {
    element_type: PortType,
    input_layout: PortMemoryLayout,
    output_layout: PortMemoryLayout,
    order: Vec<usize>,
    padding_value: f64,
}

impl ReorderDataNode {
    pub const KIND: &'static str = "ReorderDataNode";

    pub fn new(
        element_type: PortType,
        input_layout: PortMemoryLayout,
        output_layout: PortMemoryLayout,
        order: Vec<usize>,
        padding_value: f64,
    ) -> ForgeResult<Self> {
        let order = if order.is_empty() {
            (0..input_layout.rank()).collect()
        } else {
            order
        };
        validate_order(&order, input_layout.rank())?;
        let permuted: Vec<usize> = order.iter().map(|&d| input_layout.size()[d]).collect();
        if permuted != output_layout.size() {
            return Err(invalid_argument!(
                "output layout size {:?} does not match reordered input size {:?}",
                output_layout.size(),
                permuted
            ));
        }
        Ok(Self {
            element_type,
            input_layout,
            output_layout,
            order,
            padding_value,
        })
    }

    pub fn order(&self) -> &[usize] {
        &self.order
    }

    fn reorder<T: Element>(&self, input: &[T]) -> Vec<T> {
        let mut output = vec![T::from_f64(self.padding_value); self.output_layout.memory_size()];
        for coordinates in self.input_layout.active_coordinates() {
            let target: Vec<usize> = self.order.iter().map(|&d| coordinates[d]).collect();
            output[self.output_layout.entry_offset(&target)] =
                input[self.input_layout.entry_offset(&coordinates)];
        }
        output
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_layout("inputLayout")?,
            archive.get_layout("outputLayout")?,
            archive.get_usize_list("order")?,
            archive.get_float_or("paddingValue", 0.0)?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_reorder_data_node(
            model,
            &input,
            args.layout(1)?,
            args.layout(2)?,
            args.usize_list(3)?,
            args.parse(4)?,
        )
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("inputMemoryLayout"),
            ArgSpec::required("outputMemoryLayout"),
            ArgSpec::optional("order", "[]"),
            ArgSpec::optional("outputPaddingValue", "0.0"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for ReorderDataNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.input_layout.memory_size())]
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
            Ok(vec![T::into_data(self.reorder(input_slice::<T>(inputs, 0)?))])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_layout("inputLayout", &self.input_layout)
            .set_layout("outputLayout", &self.output_layout)
            .set_usize_list("order", &self.order)
            .set_float("paddingValue", self.padding_value);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reorder(node: &mut ReorderDataNode, input: PortData) -> PortData {
        node.compute(&[input], &mut HostContext::new())
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_transpose() {
        let mut node = ReorderDataNode::new(
            PortType::Int32,
            PortMemoryLayout::from_size(vec![2, 3]),
            PortMemoryLayout::from_size(vec![3, 2]),
            vec![1, 0],
            0.0,
        )
        .unwrap();
        let out = reorder(&mut node, PortData::from(vec![1i32, 2, 3, 4, 5, 6]));
        assert_eq!(out, PortData::from(vec![1i32, 4, 2, 5, 3, 6]));
    }

    #[test]
    fn test_padding_added_and_removed() {
        let padded = PortMemoryLayout::with_padding(vec![2, 2], &[1, 1]).unwrap();
        let mut pad = ReorderDataNode::new(
            PortType::Float32,
            PortMemoryLayout::from_size(vec![2, 2]),
            padded.clone(),
            Vec::new(),
            -1.0,
        )
        .unwrap();
        let out = reorder(&mut pad, PortData::from(vec![1.0f32, 2.0, 3.0, 4.0]));
        assert_eq!(out.len(), 16);
        let values = out.as_slice::<f32>().unwrap();
        assert_eq!(values[0], -1.0);
        assert_eq!(values[5], 1.0);
        assert_eq!(values[10], 4.0);

        let mut unpad = ReorderDataNode::new(
            PortType::Float32,
            padded,
            PortMemoryLayout::from_size(vec![2, 2]),
            Vec::new(),
            0.0,
        )
        .unwrap();
        let restored = reorder(&mut unpad, out);
        assert_eq!(restored, PortData::from(vec![1.0f32, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn test_rejects_mismatched_layouts() {
        assert!(ReorderDataNode::new(
            PortType::Int8,
            PortMemoryLayout::from_size(vec![2, 3]),
            PortMemoryLayout::from_size(vec![2, 3]),
            vec![1, 0],
            0.0,
        )
        .is_err());
        assert!(ReorderDataNode::new(
            PortType::Int8,
            PortMemoryLayout::from_size(vec![2, 3]),
            PortMemoryLayout::from_size(vec![3, 2]),
            vec![1, 1],
            0.0,
        )
        .is_err());
    }
}
