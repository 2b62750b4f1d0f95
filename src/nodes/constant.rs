use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, HostContext, Model, ModelBuilder, NodeArgs, NodeId,
    NodeKind, NodeRegistration, PortData, PortSpec, TensorShape,
};
use crate::{invalid_argument, node_kind_common};

/// Emits a fixed vector
#[derive(Debug, Clone)]
pub struct ConstantNode {
    values: PortData,
    shape: TensorShape,
}

impl ConstantNode {
    pub const KIND: &'static str = "ConstantNode";

    /// `shape` must cover exactly the number of values
    pub fn new(values: PortData, shape: TensorShape) -> ForgeResult<Self> {
        if shape.size() != values.len() {
            return Err(invalid_argument!(
                "constant shape {} holds {} values, {} given",
                shape,
                shape.size(),
                values.len()
            ));
        }
        Ok(Self { values, shape })
    }

    pub fn vector(values: PortData) -> Self {
        let shape = TensorShape::vector(values.len());
        Self { values, shape }
    }

    pub fn values(&self) -> &PortData {
        &self.values
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let element_type = archive.get_port_type("elementType")?;
        let values = archive.get_data("values", element_type)?;
        let shape = if archive.contains("shape") {
            archive.get_shape("shape")?
        } else {
            TensorShape::vector(values.len())
        };
        Ok(Box::new(Self::new(values, shape)?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let values = args.f64_list(0)?;
        let element_type = args.port_type(1)?;
        let dims = args.usize_list(2)?;
        if dims.is_empty() {
            builder.add_constant_node(model, &values, element_type)
        } else {
            let shape = args.shape(2)?;
            builder.add_constant_node_with_shape(model, &values, shape, element_type)
        }
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("values"),
            ArgSpec::required("type"),
            ArgSpec::optional("shape", "[]"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for ConstantNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.values.port_type()])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.values.port_type(), self.values.len())]
    }

    fn compute(
        &mut self,
        _inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        Ok(vec![self.values.clone()])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.values.port_type())
            .set_data("values", &self.values)
            .set_shape("shape", &self.shape);
    }

    node_kind_common!();
}
