use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortSpec, PortType,
};
use crate::math::linalg::matrix_vector_multiply;
use crate::{invalid_argument, node_kind_common};

use super::input_slice;

/// `output = m * v` for a row-major `rows x columns` matrix input
#[derive(Debug, Clone)]
pub struct MatrixVectorMultiplyNode {
    element_type: PortType,
    rows: usize,
    columns: usize,
}

impl MatrixVectorMultiplyNode {
    pub const KIND: &'static str = "MatrixVectorMultiplyNode";

    pub fn new(element_type: PortType, rows: usize, columns: usize) -> ForgeResult<Self> {
        if !element_type.is_floating_point() {
            return Err(invalid_argument!(
                "matrix-vector multiply needs a floating-point type, got {}",
                element_type
            ));
        }
        Ok(Self {
            element_type,
            rows,
            columns,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("rows")?,
            archive.get_usize("columns")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let matrix = args.port_elements(0, model)?;
        let vector = args.port_elements(3, model)?;
        let (rows, columns) = (args.parse(1)?, args.parse(2)?);
        builder.add_matrix_vector_multiply_node(model, &matrix, rows, columns, &vector)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("m"),
            ArgSpec::required("rows"),
            ArgSpec::required("columns"),
            ArgSpec::required("v"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for MatrixVectorMultiplyNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::new("m", self.element_type, self.rows * self.columns),
            PortSpec::new("v", self.element_type, self.columns),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.rows)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_real!(self.element_type, T => {
            let m = input_slice::<T>(inputs, 0)?;
            let v = input_slice::<T>(inputs, 1)?;
            let y = matrix_vector_multiply(self.rows, self.columns, m, self.columns, v, 1);
            Ok(vec![T::into_data(y)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("rows", self.rows)
            .set_usize("columns", self.columns);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiply() {
        let mut node = MatrixVectorMultiplyNode::new(PortType::Float64, 2, 3).unwrap();
        let out = node
            .compute(
                &[
                    PortData::from(vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0]),
                    PortData::from(vec![1.0f64, 0.0, -1.0]),
                ],
                &mut HostContext::new(),
            )
            .unwrap();
        assert_eq!(out[0], PortData::from(vec![-2.0f64, -2.0]));
    }

    #[test]
    fn test_integer_type_rejected() {
        assert!(MatrixVectorMultiplyNode::new(PortType::Int32, 2, 2).is_err());
    }
}
