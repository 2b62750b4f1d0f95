//! Shared helpers for integration tests
//!
//! Each test binary pulls in only what it needs.

#![allow(dead_code)]

use graphforge::graph::{Model, ModelBuilder, NodeId, PortElements, PortType, TensorShape};
use graphforge::ForgeResult;

pub use serial_test::serial;

/// Input node of `size` elements; returns its id and output elements
pub fn vector_input(
    builder: &ModelBuilder<'_>,
    model: &mut Model,
    size: usize,
    element_type: PortType,
) -> ForgeResult<(NodeId, PortElements)> {
    let id = builder.add_input_node(model, TensorShape::vector(size), element_type)?;
    let output = model.output(id)?;
    Ok((id, output))
}

/// Constant node; returns its output elements
pub fn constant(
    builder: &ModelBuilder<'_>,
    model: &mut Model,
    values: &[f64],
    element_type: PortType,
) -> ForgeResult<PortElements> {
    let id = builder.add_constant_node(model, values, element_type)?;
    model.output(id)
}

/// Relative comparison with an absolute floor of `tolerance` near zero
pub fn assert_close(actual: &[f64], expected: &[f64], tolerance: f64) {
    assert_eq!(actual.len(), expected.len(), "length differs");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        let scale = a.abs().max(e.abs()).max(1.0);
        assert!(
            (a - e).abs() <= tolerance * scale,
            "element {}: {} vs {} (tolerance {})",
            i,
            a,
            e,
            tolerance
        );
    }
}
