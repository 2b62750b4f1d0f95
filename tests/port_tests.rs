//! Port binding, element resolution and iteration

mod common;

use common::{constant, vector_input};
use graphforge::graph::{Model, ModelBuilder, PortData, PortElement, PortElements, PortType};
use graphforge::math::BinaryOperationType;
use graphforge::GraphForgeError;

#[test]
fn test_scatter_inputs_feed_binary_add() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let c1 = constant(&builder, &mut model, &[1.0, 2.0, 3.0], PortType::Float64)?;
    let c2 = constant(&builder, &mut model, &[10.0, 20.0, 30.0], PortType::Float64)?;

    let left = PortElements::concat([&c1.slice(0, 2)?, &c2.slice(2, 1)?])?;
    let right = PortElements::concat([&c2.slice(0, 2)?, &c1.slice(2, 1)?])?;
    assert_eq!(left.ranges().len(), 2);

    let add =
        builder.add_binary_operation_node(&mut model, &left, &right, BinaryOperationType::Add)?;
    model.compute()?;
    assert_eq!(model.output_value(add)?, &PortData::Float64(vec![11.0, 22.0, 33.0]));
    Ok(())
}

#[test]
fn test_integer_producer_rejected_by_float_consumer() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let floats = constant(&builder, &mut model, &[1.0, 2.0], PortType::Float32)?;
    let ints = constant(&builder, &mut model, &[1.0, 2.0], PortType::Int32)?;
    let before = model.structural_fingerprint();

    let err = builder
        .add_binary_operation_node(&mut model, &floats, &ints, BinaryOperationType::Add)
        .unwrap_err();
    assert!(matches!(
        err,
        GraphForgeError::TypeMismatch {
            expected: PortType::Float32,
            actual: PortType::Int32
        }
    ));
    assert_eq!(model.len(), 2);
    assert_eq!(model.structural_fingerprint(), before);
    Ok(())
}

#[test]
fn test_bind_size_mismatch() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let (input, _) = vector_input(&builder, &mut model, 3, PortType::Float64)?;
    let short = constant(&builder, &mut model, &[1.0, 2.0], PortType::Float64)?;
    let (_, three) = vector_input(&builder, &mut model, 3, PortType::Float64)?;
    let output = builder.add_output_node(&mut model, graphforge::TensorShape::vector(3), &three)?;

    let err = model.reset_input(output, "input", short).unwrap_err();
    assert!(matches!(err, GraphForgeError::SizeMismatch { expected: 3, actual: 2 }));
    assert!(model.input_nodes().contains(&input));
    Ok(())
}

#[test]
fn test_bind_cross_model() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut first = Model::new();
    let mut second = Model::new();
    let (_, foreign) = vector_input(&builder, &mut first, 2, PortType::Float64)?;
    let err = builder
        .add_output_node(&mut second, graphforge::TensorShape::vector(2), &foreign)
        .unwrap_err();
    assert!(matches!(err, GraphForgeError::CrossModel { .. }));
    assert!(second.is_empty());
    Ok(())
}

#[test]
fn test_resolve_and_out_of_range() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let a = constant(&builder, &mut model, &[1.0, 2.0, 3.0], PortType::Float64)?;
    let b = constant(&builder, &mut model, &[4.0, 5.0], PortType::Float64)?;
    let joined = PortElements::concat([&a.slice(1, 2)?, &b])?;
    assert_eq!(joined.size(), 4);

    let PortElement { port, index } = joined.resolve(2)?;
    assert_eq!(port, b.ranges()[0].port);
    assert_eq!(index, 0);
    assert!(matches!(
        joined.resolve(4),
        Err(GraphForgeError::OutOfRange { index: 4, size: 4 })
    ));
    Ok(())
}

#[test]
fn test_iteration_is_restartable() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let a = constant(&builder, &mut model, &[1.0, 2.0, 3.0], PortType::Float64)?;
    let reversed = PortElements::concat([&a.element(2)?, &a.element(1)?, &a.element(0)?])?;

    let first: Vec<usize> = reversed.iter().map(|e| e.index).collect();
    let second: Vec<usize> = reversed.iter().map(|e| e.index).collect();
    assert_eq!(first, vec![2, 1, 0]);
    assert_eq!(first, second);

    model.compute()?;
    assert_eq!(model.gather(&reversed)?.to_f64_vec(), vec![3.0, 2.0, 1.0]);
    Ok(())
}

#[test]
fn test_concatenating_mixed_types_fails() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let a = constant(&builder, &mut model, &[1.0], PortType::Float64)?;
    let b = constant(&builder, &mut model, &[1.0], PortType::Boolean)?;
    assert!(matches!(
        PortElements::concat([&a, &b]),
        Err(GraphForgeError::TypeMismatch { .. })
    ));
    Ok(())
}
