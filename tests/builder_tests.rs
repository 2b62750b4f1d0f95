//! ModelBuilder: typed entry points, the generic AddNode grammar and
//! transactional failure behavior

mod common;

use common::{constant, vector_input};
use graphforge::graph::{Model, ModelBuilder, PortData, PortType, TensorShape};
use graphforge::math::UnaryOperationType;
use graphforge::neural::{ActivationType, Layer};
use graphforge::GraphForgeError;

#[test]
fn test_linear_pipeline() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let (input, input_out) = vector_input(&builder, &mut model, 3, PortType::Float32)?;
    let square =
        builder.add_unary_operation_node(&mut model, &input_out, UnaryOperationType::Square)?;
    let square_out = model.output(square)?;
    let output = builder.add_output_node(&mut model, TensorShape::new(1, 1, 3), &square_out)?;

    model.set_input_value(input, PortData::Float32(vec![2.0, -3.0, 4.0]))?;
    model.compute()?;
    assert_eq!(model.output_value(output)?, &PortData::Float32(vec![4.0, 9.0, 16.0]));
    assert_eq!(model.output_nodes(), vec![output]);
    Ok(())
}

#[test]
fn test_reset_input_rejects_cycle() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let (_, source) = vector_input(&builder, &mut model, 2, PortType::Float64)?;
    let a = builder.add_unary_operation_node(&mut model, &source, UnaryOperationType::Sin)?;
    let a_out = model.output(a)?;
    let b = builder.add_unary_operation_node(&mut model, &a_out, UnaryOperationType::Cos)?;
    let b_out = model.output(b)?;
    let c = builder.add_unary_operation_node(&mut model, &b_out, UnaryOperationType::Tanh)?;
    let c_out = model.output(c)?;
    let before = model.structural_fingerprint();

    let err = builder.reset_input(&mut model, a, "input", c_out).unwrap_err();
    assert!(matches!(err, GraphForgeError::CycleIntroduced { node: 1, .. }));
    assert_eq!(model.structural_fingerprint(), before);

    // a legal rewrite goes through
    builder.reset_input(&mut model, c, "input", a_out)?;
    assert_ne!(model.structural_fingerprint(), before);
    model.verify()?;
    Ok(())
}

#[test]
fn test_reset_input_unknown_port() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let (_, source) = vector_input(&builder, &mut model, 2, PortType::Float64)?;
    let a = builder.add_unary_operation_node(&mut model, &source, UnaryOperationType::Sin)?;
    assert!(matches!(
        model.reset_input(a, "nonexistent", source),
        Err(GraphForgeError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn test_generic_pipeline_matches_typed() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let input = builder.add_node(&mut model, "InputNode", &["[1, 1, 3]", "double"])?;
    let scaled = builder.add_node(
        &mut model,
        "BinaryOperationNode<double>",
        &[&format!("{}.output", input.0), &format!("{}.output", input.0), "coordinatewiseMultiply"],
    )?;
    let picked = format!("{{{}.output[2], {}.output[0..2]}}", scaled.0, scaled.0);
    let output = builder.add_node(&mut model, "OutputNode", &["[1, 1, 3]", &picked])?;

    model.set_input_value(input, PortData::Float64(vec![1.0, 2.0, 3.0]))?;
    model.compute()?;
    assert_eq!(model.output_value(output)?.to_f64_vec(), vec![9.0, 1.0, 4.0]);
    Ok(())
}

#[test]
fn test_generic_optional_arguments_default() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let input = builder.add_node(&mut model, "InputNode", &["[4]", "float"])?;
    let source = format!("{}.output", input.0);
    let iir = builder.add_node(&mut model, "IIRFilterNode", &[&source, "[0.5, 0.5]"])?;
    assert_eq!(model.node(iir)?.type_name(), "IIRFilterNode<float>");
    Ok(())
}

#[test]
fn test_generic_errors() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    builder.add_node(&mut model, "ConstantNode", &["[1, 2]", "int32"])?;

    assert!(matches!(
        builder.add_node(&mut model, "WarpDriveNode", &[]),
        Err(GraphForgeError::UnknownKind(_))
    ));
    assert!(matches!(
        builder.add_node(&mut model, "NeuralNetworkPredictorNode", &[]),
        Err(GraphForgeError::UnknownKind(_))
    ));
    assert!(matches!(
        builder.add_node(&mut model, "UnaryOperationNode", &["0.output", "frobnicate"]),
        Err(GraphForgeError::ArgParseError { .. })
    ));
    assert!(matches!(
        builder.add_node(&mut model, "BufferNode", &["0.output", "lots"]),
        Err(GraphForgeError::ArgParseError { .. })
    ));
    assert!(matches!(
        builder.add_node(&mut model, "UnaryOperationNode", &["7.output", "square"]),
        Err(GraphForgeError::ArgParseError { .. })
    ));
    assert!(builder.add_node(&mut model, "UnaryOperationNode", &[]).is_err());
    assert!(matches!(
        builder.add_node(&mut model, "TypeCastNode<float,double>", &["0.output", "double"]),
        Err(GraphForgeError::InvalidArgument(_))
    ));
    assert_eq!(model.len(), 1);
    Ok(())
}

#[test]
fn test_generic_template_suffix_checked() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    builder.add_node(&mut model, "ConstantNode", &["[1, 2]", "int32"])?;
    let cast = builder.add_node(&mut model, "TypeCastNode<int32,double>", &["0.output", "double"])?;
    assert_eq!(model.node(cast)?.type_name(), "TypeCastNode<int32,double>");
    Ok(())
}

#[test]
fn test_sink_trigger_default_is_transactional() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let values = constant(&builder, &mut model, &[1.0, 2.0], PortType::Float64)?;

    builder.add_node(&mut model, "SinkNode", &["0.output", "[2]", "collect"])?;
    assert_eq!(model.len(), 3);

    // the default trigger constant is not left behind when the sink fails
    let err = builder
        .add_node(&mut model, "SinkNode", &["0.output", "[3]", "collect"])
        .unwrap_err();
    assert!(matches!(err, GraphForgeError::InvalidArgument(_)));
    assert_eq!(model.len(), 3);

    let trigger = constant(&builder, &mut model, &[0.0], PortType::Boolean)?;
    builder.add_sink_node(&mut model, &values, TensorShape::vector(2), "collect", Some(&trigger))?;
    assert_eq!(model.len(), 5);
    Ok(())
}

#[test]
fn test_recurrent_reset_default() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let (_, input) = vector_input(&builder, &mut model, 2, PortType::Float64)?;
    let iw = constant(&builder, &mut model, &[0.1; 4], PortType::Float64)?;
    let hw = constant(&builder, &mut model, &[0.1; 4], PortType::Float64)?;
    let bias = constant(&builder, &mut model, &[0.0; 2], PortType::Float64)?;
    let empty = graphforge::PortElements::empty(PortType::Boolean);

    let rnn = builder.add_rnn_node(
        &mut model,
        &input,
        &empty,
        2,
        &iw,
        &hw,
        &bias,
        &bias,
        ActivationType::Tanh,
    )?;
    let reset = model.node(rnn)?.input("reset").map(|p| p.element_type());
    assert_eq!(reset, Some(PortType::Boolean));
    assert_eq!(model.len(), 6);

    // wrong weight size: nothing is added, not even the reset constant
    let len = model.len();
    assert!(builder
        .add_gru_node(
            &mut model,
            &input,
            &empty,
            2,
            &iw,
            &hw,
            &bias,
            &bias,
            ActivationType::Tanh,
            ActivationType::Sigmoid,
        )
        .is_err());
    assert_eq!(model.len(), len);
    Ok(())
}

#[test]
fn test_layer_input_volume_checked() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let (_, input) = vector_input(&builder, &mut model, 3, PortType::Float32)?;
    let layer = Layer::bias(TensorShape::vector(2), vec![1.0, 1.0])?;
    assert!(matches!(
        builder.add_neural_layer_node(&mut model, &input, layer),
        Err(GraphForgeError::InvalidArgument(_))
    ));
    assert_eq!(model.len(), 1);
    Ok(())
}

#[test]
fn test_integer_division_by_zero() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let numerator = constant(&builder, &mut model, &[4.0, 9.0], PortType::Int32)?;
    let denominator = constant(&builder, &mut model, &[2.0, 0.0], PortType::Int32)?;
    builder.add_binary_operation_node(
        &mut model,
        &numerator,
        &denominator,
        graphforge::math::BinaryOperationType::CoordinatewiseDivide,
    )?;
    assert!(matches!(model.compute(), Err(GraphForgeError::ArithmeticError(_))));
    Ok(())
}

#[test]
fn test_float_division_by_zero_is_ieee() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let numerator = constant(&builder, &mut model, &[1.0, -1.0], PortType::Float64)?;
    let denominator = constant(&builder, &mut model, &[0.0, 0.0], PortType::Float64)?;
    let div = builder.add_binary_operation_node(
        &mut model,
        &numerator,
        &denominator,
        graphforge::math::BinaryOperationType::CoordinatewiseDivide,
    )?;
    model.compute()?;
    assert_eq!(
        model.output_value(div)?.to_f64_vec(),
        vec![f64::INFINITY, f64::NEG_INFINITY]
    );
    Ok(())
}

#[test]
fn test_generic_port_index_overflow_is_an_error() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    builder.add_node(&mut model, "InputNode", &["[3]", "float"])?;

    for reference in [
        "0.output[18446744073709551615]",
        "0.output[1..18446744073709551615]",
        "0.output[18446744073709551615..18446744073709551615]",
    ] {
        assert!(matches!(
            builder.add_node(&mut model, "UnaryOperationNode", &[reference, "square"]),
            Err(GraphForgeError::ArgParseError { .. })
        ));
    }
    assert_eq!(model.len(), 1);
    Ok(())
}

#[test]
fn test_oversized_shapes_are_rejected() -> anyhow::Result<()> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    assert!(matches!(
        builder.add_node(&mut model, "InputNode", &["[4294967296, 4294967296, 2]", "float"]),
        Err(GraphForgeError::ArgParseError { .. })
    ));
    let oversized = TensorShape::new(1 << 32, 1 << 32, 2);
    assert!(matches!(
        builder.add_input_node(&mut model, oversized, PortType::Float32),
        Err(GraphForgeError::InvalidArgument(_))
    ));

    let (_, input) = vector_input(&builder, &mut model, 4, PortType::Float64)?;
    let layout = "size=[2, 2];stride=[18446744073709551615, 18446744073709551615];offset=[0, 0]";
    assert!(matches!(
        builder.add_node(&mut model, "ReorderDataNode", &["0.output", layout, "size=[2, 2]"]),
        Err(GraphForgeError::ArgParseError { .. })
    ));
    assert!(matches!(
        builder.add_convolution_node(
            &mut model,
            &input,
            TensorShape::new(2, 2, 1),
            &input,
            1 << 32,
            1,
            0,
            false,
        ),
        Err(GraphForgeError::InvalidArgument(_))
    ));
    assert_eq!(model.len(), 1);
    Ok(())
}
