//! Property tests over randomly built operation chains

mod common;

use common::vector_input;
use graphforge::graph::{
    Archiver, Model, ModelBuilder, ModelTransformer, NodeId, PortData, PortType, Unarchiver,
};
use graphforge::math::{BinaryOperationType, UnaryOperationType};
use proptest::prelude::*;

const UNARY: [UnaryOperationType; 5] = [
    UnaryOperationType::None,
    UnaryOperationType::Square,
    UnaryOperationType::Sin,
    UnaryOperationType::Cos,
    UnaryOperationType::Tanh,
];

/// Input -> unary chain, with every other step also adding the input back in
fn build_chain(size: usize, ops: &[usize]) -> anyhow::Result<(Model, NodeId, NodeId)> {
    let builder = ModelBuilder::new();
    let mut model = Model::new();
    let (input, input_out) = vector_input(&builder, &mut model, size, PortType::Float64)?;
    let mut current = input_out.clone();
    let mut last = input;
    for (step, &op) in ops.iter().enumerate() {
        last = builder.add_unary_operation_node(&mut model, &current, UNARY[op % UNARY.len()])?;
        current = model.output(last)?;
        if step % 2 == 1 {
            let add = BinaryOperationType::Add;
            last = builder.add_binary_operation_node(&mut model, &current, &input_out, add)?;
            current = model.output(last)?;
        }
    }
    Ok((model, input, last))
}

fn evaluate(
    model: &mut Model,
    input: NodeId,
    output: NodeId,
    x: &[f64],
) -> anyhow::Result<Vec<f64>> {
    model.set_input_value(input, PortData::Float64(x.to_vec()))?;
    model.compute()?;
    Ok(model.output_value(output)?.to_f64_vec())
}

proptest! {
    #[test]
    fn test_chains_verify_and_copy(
        x in prop::collection::vec(-2.0f64..2.0, 1..5),
        ops in prop::collection::vec(0usize..5, 1..6)
    ) {
        let (mut model, input, output) = build_chain(x.len(), &ops).unwrap();
        prop_assert!(model.verify().is_ok());
        prop_assert_eq!(model.topological_order().len(), model.len());

        let mut transformer = ModelTransformer::default();
        let mut copy = transformer.copy_model(&model).unwrap();
        prop_assert_eq!(copy.structural_fingerprint(), model.structural_fingerprint());

        let expected = evaluate(&mut model, input, output, &x).unwrap();
        let actual = evaluate(&mut copy, input, output, &x).unwrap();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn test_chains_survive_archive(
        x in prop::collection::vec(-2.0f64..2.0, 1..5),
        ops in prop::collection::vec(0usize..5, 1..6)
    ) {
        let (mut model, input, output) = build_chain(x.len(), &ops).unwrap();
        let json = Archiver::new().to_json(&model).unwrap();
        let mut restored = Unarchiver::new().from_json(&json).unwrap();
        prop_assert_eq!(restored.structural_fingerprint(), model.structural_fingerprint());

        let expected = evaluate(&mut model, input, output, &x).unwrap();
        let actual = evaluate(&mut restored, input, output, &x).unwrap();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn test_slices_resolve_within_bounds(
        size in 1usize..12,
        start in 0usize..12,
        count in 0usize..12
    ) {
        let builder = ModelBuilder::new();
        let mut model = Model::new();
        let (_, elements) = vector_input(&builder, &mut model, size, PortType::Float64).unwrap();
        match elements.slice(start, count) {
            Ok(slice) => {
                prop_assert!(start + count <= size);
                prop_assert_eq!(slice.size(), count);
                let indices: Vec<usize> = slice.iter().map(|e| e.index).collect();
                prop_assert_eq!(indices, (start..start + count).collect::<Vec<_>>());
            }
            Err(_) => prop_assert!(start + count > size),
        }
    }
}
