//! Built-in node kinds.
//!
//! Each kind registers a stable type name, an unarchive function and, when it
//! can be built from strings, an AddNode argument schema.

pub mod buffer;
pub mod constant;
pub mod dsp;
pub mod host;
pub mod io;
pub mod matrix;
pub mod neural;
pub mod operations;
pub mod recurrent;
pub mod reorder;

use crate::error::ForgeResult;
use crate::graph::{Element, NodeRegistration, PortData, PortType};
use crate::{internal_error, invalid_argument};

/// Value bound to input port `index`
pub(crate) fn input_data(inputs: &[PortData], index: usize) -> ForgeResult<&PortData> {
    inputs
        .get(index)
        .ok_or_else(|| internal_error!("compute called without input {}", index))
}

/// Typed view of input port `index`
pub(crate) fn input_slice<T: Element>(inputs: &[PortData], index: usize) -> ForgeResult<&[T]> {
    input_data(inputs, index)?.as_slice::<T>()
}

/// Kinds whose arithmetic only makes sense on floating point
pub(crate) fn require_real(kind: &str, element_type: PortType) -> ForgeResult<()> {
    if !element_type.is_floating_point() {
        return Err(invalid_argument!(
            "{} requires a float or double element type, got {}",
            kind,
            element_type
        ));
    }
    Ok(())
}

/// Every built-in kind, in no particular order
pub fn builtin_registrations() -> Vec<NodeRegistration> {
    let mut registrations = vec![
        io::InputNode::registration(),
        io::OutputNode::registration(),
        constant::ConstantNode::registration(),
        operations::UnaryOperationNode::registration(),
        operations::BinaryOperationNode::registration(),
        operations::TypeCastNode::registration(),
        buffer::BufferNode::registration(),
        buffer::ConcatenationNode::registration(),
        reorder::ReorderDataNode::registration(),
        matrix::MatrixVectorMultiplyNode::registration(),
        host::ClockNode::registration(),
        host::SinkNode::registration(),
        host::SourceNode::registration(),
        dsp::DCTNode::registration(),
        dsp::FFTNode::registration(),
        dsp::HammingWindowNode::registration(),
        dsp::FilterBankNode::mel_registration(),
        dsp::FilterBankNode::linear_registration(),
        dsp::IIRFilterNode::registration(),
        dsp::DTWNode::registration(),
        dsp::VoiceActivityDetectorNode::registration(),
        neural::ActivationNode::registration(),
        neural::SoftmaxNode::registration(),
        neural::ConvolutionNode::registration(),
        neural::PoolingNode::registration(),
        neural::RegionDetectionNode::registration(),
        neural::NeuralNetworkPredictorNode::registration(),
    ];
    registrations.extend(recurrent::RecurrentNode::registrations());
    registrations.extend(neural::NeuralLayerNode::registrations());
    registrations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_registration_names_are_unique() {
        let registrations = builtin_registrations();
        let names: HashSet<_> = registrations.iter().map(|r| r.kind_name).collect();
        assert_eq!(names.len(), registrations.len());
        assert!(names.contains("MelFilterBankNode"));
        assert!(names.contains("GRUNode"));
    }

    #[test]
    fn test_require_real() {
        assert!(require_real("SoftmaxNode", PortType::Float32).is_ok());
        assert!(require_real("SoftmaxNode", PortType::Int32).is_err());
    }
}
