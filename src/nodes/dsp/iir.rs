use std::collections::VecDeque;

use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortSpec, PortType,
};
use crate::math::Real;
use crate::nodes::{input_slice, require_real};
use crate::{invalid_argument, node_kind_common};

/// Infinite impulse response filter over a stream of samples.
///
/// Each input vector is a run of consecutive samples, filtered in order:
/// `y[n] = sum_k b[k] x[n-k] - sum_k a[k] y[n-1-k]`. Sample history carries
/// over between computes.
#[derive(Debug, Clone)]
pub struct IIRFilterNode {
    element_type: PortType,
    size: usize,
    b: Vec<f64>,
    a: Vec<f64>,
    inputs: VecDeque<f64>,
    outputs: VecDeque<f64>,
}

impl IIRFilterNode {
    pub const KIND: &'static str = "IIRFilterNode";

    pub fn new(element_type: PortType, size: usize, b: Vec<f64>, a: Vec<f64>) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        if b.is_empty() {
            return Err(invalid_argument!("IIR filter needs at least one feed-forward coefficient"));
        }
        let inputs = VecDeque::from(vec![0.0; b.len()]);
        let outputs = VecDeque::from(vec![0.0; a.len()]);
        Ok(Self {
            element_type,
            size,
            b,
            a,
            inputs,
            outputs,
        })
    }

    fn filter_sample(&mut self, x: f64) -> f64 {
        self.inputs.pop_back();
        self.inputs.push_front(x);
        let feed_forward: f64 = self.b.iter().zip(&self.inputs).map(|(b, x)| b * x).sum();
        let feedback: f64 = self.a.iter().zip(&self.outputs).map(|(a, y)| a * y).sum();
        let y = feed_forward - feedback;
        if !self.outputs.is_empty() {
            self.outputs.pop_back();
            self.outputs.push_front(y);
        }
        y
    }

    fn filter<T: Real>(&mut self, samples: &[T]) -> Vec<T> {
        samples
            .iter()
            .map(|&x| T::from_f64(self.filter_sample(x.to_f64())))
            .collect()
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("size")?,
            archive.get_float_list("b")?,
            archive.get_float_list_or("a", Vec::new())?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_iir_filter_node(model, &input, args.f64_list(1)?, args.f64_list(2)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("bCoeffs"),
            ArgSpec::optional("aCoeffs", "[]"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for IIRFilterNode {
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
        dispatch_real!(self.element_type, T => {
            let y = self.filter(input_slice::<T>(inputs, 0)?);
            Ok(vec![T::into_data(y)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("size", self.size)
            .set_float_list("b", &self.b)
            .set_float_list("a", &self.a);
    }

    fn reset(&mut self) {
        self.inputs.iter_mut().for_each(|x| *x = 0.0);
        self.outputs.iter_mut().for_each(|y| *y = 0.0);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(node: &mut IIRFilterNode, samples: Vec<f64>) -> Vec<f64> {
        node.compute(&[PortData::from(samples)], &mut HostContext::new())
            .unwrap()
            .remove(0)
            .to_f64_vec()
    }

    #[test]
    fn test_moving_average() {
        let mut node =
            IIRFilterNode::new(PortType::Float64, 2, vec![0.5, 0.5], Vec::new()).unwrap();
        assert_eq!(run(&mut node, vec![2.0, 4.0]), vec![1.0, 3.0]);
        assert_eq!(run(&mut node, vec![6.0, 6.0]), vec![5.0, 6.0]);
    }

    #[test]
    fn test_recursive_decay() {
        // y[n] = x[n] + 0.5 y[n-1]
        let mut node = IIRFilterNode::new(PortType::Float64, 4, vec![1.0], vec![-0.5]).unwrap();
        assert_eq!(run(&mut node, vec![1.0, 0.0, 0.0, 0.0]), vec![1.0, 0.5, 0.25, 0.125]);
        node.reset();
        assert_eq!(run(&mut node, vec![0.0, 0.0, 0.0, 0.0]), vec![0.0; 4]);
    }
}
