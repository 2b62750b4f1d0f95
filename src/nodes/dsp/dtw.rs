use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortSpec, PortType,
};
use crate::math::linalg::squared_distance;
use crate::math::{cast_slice, Real};
use crate::nodes::{input_slice, require_real};
use crate::{invalid_argument, node_kind_common};

/// Streaming dynamic time warping against a fixed prototype sequence.
///
/// Each compute consumes one frame and advances the warping path by one
/// step. The output is the normalized cost of the best path ending at the
/// last prototype frame.
#[derive(Debug, Clone)]
pub struct DTWNode {
    element_type: PortType,
    prototype: Vec<Vec<f64>>,
    variance: f64,
    costs: Vec<f64>,
}

impl DTWNode {
    pub const KIND: &'static str = "DTWNode";

    pub fn new(element_type: PortType, prototype: Vec<Vec<f64>>) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        let dimension = prototype.first().map(Vec::len).unwrap_or(0);
        if dimension == 0 {
            return Err(invalid_argument!("DTW prototype must have non-empty frames"));
        }
        if prototype.iter().any(|frame| frame.len() != dimension) {
            return Err(invalid_argument!(
                "DTW prototype frames must all have {} values",
                dimension
            ));
        }
        let variance = prototype_variance(&prototype);
        let costs = initial_costs(prototype.len());
        Ok(Self {
            element_type,
            prototype,
            variance,
            costs,
        })
    }

    pub fn prototype(&self) -> &[Vec<f64>] {
        &self.prototype
    }

    fn dimension(&self) -> usize {
        self.prototype[0].len()
    }

    fn advance<T: Real>(&mut self, frame: &[T]) -> T {
        let mut next = vec![0.0; self.costs.len()];
        for i in 1..next.len() {
            let reference = cast_slice::<T>(&self.prototype[i - 1]);
            let distance = squared_distance(frame, &reference).to_f64();
            let best = self.costs[i - 1].min(self.costs[i]).min(next[i - 1]);
            next[i] = distance + best;
        }
        self.costs = next;
        let total = self.costs[self.costs.len() - 1];
        T::from_f64((total / self.variance).sqrt())
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let dimension = archive.get_usize("dimension")?;
        let flat = archive.get_float_list("prototype")?;
        if dimension == 0 || flat.len() % dimension != 0 {
            return Err(invalid_argument!(
                "archived prototype of {} values does not split into frames of {}",
                flat.len(),
                dimension
            ));
        }
        let prototype = flat.chunks(dimension).map(<[f64]>::to_vec).collect();
        Ok(Box::new(Self::new(archive.get_port_type("elementType")?, prototype)?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(1, model)?;
        builder.add_dtw_node(model, args.matrix(0)?, &input)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("prototype"), ArgSpec::required("input")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

fn initial_costs(frames: usize) -> Vec<f64> {
    let mut costs = vec![f64::INFINITY; frames + 1];
    costs[0] = 0.0;
    costs
}

/// Mean squared deviation of all prototype values; 1 for a flat prototype
fn prototype_variance(prototype: &[Vec<f64>]) -> f64 {
    let values: Vec<f64> = prototype.iter().flatten().copied().collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let squares: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
    let variance = squares / values.len() as f64;
    if variance > 0.0 {
        variance
    } else {
        1.0
    }
}

impl NodeKind for DTWNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.dimension())]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, 1)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_real!(self.element_type, T => {
            let cost = self.advance(input_slice::<T>(inputs, 0)?);
            Ok(vec![T::into_data(vec![cost])])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        let flat: Vec<f64> = self.prototype.iter().flatten().copied().collect();
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("dimension", self.dimension())
            .set_float_list("prototype", &flat);
    }

    fn reset(&mut self) {
        self.costs = initial_costs(self.prototype.len());
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(node: &mut DTWNode, frame: Vec<f64>) -> f64 {
        node.compute(&[PortData::from(frame)], &mut HostContext::new())
            .unwrap()
            .remove(0)
            .get_f64(0)
            .unwrap()
    }

    #[test]
    fn test_matching_sequence_costs_nothing() {
        let prototype = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 2.0]];
        let mut node = DTWNode::new(PortType::Float64, prototype.clone()).unwrap();
        assert!(step(&mut node, prototype[0].clone()) > 0.0);
        assert!(step(&mut node, prototype[1].clone()) > 0.0);
        assert_eq!(step(&mut node, prototype[2].clone()), 0.0);
    }

    #[test]
    fn test_mismatch_increases_cost() {
        let prototype = vec![vec![1.0], vec![3.0]];
        let mut node = DTWNode::new(PortType::Float64, prototype).unwrap();
        step(&mut node, vec![1.0]);
        let cost = step(&mut node, vec![5.0]);
        // squared error 4, prototype variance 1
        assert!((cost - 2.0).abs() < 1e-12);
        node.reset();
        step(&mut node, vec![1.0]);
        assert_eq!(step(&mut node, vec![3.0]), 0.0);
    }

    #[test]
    fn test_ragged_prototype_rejected() {
        assert!(DTWNode::new(PortType::Float32, vec![vec![1.0], vec![1.0, 2.0]]).is_err());
        assert!(DTWNode::new(PortType::Float32, Vec::new()).is_err());
    }
}
