//! Recurrent cells: RNN, GRU and LSTM.
//!
//! Weights arrive through input ports so they can be constants or computed.
//! With `G` gates, `H` hidden units and `I` inputs the ports are:
//!
//! | port | size |
//! |---|---|
//! | `input` | `I` |
//! | `reset` | 1 (bool) |
//! | `inputWeights` | `G*H x I`, row-major |
//! | `hiddenWeights` | `G*H x H`, row-major |
//! | `inputBias`, `hiddenBias` | `G*H` |
//!
//! Gate blocks are stacked in order: GRU `(reset, update, new)`, LSTM
//! `(input, forget, cell, output)`. A truthy `reset` clears the state before
//! the step.

use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortSpec, PortType,
};
use crate::math::linalg::matrix_vector_multiply;
use crate::math::Real;
use crate::neural::ActivationType;
use crate::{invalid_argument, node_kind_common};

use super::{input_data, input_slice, require_real};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecurrentCell {
    Rnn,
    Gru,
    Lstm,
}

impl RecurrentCell {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RecurrentCell::Rnn => "RNNNode",
            RecurrentCell::Gru => "GRUNode",
            RecurrentCell::Lstm => "LSTMNode",
        }
    }

    pub fn num_gates(&self) -> usize {
        match self {
            RecurrentCell::Rnn => 1,
            RecurrentCell::Gru => 3,
            RecurrentCell::Lstm => 4,
        }
    }
}

/// Weights and biases read from the input ports for one step
struct StepWeights<'a, T> {
    input: &'a [T],
    hidden: &'a [T],
    input_bias: &'a [T],
    hidden_bias: &'a [T],
}

#[derive(Debug, Clone)]
pub struct RecurrentNode {
    cell: RecurrentCell,
    element_type: PortType,
    input_size: usize,
    hidden_units: usize,
    activation: ActivationType,
    recurrent_activation: ActivationType,
    hidden_state: Vec<f64>,
    cell_state: Vec<f64>,
}

impl RecurrentNode {
    pub fn new(
        cell: RecurrentCell,
        element_type: PortType,
        input_size: usize,
        hidden_units: usize,
        activation: ActivationType,
        recurrent_activation: ActivationType,
    ) -> ForgeResult<Self> {
        require_real(cell.kind_name(), element_type)?;
        if hidden_units == 0 {
            return Err(invalid_argument!("{} needs at least one hidden unit", cell.kind_name()));
        }
        for a in [activation, recurrent_activation] {
            if !a.is_elementwise() {
                return Err(invalid_argument!(
                    "{} activation must be element-wise, got {}",
                    cell.kind_name(),
                    a
                ));
            }
        }
        Ok(Self {
            cell,
            element_type,
            input_size,
            hidden_units,
            activation,
            recurrent_activation,
            hidden_state: vec![0.0; hidden_units],
            cell_state: vec![0.0; hidden_units],
        })
    }

    pub fn cell(&self) -> RecurrentCell {
        self.cell
    }

    pub fn hidden_units(&self) -> usize {
        self.hidden_units
    }

    fn gate_rows(&self) -> usize {
        self.cell.num_gates() * self.hidden_units
    }

    fn step<T: Real>(&mut self, x: &[T], weights: StepWeights<'_, T>) -> Vec<T> {
        let hu = self.hidden_units;
        let rows = self.gate_rows();
        let h: Vec<T> = self.hidden_state.iter().map(|&v| T::from_f64(v)).collect();
        let mut xi =
            matrix_vector_multiply(rows, self.input_size, weights.input, self.input_size, x, 1);
        let mut hh = matrix_vector_multiply(rows, hu, weights.hidden, hu, &h, 1);
        for r in 0..rows {
            xi[r] += weights.input_bias[r];
            hh[r] += weights.hidden_bias[r];
        }
        let act = self.activation;
        let gate = self.recurrent_activation;

        let next: Vec<T> = match self.cell {
            RecurrentCell::Rnn => (0..hu).map(|u| act.apply(xi[u] + hh[u])).collect(),
            RecurrentCell::Gru => (0..hu)
                .map(|u| {
                    let r = gate.apply(xi[u] + hh[u]);
                    let z = gate.apply(xi[hu + u] + hh[hu + u]);
                    let n = act.apply(xi[2 * hu + u] + r * hh[2 * hu + u]);
                    (T::one() - z) * n + z * h[u]
                })
                .collect(),
            RecurrentCell::Lstm => {
                let mut hidden = Vec::with_capacity(hu);
                for u in 0..hu {
                    let i = gate.apply(xi[u] + hh[u]);
                    let f = gate.apply(xi[hu + u] + hh[hu + u]);
                    let g = act.apply(xi[2 * hu + u] + hh[2 * hu + u]);
                    let o = gate.apply(xi[3 * hu + u] + hh[3 * hu + u]);
                    let c = f * T::from_f64(self.cell_state[u]) + i * g;
                    self.cell_state[u] = c.to_f64();
                    hidden.push(o * act.apply(c));
                }
                hidden
            }
        };
        self.hidden_state = next.iter().map(|v| v.to_f64()).collect();
        next
    }

    fn unarchive_cell(
        archive: &ArchiveObject,
        cell: RecurrentCell,
    ) -> ForgeResult<Box<dyn NodeKind>> {
        let activation = if archive.contains("activation") {
            ActivationType::read_from_archive(archive, "activation")?
        } else {
            ActivationType::Tanh
        };
        let recurrent_activation = if archive.contains("recurrentActivation") {
            ActivationType::read_from_archive(archive, "recurrentActivation")?
        } else {
            ActivationType::Sigmoid
        };
        Ok(Box::new(Self::new(
            cell,
            archive.get_port_type("elementType")?,
            archive.get_usize("inputSize")?,
            archive.get_usize("hiddenUnits")?,
            activation,
            recurrent_activation,
        )?))
    }

    fn unarchive_rnn(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Self::unarchive_cell(archive, RecurrentCell::Rnn)
    }

    fn unarchive_gru(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Self::unarchive_cell(archive, RecurrentCell::Gru)
    }

    fn unarchive_lstm(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Self::unarchive_cell(archive, RecurrentCell::Lstm)
    }

    fn add_from_args(
        cell: RecurrentCell,
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        let reset = args.port_elements(1, model)?;
        let hidden_units: usize = args.parse(2)?;
        let input_weights = args.port_elements(3, model)?;
        let hidden_weights = args.port_elements(4, model)?;
        let input_bias = args.port_elements(5, model)?;
        let hidden_bias = args.port_elements(6, model)?;
        let activation: ActivationType = args.parse(7)?;
        match cell {
            RecurrentCell::Rnn => builder.add_rnn_node(
                model,
                &input,
                &reset,
                hidden_units,
                &input_weights,
                &hidden_weights,
                &input_bias,
                &hidden_bias,
                activation,
            ),
            RecurrentCell::Gru => builder.add_gru_node(
                model,
                &input,
                &reset,
                hidden_units,
                &input_weights,
                &hidden_weights,
                &input_bias,
                &hidden_bias,
                activation,
                args.parse(8)?,
            ),
            RecurrentCell::Lstm => builder.add_lstm_node(
                model,
                &input,
                &reset,
                hidden_units,
                &input_weights,
                &hidden_weights,
                &input_bias,
                &hidden_bias,
                activation,
                args.parse(8)?,
            ),
        }
    }

    const RNN_ARGS: &'static [ArgSpec] = &[
        ArgSpec::required("input"),
        ArgSpec::optional("reset", ""),
        ArgSpec::required("hiddenUnits"),
        ArgSpec::required("inputWeights"),
        ArgSpec::required("hiddenWeights"),
        ArgSpec::required("inputBias"),
        ArgSpec::required("hiddenBias"),
        ArgSpec::optional("activation", "tanh"),
    ];

    const GATED_ARGS: &'static [ArgSpec] = &[
        ArgSpec::required("input"),
        ArgSpec::optional("reset", ""),
        ArgSpec::required("hiddenUnits"),
        ArgSpec::required("inputWeights"),
        ArgSpec::required("hiddenWeights"),
        ArgSpec::required("inputBias"),
        ArgSpec::required("hiddenBias"),
        ArgSpec::optional("activation", "tanh"),
        ArgSpec::optional("recurrentActivation", "sigmoid"),
    ];

    fn add_rnn(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        Self::add_from_args(RecurrentCell::Rnn, builder, model, args)
    }

    fn add_gru(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        Self::add_from_args(RecurrentCell::Gru, builder, model, args)
    }

    fn add_lstm(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        Self::add_from_args(RecurrentCell::Lstm, builder, model, args)
    }

    pub(crate) fn registrations() -> Vec<NodeRegistration> {
        vec![
            NodeRegistration::new(RecurrentCell::Rnn.kind_name(), Self::unarchive_rnn)
                .with_schema(Self::RNN_ARGS, Self::add_rnn),
            NodeRegistration::new(RecurrentCell::Gru.kind_name(), Self::unarchive_gru)
                .with_schema(Self::GATED_ARGS, Self::add_gru),
            NodeRegistration::new(RecurrentCell::Lstm.kind_name(), Self::unarchive_lstm)
                .with_schema(Self::GATED_ARGS, Self::add_lstm),
        ]
    }
}

impl NodeKind for RecurrentNode {
    fn kind_name(&self) -> &'static str {
        self.cell.kind_name()
    }

    fn type_name(&self) -> String {
        templated_name(self.kind_name(), &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        let rows = self.gate_rows();
        vec![
            PortSpec::input(self.element_type, self.input_size),
            PortSpec::new("reset", PortType::Boolean, 1),
            PortSpec::new("inputWeights", self.element_type, rows * self.input_size),
            PortSpec::new("hiddenWeights", self.element_type, rows * self.hidden_units),
            PortSpec::new("inputBias", self.element_type, rows),
            PortSpec::new("hiddenBias", self.element_type, rows),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.hidden_units)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        if input_data(inputs, 1)?.is_truthy_at(0) {
            self.reset();
        }
        dispatch_real!(self.element_type, T => {
            let x = input_slice::<T>(inputs, 0)?;
            let weights = StepWeights {
                input: input_slice::<T>(inputs, 2)?,
                hidden: input_slice::<T>(inputs, 3)?,
                input_bias: input_slice::<T>(inputs, 4)?,
                hidden_bias: input_slice::<T>(inputs, 5)?,
            };
            Ok(vec![T::into_data(self.step(x, weights))])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("inputSize", self.input_size)
            .set_usize("hiddenUnits", self.hidden_units);
        self.activation.write_to_archive(archive, "activation");
        if self.cell != RecurrentCell::Rnn {
            self.recurrent_activation
                .write_to_archive(archive, "recurrentActivation");
        }
    }

    fn reset(&mut self) {
        self.hidden_state.iter_mut().for_each(|v| *v = 0.0);
        self.cell_state.iter_mut().for_each(|v| *v = 0.0);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(node: &RecurrentNode, x: Vec<f64>, reset: bool, weight: f64) -> Vec<PortData> {
        let specs = node.input_ports();
        let mut data = vec![PortData::from(x), PortData::from(vec![reset])];
        for spec in &specs[2..] {
            data.push(PortData::from(vec![weight; spec.size]));
        }
        data
    }

    fn step(node: &mut RecurrentNode, x: Vec<f64>, reset: bool, weight: f64) -> Vec<f64> {
        let inputs = ports(node, x, reset, weight);
        node.compute(&inputs, &mut HostContext::new())
            .unwrap()
            .remove(0)
            .to_f64_vec()
    }

    #[test]
    fn test_port_sizes() {
        let lstm = RecurrentNode::new(
            RecurrentCell::Lstm,
            PortType::Float32,
            3,
            2,
            ActivationType::Tanh,
            ActivationType::Sigmoid,
        )
        .unwrap();
        let sizes: Vec<usize> = lstm.input_ports().iter().map(|p| p.size).collect();
        assert_eq!(sizes, vec![3, 1, 24, 16, 8, 8]);
        assert_eq!(lstm.type_name(), "LSTMNode<float>");
    }

    #[test]
    fn test_rnn_accumulates_and_resets() {
        let mut rnn = RecurrentNode::new(
            RecurrentCell::Rnn,
            PortType::Float64,
            1,
            1,
            ActivationType::None,
            ActivationType::Sigmoid,
        )
        .unwrap();
        // unit weights and biases: h = x + 1 + h + 1
        assert_eq!(step(&mut rnn, vec![1.0], false, 1.0), vec![3.0]);
        assert_eq!(step(&mut rnn, vec![1.0], false, 1.0), vec![6.0]);
        assert_eq!(step(&mut rnn, vec![1.0], true, 1.0), vec![3.0]);
    }

    #[test]
    fn test_gru_zero_weights_halves_state() {
        let mut gru = RecurrentNode::new(
            RecurrentCell::Gru,
            PortType::Float64,
            2,
            3,
            ActivationType::Tanh,
            ActivationType::Sigmoid,
        )
        .unwrap();
        // z = 0.5 and n = 0, so h stays at zero
        assert_eq!(step(&mut gru, vec![1.0, -1.0], false, 0.0), vec![0.0; 3]);
    }

    #[test]
    fn test_lstm_state_persists() {
        let mut lstm = RecurrentNode::new(
            RecurrentCell::Lstm,
            PortType::Float64,
            1,
            1,
            ActivationType::Tanh,
            ActivationType::Sigmoid,
        )
        .unwrap();
        let first = step(&mut lstm, vec![0.5], false, 0.1);
        let second = step(&mut lstm, vec![0.5], false, 0.1);
        assert!(second[0] > first[0]);
        let restarted = step(&mut lstm, vec![0.5], true, 0.1);
        assert!((restarted[0] - first[0]).abs() < 1e-12);
    }

    #[test]
    fn test_softmax_activation_rejected() {
        assert!(RecurrentNode::new(
            RecurrentCell::Rnn,
            PortType::Float32,
            1,
            1,
            ActivationType::Softmax,
            ActivationType::Sigmoid,
        )
        .is_err());
    }
}
