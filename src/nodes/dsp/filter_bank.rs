use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortSpec, PortType,
};
use crate::math::linalg::dot;
use crate::math::signal::{triangular_filter_bank, FilterScale};
use crate::math::cast_slice;
use crate::nodes::{input_slice, require_real};
use crate::{invalid_argument, node_kind_common};

/// Triangular filter bank over a magnitude spectrum.
///
/// `num_filters` filters span `[0, sample_rate / 2]`; only the first
/// `num_filters_to_use` are evaluated. The mel and linear variants are
/// registered as separate kinds.
#[derive(Debug, Clone)]
pub struct FilterBankNode {
    element_type: PortType,
    scale: FilterScale,
    window_size: usize,
    sample_rate: f64,
    num_filters: usize,
    num_filters_to_use: usize,
    filters: Vec<Vec<f64>>,
}

impl FilterBankNode {
    pub const MEL_KIND: &'static str = "MelFilterBankNode";
    pub const LINEAR_KIND: &'static str = "LinearFilterBankNode";

    pub fn new(
        element_type: PortType,
        scale: FilterScale,
        window_size: usize,
        sample_rate: f64,
        num_filters: usize,
        num_filters_to_use: usize,
    ) -> ForgeResult<Self> {
        require_real(Self::kind_for(scale), element_type)?;
        let num_filters_to_use = if num_filters_to_use == 0 {
            num_filters
        } else {
            num_filters_to_use
        };
        if num_filters_to_use > num_filters {
            return Err(invalid_argument!(
                "cannot use {} of {} filters",
                num_filters_to_use,
                num_filters
            ));
        }
        let mut filters = triangular_filter_bank(scale, window_size, sample_rate, num_filters)?;
        filters.truncate(num_filters_to_use);
        Ok(Self {
            element_type,
            scale,
            window_size,
            sample_rate,
            num_filters,
            num_filters_to_use,
            filters,
        })
    }

    fn kind_for(scale: FilterScale) -> &'static str {
        match scale {
            FilterScale::Mel => Self::MEL_KIND,
            FilterScale::Linear => Self::LINEAR_KIND,
        }
    }

    pub fn scale(&self) -> FilterScale {
        self.scale
    }

    fn read(archive: &ArchiveObject, scale: FilterScale) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            scale,
            archive.get_usize("windowSize")?,
            archive.get_float("sampleRate")?,
            archive.get_usize("numFilters")?,
            archive.get_usize_or("numFiltersToUse", 0)?,
        )?))
    }

    fn unarchive_mel(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Self::read(archive, FilterScale::Mel)
    }

    fn unarchive_linear(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Self::read(archive, FilterScale::Linear)
    }

    fn add_mel_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        let (sample_rate, num_filters, num_filters_to_use) =
            (args.parse(1)?, args.parse(2)?, args.parse(3)?);
        builder.add_mel_filter_bank_node(
            model,
            &input,
            sample_rate,
            num_filters,
            num_filters_to_use,
        )
    }

    fn add_linear_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        let (sample_rate, num_filters, num_filters_to_use) =
            (args.parse(1)?, args.parse(2)?, args.parse(3)?);
        builder.add_linear_filter_bank_node(
            model,
            &input,
            sample_rate,
            num_filters,
            num_filters_to_use,
        )
    }

    const ARGS: &'static [ArgSpec] = &[
        ArgSpec::required("input"),
        ArgSpec::required("sampleRate"),
        ArgSpec::required("numFilters"),
        ArgSpec::optional("numFiltersToUse", "0"),
    ];

    pub(crate) fn mel_registration() -> NodeRegistration {
        NodeRegistration::new(Self::MEL_KIND, Self::unarchive_mel)
            .with_schema(Self::ARGS, Self::add_mel_from_args)
    }

    pub(crate) fn linear_registration() -> NodeRegistration {
        NodeRegistration::new(Self::LINEAR_KIND, Self::unarchive_linear)
            .with_schema(Self::ARGS, Self::add_linear_from_args)
    }
}

impl NodeKind for FilterBankNode {
    fn kind_name(&self) -> &'static str {
        Self::kind_for(self.scale)
    }

    fn type_name(&self) -> String {
        templated_name(self.kind_name(), &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.window_size)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.num_filters_to_use)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_real!(self.element_type, T => {
            let input = input_slice::<T>(inputs, 0)?;
            let energies: Vec<T> = self
                .filters
                .iter()
                .map(|filter| dot(&cast_slice::<T>(filter), input))
                .collect();
            Ok(vec![T::into_data(energies)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("windowSize", self.window_size)
            .set_float("sampleRate", self.sample_rate)
            .set_usize("numFilters", self.num_filters)
            .set_usize("numFiltersToUse", self.num_filters_to_use);
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_subset_of_filters() {
        let node =
            FilterBankNode::new(PortType::Float32, FilterScale::Mel, 64, 16000.0, 20, 13).unwrap();
        assert_eq!(node.output_ports()[0].size, 13);
        assert_eq!(node.type_name(), "MelFilterBankNode<float>");
        let too_many = FilterBankNode::new(PortType::Float32, FilterScale::Mel, 64, 16000.0, 4, 5);
        assert!(too_many.is_err());
    }

    #[test]
    fn test_linear_bank_on_flat_spectrum() {
        let mut node =
            FilterBankNode::new(PortType::Float64, FilterScale::Linear, 32, 8000.0, 4, 0).unwrap();
        assert_eq!(node.kind_name(), FilterBankNode::LINEAR_KIND);
        let out = node
            .compute(&[PortData::from(vec![1.0f64; 32])], &mut HostContext::new())
            .unwrap();
        let energies = out[0].as_slice::<f64>().unwrap();
        assert_eq!(energies.len(), 4);
        // evenly spaced filters see roughly equal energy from a flat spectrum
        for e in energies {
            assert!(*e > 0.0);
            assert!((e - energies[0]).abs() < 0.02 * energies[0]);
        }
    }
}
