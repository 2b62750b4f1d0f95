//! Primitive neural nodes produced by layer lowering.

use crate::dispatch_real;
use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, Element, HostContext, Model, ModelBuilder, NodeArgs,
    NodeId, NodeKind, NodeRegistration, PortData, PortSpec, PortType, TensorShape,
};
use crate::neural::kernels::{convolve, pool, region_detection, softmax};
use crate::neural::{ActivationType, PoolingType, RegionDetectionParameters, WindowGeometry};
use crate::nodes::{input_slice, require_real};
use crate::{invalid_argument, node_kind_common};

/// Element-wise activation
#[derive(Debug, Clone)]
pub struct ActivationNode {
    element_type: PortType,
    size: usize,
    activation: ActivationType,
}

impl ActivationNode {
    pub const KIND: &'static str = "ActivationNode";

    pub fn new(
        element_type: PortType,
        size: usize,
        activation: ActivationType,
    ) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        if !activation.is_elementwise() {
            return Err(invalid_argument!(
                "{} is not element-wise; use a softmax node",
                activation
            ));
        }
        Ok(Self {
            element_type,
            size,
            activation,
        })
    }

    pub fn activation(&self) -> ActivationType {
        self.activation
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("size")?,
            ActivationType::read_from_archive(archive, "activation")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_activation_node(model, &input, args.parse(1)?)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input"), ArgSpec::required("activation")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for ActivationNode {
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
            let y = self.activation.apply_slice(input_slice::<T>(inputs, 0)?);
            Ok(vec![T::into_data(y)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("size", self.size);
        self.activation.write_to_archive(archive, "activation");
    }

    node_kind_common!();
}

#[derive(Debug, Clone)]
pub struct SoftmaxNode {
    element_type: PortType,
    size: usize,
}

impl SoftmaxNode {
    pub const KIND: &'static str = "SoftmaxNode";

    pub fn new(element_type: PortType, size: usize) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        Ok(Self { element_type, size })
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("size")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_softmax_node(model, &input)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[ArgSpec::required("input")];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for SoftmaxNode {
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
            Ok(vec![T::into_data(softmax(input_slice::<T>(inputs, 0)?))])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("size", self.size);
    }

    node_kind_common!();
}

/// Spatial convolution over a `(rows, columns, channels)` tensor.
///
/// Filters arrive on the `filters` port laid out
/// `[filter][row][column][channel]`. With `binarize_input` every input value
/// is replaced by its sign before the multiply.
#[derive(Debug, Clone)]
pub struct ConvolutionNode {
    element_type: PortType,
    geometry: WindowGeometry,
    binarize_input: bool,
}

impl ConvolutionNode {
    pub const KIND: &'static str = "ConvolutionNode";

    pub fn new(
        element_type: PortType,
        geometry: WindowGeometry,
        binarize_input: bool,
    ) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        Ok(Self {
            element_type,
            geometry,
            binarize_input,
        })
    }

    pub fn geometry(&self) -> &WindowGeometry {
        &self.geometry
    }

    fn filters_size(&self) -> usize {
        let g = &self.geometry;
        g.output_shape.channels * g.window * g.window * g.input_shape.channels
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let geometry = WindowGeometry::new(
            archive.get_shape("inputShape")?,
            archive.get_usize("receptiveField")?,
            archive.get_usize("stride")?,
            archive.get_usize_or("padding", 0)?,
            archive.get_usize("numFilters")?,
        )?;
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            geometry,
            archive.get_bool_or("binarizeInput", false)?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        let filters = args.port_elements(2, model)?;
        builder.add_convolution_node(
            model,
            &input,
            args.shape(1)?,
            &filters,
            args.parse(3)?,
            args.parse(4)?,
            args.parse(5)?,
            args.parse(6)?,
        )
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("inputShape"),
            ArgSpec::required("filters"),
            ArgSpec::required("receptiveField"),
            ArgSpec::required("stride"),
            ArgSpec::optional("padding", "0"),
            ArgSpec::optional("binarizeInput", "false"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for ConvolutionNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input(self.element_type, self.geometry.input_shape.size()),
            PortSpec::new("filters", self.element_type, self.filters_size()),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.geometry.output_shape.size())]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_real!(self.element_type, T => {
            let y = convolve(
                &self.geometry,
                input_slice::<T>(inputs, 0)?,
                input_slice::<T>(inputs, 1)?,
                self.binarize_input,
            );
            Ok(vec![T::into_data(y)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        let g = &self.geometry;
        archive
            .set_port_type("elementType", self.element_type)
            .set_shape("inputShape", &g.input_shape)
            .set_usize("receptiveField", g.window)
            .set_usize("stride", g.stride)
            .set_usize("padding", g.padding)
            .set_usize("numFilters", g.output_shape.channels)
            .set_bool("binarizeInput", self.binarize_input);
    }

    node_kind_common!();
}

#[derive(Debug, Clone)]
pub struct PoolingNode {
    element_type: PortType,
    geometry: WindowGeometry,
    pooling: PoolingType,
}

impl PoolingNode {
    pub const KIND: &'static str = "PoolingNode";

    pub fn new(
        element_type: PortType,
        geometry: WindowGeometry,
        pooling: PoolingType,
    ) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        if geometry.output_shape.channels != geometry.input_shape.channels {
            return Err(invalid_argument!(
                "pooling keeps {} channels, geometry declares {}",
                geometry.input_shape.channels,
                geometry.output_shape.channels
            ));
        }
        Ok(Self {
            element_type,
            geometry,
            pooling,
        })
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let input_shape = archive.get_shape("inputShape")?;
        let geometry = WindowGeometry::new(
            input_shape,
            archive.get_usize("poolSize")?,
            archive.get_usize("stride")?,
            archive.get_usize_or("padding", 0)?,
            input_shape.channels,
        )?;
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            geometry,
            archive.get_string("pooling")?.parse()?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_pooling_node(
            model,
            &input,
            args.shape(1)?,
            args.parse(2)?,
            args.parse(3)?,
            args.parse(4)?,
            args.parse(5)?,
        )
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("inputShape"),
            ArgSpec::required("pooling"),
            ArgSpec::required("poolSize"),
            ArgSpec::required("stride"),
            ArgSpec::optional("padding", "0"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for PoolingNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.geometry.input_shape.size())]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.geometry.output_shape.size())]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_real!(self.element_type, T => {
            let y = pool(&self.geometry, self.pooling, input_slice::<T>(inputs, 0)?);
            Ok(vec![T::into_data(y)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        let g = &self.geometry;
        archive
            .set_port_type("elementType", self.element_type)
            .set_shape("inputShape", &g.input_shape)
            .set_usize("poolSize", g.window)
            .set_usize("stride", g.stride)
            .set_usize("padding", g.padding)
            .set_string("pooling", self.pooling.name());
    }

    node_kind_common!();
}

/// Decodes a detection grid: logistic on box coordinates and confidence,
/// softmax over class scores.
#[derive(Debug, Clone)]
pub struct RegionDetectionNode {
    element_type: PortType,
    parameters: RegionDetectionParameters,
}

impl RegionDetectionNode {
    pub const KIND: &'static str = "RegionDetectionNode";

    pub fn new(element_type: PortType, parameters: RegionDetectionParameters) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        if parameters.num_coordinates < 2 || parameters.num_boxes_per_cell == 0 {
            return Err(invalid_argument!(
                "region detection needs at least 2 coordinates and 1 box per cell"
            ));
        }
        parameters.shape().validate()?;
        Ok(Self {
            element_type,
            parameters,
        })
    }

    fn shape(&self) -> TensorShape {
        self.parameters.shape()
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let parameters = RegionDetectionParameters {
            width: archive.get_usize("width")?,
            height: archive.get_usize("height")?,
            num_boxes_per_cell: archive.get_usize("numBoxesPerCell")?,
            num_classes: archive.get_usize("numClasses")?,
            num_coordinates: archive.get_usize_or("numCoordinates", 4)?,
        };
        Ok(Box::new(Self::new(archive.get_port_type("elementType")?, parameters)?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        let parameters = RegionDetectionParameters {
            width: args.parse(1)?,
            height: args.parse(2)?,
            num_boxes_per_cell: args.parse(3)?,
            num_classes: args.parse(4)?,
            num_coordinates: args.parse(5)?,
        };
        builder.add_region_detection_node(model, &input, parameters)
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("width"),
            ArgSpec::required("height"),
            ArgSpec::required("numBoxesPerCell"),
            ArgSpec::required("numClasses"),
            ArgSpec::optional("numCoordinates", "4"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for RegionDetectionNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(self.element_type, self.shape().size())]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.shape().size())]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        dispatch_real!(self.element_type, T => {
            let y = region_detection(&self.parameters, input_slice::<T>(inputs, 0)?);
            Ok(vec![T::into_data(y)])
        })
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        let p = &self.parameters;
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("width", p.width)
            .set_usize("height", p.height)
            .set_usize("numBoxesPerCell", p.num_boxes_per_cell)
            .set_usize("numClasses", p.num_classes)
            .set_usize("numCoordinates", p.num_coordinates);
    }

    node_kind_common!();
}
