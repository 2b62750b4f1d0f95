//! Nodes at the host-runtime boundary: clock, sink and source.
//!
//! These only hold callback *names*; the closures are looked up in the
//! [`HostContext`] passed to each compute.

use crate::error::{ForgeResult, GraphForgeError};
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, HostContext, Model, ModelBuilder, NodeArgs, NodeId,
    NodeKind, NodeRegistration, PortData, PortSpec, PortType, TensorShape,
};
use crate::{invalid_argument, node_kind_common};

use super::input_data;

/// Time values flow as doubles
pub const TIME_TYPE: PortType = PortType::Float64;

/// Emits `[last tick time, current time]` and reports lag to the host.
///
/// The input is the current time. A tick happens when at least `interval`
/// has passed since the last one; if the tick is late by more than
/// `lag_threshold`, the named lag notification is called with the lag.
#[derive(Debug, Clone)]
pub struct ClockNode {
    interval: f64,
    lag_threshold: f64,
    lag_notification_name: String,
    last_tick: Option<f64>,
}

impl ClockNode {
    pub const KIND: &'static str = "ClockNode";

    pub fn new(
        interval: f64,
        lag_threshold: f64,
        lag_notification_name: impl Into<String>,
    ) -> ForgeResult<Self> {
        if !(interval > 0.0) {
            return Err(invalid_argument!("clock interval must be positive, got {}", interval));
        }
        if lag_threshold < 0.0 {
            return Err(invalid_argument!(
                "lag threshold must not be negative, got {}",
                lag_threshold
            ));
        }
        Ok(Self {
            interval,
            lag_threshold,
            lag_notification_name: lag_notification_name.into(),
            last_tick: None,
        })
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn lag_notification_name(&self) -> &str {
        &self.lag_notification_name
    }

    fn tick(&mut self, now: f64, host: &mut HostContext) -> f64 {
        let last = match self.last_tick {
            Some(last) => last,
            None => {
                self.last_tick = Some(now);
                return now;
            }
        };
        let due = last + self.interval;
        if now < due {
            return last;
        }
        let lag = now - due;
        if lag > self.lag_threshold && !self.lag_notification_name.is_empty() {
            host.notify_lag(&self.lag_notification_name, lag);
        }
        self.last_tick = Some(now);
        now
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_float("interval")?,
            archive.get_float_or("lagThreshold", 0.0)?,
            archive.get_string_or("lagNotificationName", String::new())?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_clock_node(
            model,
            &input,
            args.parse(1)?,
            args.parse(2)?,
            &args.string(3)?,
        )
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("interval"),
            ArgSpec::optional("lagThreshold", "0.0"),
            ArgSpec::optional("lagNotificationName", ""),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for ClockNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(TIME_TYPE, 1)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(TIME_TYPE, 2)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let now = input_data(inputs, 0)?
            .get_f64(0)
            .ok_or_else(|| crate::internal_error!("clock input is empty"))?;
        let last = self.tick(now, host);
        Ok(vec![PortData::Float64(vec![last, now])])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_float("interval", self.interval)
            .set_float("lagThreshold", self.lag_threshold)
            .set_string("lagNotificationName", self.lag_notification_name.clone());
    }

    fn reset(&mut self) {
        self.last_tick = None;
    }

    node_kind_common!();
}

/// Hands its input to a host sink whenever the trigger is truthy.
///
/// The input is also passed through to the output so sinks can sit in the
/// middle of a pipeline.
#[derive(Debug, Clone)]
pub struct SinkNode {
    element_type: PortType,
    shape: TensorShape,
    sink_name: String,
}

impl SinkNode {
    pub const KIND: &'static str = "SinkNode";

    pub fn new(
        element_type: PortType,
        shape: TensorShape,
        sink_name: impl Into<String>,
    ) -> ForgeResult<Self> {
        let sink_name = sink_name.into();
        if sink_name.is_empty() {
            return Err(invalid_argument!("sink function name must not be empty"));
        }
        Ok(Self {
            element_type,
            shape,
            sink_name,
        })
    }

    pub fn sink_name(&self) -> &str {
        &self.sink_name
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_shape("shape")?,
            archive.get_string("sinkFunctionName")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        let trigger = args.port_elements(3, model)?;
        builder.add_sink_node(model, &input, args.shape(1)?, &args.string(2)?, Some(&trigger))
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("shape"),
            ArgSpec::required("sinkFunctionName"),
            ArgSpec::optional("trigger", ""),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for SinkNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.element_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::input(self.element_type, self.shape.size()),
            PortSpec::new("trigger", PortType::Boolean, 1),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.element_type, self.shape.size())]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let data = input_data(inputs, 0)?;
        if input_data(inputs, 1)?.is_truthy_at(0) {
            host.call_sink(&self.sink_name, data)?;
        }
        Ok(vec![data.clone()])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_shape("shape", &self.shape)
            .set_string("sinkFunctionName", self.sink_name.clone());
    }

    node_kind_common!();
}

/// Pulls data from a host source, keyed by the current time input.
///
/// The output keeps its previous value when the source reports no new data.
#[derive(Debug, Clone)]
pub struct SourceNode {
    output_type: PortType,
    shape: TensorShape,
    source_name: String,
    buffer: PortData,
}

impl SourceNode {
    pub const KIND: &'static str = "SourceNode";

    pub fn new(
        output_type: PortType,
        shape: TensorShape,
        source_name: impl Into<String>,
    ) -> ForgeResult<Self> {
        let source_name = source_name.into();
        if source_name.is_empty() {
            return Err(invalid_argument!("source function name must not be empty"));
        }
        Ok(Self {
            output_type,
            shape,
            source_name,
            buffer: PortData::zeros(output_type, shape.size()),
        })
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        Ok(Box::new(Self::new(
            archive.get_port_type("outputType")?,
            archive.get_shape("shape")?,
            archive.get_string("sourceFunctionName")?,
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        builder.add_source_node(
            model,
            &input,
            args.port_type(1)?,
            args.shape(2)?,
            &args.string(3)?,
        )
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("outputType"),
            ArgSpec::required("shape"),
            ArgSpec::required("sourceFunctionName"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for SourceNode {
    fn kind_name(&self) -> &'static str {
        Self::KIND
    }

    fn type_name(&self) -> String {
        templated_name(Self::KIND, &[self.output_type])
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::input(TIME_TYPE, 1)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::output(self.output_type, self.shape.size())]
    }

    fn compute(
        &mut self,
        _inputs: &[PortData],
        host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let mut candidate = self.buffer.clone();
        let produced = host.call_source(&self.source_name, &mut candidate)?;
        if candidate.port_type() != self.output_type || candidate.len() != self.shape.size() {
            return Err(GraphForgeError::Host {
                name: self.source_name.clone(),
                reason: format!(
                    "source returned {} x {}, expected {} x {}",
                    candidate.port_type(),
                    candidate.len(),
                    self.output_type,
                    self.shape.size()
                ),
            });
        }
        if produced {
            self.buffer = candidate;
        }
        Ok(vec![self.buffer.clone()])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("outputType", self.output_type)
            .set_shape("shape", &self.shape)
            .set_string("sourceFunctionName", self.source_name.clone());
    }

    fn reset(&mut self) {
        self.buffer = PortData::zeros(self.output_type, self.shape.size());
    }

    node_kind_common!();
}
