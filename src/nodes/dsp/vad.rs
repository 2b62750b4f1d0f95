use crate::error::ForgeResult;
use crate::graph::{
    templated_name, ArchiveObject, ArgSpec, HostContext, Model, ModelBuilder, NodeArgs, NodeId,
    NodeKind, NodeRegistration, PortData, PortSpec, PortType,
};
use crate::nodes::{input_data, require_real};
use crate::{invalid_argument, node_kind_common};

/// Tuning of the voice activity detector's noise-floor tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceActivityDetectorParameters {
    pub sample_rate: f64,
    /// Seconds per input frame
    pub frame_duration: f64,
    /// Time constant of the noise floor rising toward louder frames
    pub tau_up: f64,
    /// Time constant of the noise floor falling toward quieter frames
    pub tau_down: f64,
    /// Frames louder than `large_input` times the floor rise more slowly
    pub large_input: f64,
    /// Attenuation applied to the rise rate for large inputs
    pub gain_att: f64,
    /// Signal-to-floor ratio that switches activity on
    pub threshold_up: f64,
    /// Signal-to-floor ratio below which activity switches off
    pub threshold_down: f64,
    /// Minimum frame level for activity
    pub level_threshold: f64,
}

impl Default for VoiceActivityDetectorParameters {
    fn default() -> Self {
        Self {
            sample_rate: 8000.0,
            frame_duration: 0.032,
            tau_up: 1.54,
            tau_down: 0.074326,
            large_input: 2.400160,
            gain_att: 0.002885,
            threshold_up: 3.552713,
            threshold_down: 0.931252,
            level_threshold: 0.007885,
        }
    }
}

impl VoiceActivityDetectorParameters {
    fn validate(&self) -> ForgeResult<()> {
        let positive = [
            ("sampleRate", self.sample_rate),
            ("frameDuration", self.frame_duration),
            ("tauUp", self.tau_up),
            ("tauDown", self.tau_down),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(invalid_argument!("{} must be positive, got {}", name, value));
            }
        }
        if self.threshold_down > self.threshold_up {
            return Err(invalid_argument!(
                "thresholdDown {} exceeds thresholdUp {}",
                self.threshold_down,
                self.threshold_up
            ));
        }
        Ok(())
    }

    const FIELDS: [&'static str; 9] = [
        "sampleRate",
        "frameDuration",
        "tauUp",
        "tauDown",
        "largeInput",
        "gainAtt",
        "thresholdUp",
        "thresholdDown",
        "levelThreshold",
    ];

    fn values(&self) -> [f64; 9] {
        [
            self.sample_rate,
            self.frame_duration,
            self.tau_up,
            self.tau_down,
            self.large_input,
            self.gain_att,
            self.threshold_up,
            self.threshold_down,
            self.level_threshold,
        ]
    }

    fn from_values(v: [f64; 9]) -> Self {
        Self {
            sample_rate: v[0],
            frame_duration: v[1],
            tau_up: v[2],
            tau_down: v[3],
            large_input: v[4],
            gain_att: v[5],
            threshold_up: v[6],
            threshold_down: v[7],
            level_threshold: v[8],
        }
    }
}

/// Emits 1 while a frame is judged to contain voice, 0 otherwise.
///
/// Tracks a noise floor of mean frame energy that rises slowly and falls
/// quickly; activity switches on above `threshold_up` times the floor and off
/// below `threshold_down` times the floor (hysteresis).
#[derive(Debug, Clone)]
pub struct VoiceActivityDetectorNode {
    element_type: PortType,
    size: usize,
    parameters: VoiceActivityDetectorParameters,
    noise_floor: Option<f64>,
    active: bool,
}

impl VoiceActivityDetectorNode {
    pub const KIND: &'static str = "VoiceActivityDetectorNode";

    pub fn new(
        element_type: PortType,
        size: usize,
        parameters: VoiceActivityDetectorParameters,
    ) -> ForgeResult<Self> {
        require_real(Self::KIND, element_type)?;
        parameters.validate()?;
        Ok(Self {
            element_type,
            size,
            parameters,
            noise_floor: None,
            active: false,
        })
    }

    pub fn parameters(&self) -> &VoiceActivityDetectorParameters {
        &self.parameters
    }

    fn process(&mut self, frame: &[f64]) -> bool {
        let p = &self.parameters;
        let level = if frame.is_empty() {
            0.0
        } else {
            frame.iter().map(|x| x * x).sum::<f64>() / frame.len() as f64
        };
        let floor = self.noise_floor.unwrap_or(level);
        let floor = if level > floor {
            let mut rate = (p.frame_duration / p.tau_up).min(1.0);
            if level > p.large_input * floor {
                rate *= p.gain_att;
            }
            floor + (level - floor) * rate
        } else {
            floor + (level - floor) * (p.frame_duration / p.tau_down).min(1.0)
        };
        self.noise_floor = Some(floor);

        let ratio = if floor > 0.0 { level / floor } else { 0.0 };
        if !self.active && ratio > p.threshold_up && level > p.level_threshold {
            self.active = true;
        } else if self.active && ratio < p.threshold_down {
            self.active = false;
        }
        self.active
    }

    fn unarchive(archive: &ArchiveObject) -> ForgeResult<Box<dyn NodeKind>> {
        let mut values = VoiceActivityDetectorParameters::default().values();
        for (value, field) in values
            .iter_mut()
            .zip(VoiceActivityDetectorParameters::FIELDS)
        {
            *value = archive.get_float_or(field, *value)?;
        }
        Ok(Box::new(Self::new(
            archive.get_port_type("elementType")?,
            archive.get_usize("size")?,
            VoiceActivityDetectorParameters::from_values(values),
        )?))
    }

    fn add_from_args(
        builder: &ModelBuilder<'_>,
        model: &mut Model,
        args: &NodeArgs<'_>,
    ) -> ForgeResult<NodeId> {
        let input = args.port_elements(0, model)?;
        let mut values = [0.0; 9];
        for (i, value) in values.iter_mut().enumerate() {
            *value = args.parse(i + 1)?;
        }
        builder.add_voice_activity_detector_node(
            model,
            &input,
            VoiceActivityDetectorParameters::from_values(values),
        )
    }

    pub(crate) fn registration() -> NodeRegistration {
        const ARGS: &[ArgSpec] = &[
            ArgSpec::required("input"),
            ArgSpec::required("sampleRate"),
            ArgSpec::required("frameDuration"),
            ArgSpec::required("tauUp"),
            ArgSpec::required("tauDown"),
            ArgSpec::required("largeInput"),
            ArgSpec::required("gainAtt"),
            ArgSpec::required("thresholdUp"),
            ArgSpec::required("thresholdDown"),
            ArgSpec::required("levelThreshold"),
        ];
        NodeRegistration::new(Self::KIND, Self::unarchive).with_schema(ARGS, Self::add_from_args)
    }
}

impl NodeKind for VoiceActivityDetectorNode {
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
        vec![PortSpec::output(PortType::Int32, 1)]
    }

    fn compute(
        &mut self,
        inputs: &[PortData],
        _host: &mut HostContext,
    ) -> ForgeResult<Vec<PortData>> {
        let frame = input_data(inputs, 0)?.to_f64_vec();
        let active = self.process(&frame);
        Ok(vec![PortData::Int32(vec![i32::from(active)])])
    }

    fn write_to_archive(&self, archive: &mut ArchiveObject) {
        archive
            .set_port_type("elementType", self.element_type)
            .set_usize("size", self.size);
        for (field, value) in VoiceActivityDetectorParameters::FIELDS
            .iter()
            .zip(self.parameters.values())
        {
            archive.set_float(field, value);
        }
    }

    fn reset(&mut self) {
        self.noise_floor = None;
        self.active = false;
    }

    node_kind_common!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(amplitude: f64) -> PortData {
        PortData::from(vec![amplitude, -amplitude, amplitude, -amplitude])
    }

    fn detect(node: &mut VoiceActivityDetectorNode, amplitude: f64) -> i32 {
        let out = node
            .compute(&[frame(amplitude)], &mut HostContext::new())
            .unwrap();
        out[0].as_slice::<i32>().unwrap()[0]
    }

    #[test]
    fn test_detects_burst_over_quiet_floor() {
        let mut node =
            VoiceActivityDetectorNode::new(PortType::Float64, 4, Default::default()).unwrap();
        for _ in 0..20 {
            assert_eq!(detect(&mut node, 0.01), 0);
        }
        assert_eq!(detect(&mut node, 0.5), 1);
        assert_eq!(detect(&mut node, 0.5), 1);
        for _ in 0..5 {
            detect(&mut node, 0.001);
        }
        assert_eq!(detect(&mut node, 0.001), 0);
    }

    #[test]
    fn test_invalid_parameters() {
        let parameters = VoiceActivityDetectorParameters {
            tau_up: 0.0,
            ..Default::default()
        };
        assert!(VoiceActivityDetectorNode::new(PortType::Float32, 4, parameters).is_err());
        let parameters = VoiceActivityDetectorParameters {
            threshold_down: 5.0,
            ..Default::default()
        };
        assert!(VoiceActivityDetectorNode::new(PortType::Float32, 4, parameters).is_err());
    }
}
