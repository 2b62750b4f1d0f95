//! Neural-network layer descriptors and the predictor that chains them.

use crate::error::ForgeResult;
use crate::graph::{ArchiveObject, TensorShape};
use crate::invalid_argument;
use crate::math::linalg::matrix_vector_multiply;
use crate::math::operations::binary_map;
use crate::math::{cast_slice, BinaryOperationType, Real};

use super::activation::ActivationType;
use super::kernels::{
    binarize_filters, convolve, pool, region_detection, softmax, PoolingType,
    RegionDetectionParameters, WindowGeometry,
};

/// Spatial hyper-parameters of a convolutional layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvolutionalParameters {
    pub receptive_field: usize,
    pub stride: usize,
    pub padding: usize,
    pub num_filters: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    Activation(ActivationType),
    BatchNormalization {
        mean: Vec<f64>,
        variance: Vec<f64>,
        epsilon: f64,
    },
    Bias(Vec<f64>),
    Scaling(Vec<f64>),
    FullyConnected {
        weights: Vec<f64>,
        bias: Option<Vec<f64>>,
    },
    Convolutional {
        parameters: ConvolutionalParameters,
        filters: Vec<f64>,
    },
    BinaryConvolutional {
        parameters: ConvolutionalParameters,
        filters: Vec<f64>,
    },
    Pooling {
        pool_size: usize,
        stride: usize,
        padding: usize,
        pooling: PoolingType,
    },
    Softmax,
    RegionDetection(RegionDetectionParameters),
}

impl LayerKind {
    /// Stable archive name of the layer
    pub fn name(&self) -> &'static str {
        match self {
            LayerKind::Activation(_) => "ActivationLayer",
            LayerKind::BatchNormalization { .. } => "BatchNormalizationLayer",
            LayerKind::Bias(_) => "BiasLayer",
            LayerKind::Scaling(_) => "ScalingLayer",
            LayerKind::FullyConnected { .. } => "FullyConnectedLayer",
            LayerKind::Convolutional { .. } => "ConvolutionalLayer",
            LayerKind::BinaryConvolutional { .. } => "BinaryConvolutionalLayer",
            LayerKind::Pooling { .. } => "PoolingLayer",
            LayerKind::Softmax => "SoftmaxLayer",
            LayerKind::RegionDetection(_) => "RegionDetectionLayer",
        }
    }

    /// Registered name of the per-layer node wrapping this layer
    pub fn node_name(&self) -> &'static str {
        match self {
            LayerKind::Activation(_) => "ActivationLayerNode",
            LayerKind::BatchNormalization { .. } => "BatchNormalizationLayerNode",
            LayerKind::Bias(_) => "BiasLayerNode",
            LayerKind::Scaling(_) => "ScalingLayerNode",
            LayerKind::FullyConnected { .. } => "FullyConnectedLayerNode",
            LayerKind::Convolutional { .. } => "ConvolutionalLayerNode",
            LayerKind::BinaryConvolutional { .. } => "BinaryConvolutionalLayerNode",
            LayerKind::Pooling { .. } => "PoolingLayerNode",
            LayerKind::Softmax => "SoftmaxLayerNode",
            LayerKind::RegionDetection(_) => "RegionDetectionLayerNode",
        }
    }
}

/// One layer: input and output tensor shapes plus kind-specific parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    input_shape: TensorShape,
    output_shape: TensorShape,
    kind: LayerKind,
}

fn check_len(what: &str, actual: usize, expected: usize) -> ForgeResult<()> {
    if actual != expected {
        return Err(invalid_argument!(
            "{} has {} entries, expected {}",
            what,
            actual,
            expected
        ));
    }
    Ok(())
}

impl Layer {
    fn build(
        input_shape: TensorShape,
        output_shape: TensorShape,
        kind: LayerKind,
    ) -> ForgeResult<Self> {
        let layer = Self {
            input_shape,
            output_shape,
            kind,
        };
        layer.validate()?;
        Ok(layer)
    }

    pub fn activation(shape: TensorShape, activation: ActivationType) -> ForgeResult<Self> {
        Self::build(shape, shape, LayerKind::Activation(activation))
    }

    /// `mean` and `variance` hold one entry per channel
    pub fn batch_normalization(
        shape: TensorShape,
        mean: Vec<f64>,
        variance: Vec<f64>,
        epsilon: f64,
    ) -> ForgeResult<Self> {
        Self::build(
            shape,
            shape,
            LayerKind::BatchNormalization {
                mean,
                variance,
                epsilon,
            },
        )
    }

    /// One bias per channel
    pub fn bias(shape: TensorShape, bias: Vec<f64>) -> ForgeResult<Self> {
        Self::build(shape, shape, LayerKind::Bias(bias))
    }

    /// One scale per channel
    pub fn scaling(shape: TensorShape, scale: Vec<f64>) -> ForgeResult<Self> {
        Self::build(shape, shape, LayerKind::Scaling(scale))
    }

    /// `weights` is row-major `output.size() x input.size()`
    pub fn fully_connected(
        input_shape: TensorShape,
        output_shape: TensorShape,
        weights: Vec<f64>,
        bias: Option<Vec<f64>>,
    ) -> ForgeResult<Self> {
        Self::build(
            input_shape,
            output_shape,
            LayerKind::FullyConnected { weights, bias },
        )
    }

    pub fn convolutional(
        input_shape: TensorShape,
        parameters: ConvolutionalParameters,
        filters: Vec<f64>,
    ) -> ForgeResult<Self> {
        let geometry = conv_geometry(input_shape, &parameters)?;
        Self::build(
            input_shape,
            geometry.output_shape,
            LayerKind::Convolutional {
                parameters,
                filters,
            },
        )
    }

    pub fn binary_convolutional(
        input_shape: TensorShape,
        parameters: ConvolutionalParameters,
        filters: Vec<f64>,
    ) -> ForgeResult<Self> {
        let geometry = conv_geometry(input_shape, &parameters)?;
        Self::build(
            input_shape,
            geometry.output_shape,
            LayerKind::BinaryConvolutional {
                parameters,
                filters,
            },
        )
    }

    pub fn pooling(
        input_shape: TensorShape,
        pool_size: usize,
        stride: usize,
        padding: usize,
        pooling: PoolingType,
    ) -> ForgeResult<Self> {
        let geometry =
            WindowGeometry::new(input_shape, pool_size, stride, padding, input_shape.channels)?;
        Self::build(
            input_shape,
            geometry.output_shape,
            LayerKind::Pooling {
                pool_size,
                stride,
                padding,
                pooling,
            },
        )
    }

    pub fn softmax(shape: TensorShape) -> ForgeResult<Self> {
        Self::build(shape, shape, LayerKind::Softmax)
    }

    pub fn region_detection(parameters: RegionDetectionParameters) -> ForgeResult<Self> {
        let shape = parameters.shape();
        Self::build(shape, shape, LayerKind::RegionDetection(parameters))
    }

    pub fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    pub fn output_shape(&self) -> TensorShape {
        self.output_shape
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    /// Check parameter sizes against the layer's shapes
    pub fn validate(&self) -> ForgeResult<()> {
        let input_size = self.input_shape.validate()?;
        let output_size = self.output_shape.validate()?;
        let channels = self.input_shape.channels;
        let same_shape = || {
            if self.input_shape != self.output_shape {
                Err(invalid_argument!(
                    "{} must preserve its shape: {} -> {}",
                    self.kind.name(),
                    self.input_shape,
                    self.output_shape
                ))
            } else {
                Ok(())
            }
        };
        match &self.kind {
            LayerKind::Activation(_) | LayerKind::Softmax => same_shape(),
            LayerKind::BatchNormalization {
                mean,
                variance,
                epsilon,
            } => {
                same_shape()?;
                check_len("batch-normalization mean", mean.len(), channels)?;
                check_len("batch-normalization variance", variance.len(), channels)?;
                if variance.iter().any(|v| v + epsilon <= 0.0) {
                    return Err(invalid_argument!(
                        "batch-normalization variance + epsilon must be positive"
                    ));
                }
                Ok(())
            }
            LayerKind::Bias(values) => {
                same_shape()?;
                check_len("bias", values.len(), channels)
            }
            LayerKind::Scaling(values) => {
                same_shape()?;
                check_len("scale", values.len(), channels)
            }
            LayerKind::FullyConnected { weights, bias } => {
                let expected = output_size.checked_mul(input_size).ok_or_else(|| {
                    invalid_argument!(
                        "fully-connected layer {} -> {} is too large",
                        self.input_shape,
                        self.output_shape
                    )
                })?;
                check_len("fully-connected weights", weights.len(), expected)?;
                if let Some(bias) = bias {
                    check_len("fully-connected bias", bias.len(), output_size)?;
                }
                Ok(())
            }
            LayerKind::Convolutional {
                parameters,
                filters,
            }
            | LayerKind::BinaryConvolutional {
                parameters,
                filters,
            } => {
                let geometry = conv_geometry(self.input_shape, parameters)?;
                if geometry.output_shape != self.output_shape {
                    return Err(invalid_argument!(
                        "convolution output shape {} does not match {}",
                        self.output_shape,
                        geometry.output_shape
                    ));
                }
                let expected = filter_volume(parameters, channels)
                    .and_then(|volume| volume.checked_mul(parameters.num_filters))
                    .ok_or_else(|| invalid_argument!("convolution filters are too large"))?;
                check_len("convolution filters", filters.len(), expected)
            }
            LayerKind::Pooling {
                pool_size,
                stride,
                padding,
                ..
            } => {
                let geometry =
                    WindowGeometry::new(self.input_shape, *pool_size, *stride, *padding, channels)?;
                if geometry.output_shape != self.output_shape {
                    return Err(invalid_argument!(
                        "pooling output shape {} does not match {}",
                        self.output_shape,
                        geometry.output_shape
                    ));
                }
                Ok(())
            }
            LayerKind::RegionDetection(parameters) => {
                same_shape()?;
                if parameters.num_coordinates < 2 || parameters.num_boxes_per_cell == 0 {
                    return Err(invalid_argument!(
                        "region detection needs at least 2 coordinates and 1 box per cell"
                    ));
                }
                if parameters.shape() != self.input_shape {
                    return Err(invalid_argument!(
                        "region detection shape {} does not match grid {}",
                        self.input_shape,
                        parameters.shape()
                    ));
                }
                Ok(())
            }
        }
    }

    /// Geometry of convolution and pooling layers
    pub fn geometry(&self) -> ForgeResult<WindowGeometry> {
        match &self.kind {
            LayerKind::Convolutional { parameters, .. }
            | LayerKind::BinaryConvolutional { parameters, .. } => {
                conv_geometry(self.input_shape, parameters)
            }
            LayerKind::Pooling {
                pool_size,
                stride,
                padding,
                ..
            } => WindowGeometry::new(
                self.input_shape,
                *pool_size,
                *stride,
                *padding,
                self.input_shape.channels,
            ),
            _ => Err(invalid_argument!("{} has no window geometry", self.kind.name())),
        }
    }

    /// Per-channel `values` repeated over every spatial position
    pub fn expand_per_channel(&self, values: &[f64]) -> Vec<f64> {
        let channels = self.output_shape.channels.max(1);
        (0..self.output_shape.size())
            .map(|i| values[i % channels])
            .collect()
    }

    /// Per-element (scale, shift) of a batch-normalization layer
    pub fn batch_norm_coefficients(&self) -> Option<(Vec<f64>, Vec<f64>)> {
        match &self.kind {
            LayerKind::BatchNormalization {
                mean,
                variance,
                epsilon,
            } => {
                let scale: Vec<f64> = variance.iter().map(|v| 1.0 / (v + epsilon).sqrt()).collect();
                let shift: Vec<f64> = mean.iter().zip(&scale).map(|(m, s)| -m * s).collect();
                Some((self.expand_per_channel(&scale), self.expand_per_channel(&shift)))
            }
            _ => None,
        }
    }

    /// Filters as consumed by the convolution kernel
    pub fn effective_filters(&self) -> Option<Vec<f64>> {
        match &self.kind {
            LayerKind::Convolutional { filters, .. } => Some(filters.clone()),
            LayerKind::BinaryConvolutional {
                parameters,
                filters,
            } => {
                let volume = filter_volume(parameters, self.input_shape.channels)?;
                Some(binarize_filters(filters, volume))
            }
            _ => None,
        }
    }

    /// Reference evaluation of the layer
    pub fn compute<T: Real>(&self, input: &[T]) -> ForgeResult<Vec<T>> {
        check_len("layer input", input.len(), self.input_shape.size())?;
        match &self.kind {
            LayerKind::Activation(activation) => Ok(activation.apply_slice(input)),
            LayerKind::Softmax => Ok(softmax(input)),
            LayerKind::BatchNormalization { .. } => {
                let (scale, shift) = self
                    .batch_norm_coefficients()
                    .ok_or_else(|| crate::internal_error!("batch norm coefficients"))?;
                let scaled = binary_map(
                    BinaryOperationType::CoordinatewiseMultiply,
                    input,
                    &cast_slice::<T>(&scale),
                )?;
                binary_map(BinaryOperationType::Add, &scaled, &cast_slice::<T>(&shift))
            }
            LayerKind::Bias(bias) => binary_map(
                BinaryOperationType::Add,
                input,
                &cast_slice::<T>(&self.expand_per_channel(bias)),
            ),
            LayerKind::Scaling(scale) => binary_map(
                BinaryOperationType::CoordinatewiseMultiply,
                input,
                &cast_slice::<T>(&self.expand_per_channel(scale)),
            ),
            LayerKind::FullyConnected { weights, bias } => {
                let rows = self.output_shape.size();
                let columns = self.input_shape.size();
                let product = matrix_vector_multiply(
                    rows,
                    columns,
                    &cast_slice::<T>(weights),
                    columns,
                    input,
                    1,
                );
                match bias {
                    Some(bias) => {
                        binary_map(BinaryOperationType::Add, &product, &cast_slice::<T>(bias))
                    }
                    None => Ok(product),
                }
            }
            LayerKind::Convolutional { .. } | LayerKind::BinaryConvolutional { .. } => {
                let filters = self
                    .effective_filters()
                    .ok_or_else(|| crate::internal_error!("convolution filters"))?;
                let binarize = matches!(self.kind, LayerKind::BinaryConvolutional { .. });
                Ok(convolve(
                    &self.geometry()?,
                    input,
                    &cast_slice::<T>(&filters),
                    binarize,
                ))
            }
            LayerKind::Pooling { pooling, .. } => Ok(pool(&self.geometry()?, *pooling, input)),
            LayerKind::RegionDetection(parameters) => Ok(region_detection(parameters, input)),
        }
    }

    pub fn write_to_archive(&self) -> ArchiveObject {
        let mut archive = ArchiveObject::new();
        archive
            .set_string("layer", self.kind.name())
            .set_shape("inputShape", &self.input_shape)
            .set_shape("outputShape", &self.output_shape);
        match &self.kind {
            LayerKind::Activation(activation) => {
                activation.write_to_archive(&mut archive, "activation");
            }
            LayerKind::BatchNormalization {
                mean,
                variance,
                epsilon,
            } => {
                archive
                    .set_float_list("mean", mean)
                    .set_float_list("variance", variance)
                    .set_float("epsilon", *epsilon);
            }
            LayerKind::Bias(values) => {
                archive.set_float_list("bias", values);
            }
            LayerKind::Scaling(values) => {
                archive.set_float_list("scale", values);
            }
            LayerKind::FullyConnected { weights, bias } => {
                archive.set_float_list("weights", weights);
                if let Some(bias) = bias {
                    archive.set_float_list("bias", bias);
                }
            }
            LayerKind::Convolutional {
                parameters,
                filters,
            }
            | LayerKind::BinaryConvolutional {
                parameters,
                filters,
            } => {
                archive
                    .set_float_list("filters", filters)
                    .set_usize("receptiveField", parameters.receptive_field)
                    .set_usize("stride", parameters.stride)
                    .set_usize("padding", parameters.padding)
                    .set_usize("numFilters", parameters.num_filters);
            }
            LayerKind::Pooling {
                pool_size,
                stride,
                padding,
                pooling,
            } => {
                archive
                    .set_usize("poolSize", *pool_size)
                    .set_usize("stride", *stride)
                    .set_usize("padding", *padding)
                    .set_string("pooling", pooling.name());
            }
            LayerKind::Softmax => {}
            LayerKind::RegionDetection(parameters) => {
                archive
                    .set_usize("width", parameters.width)
                    .set_usize("height", parameters.height)
                    .set_usize("numBoxesPerCell", parameters.num_boxes_per_cell)
                    .set_usize("numClasses", parameters.num_classes)
                    .set_usize("numCoordinates", parameters.num_coordinates);
            }
        }
        archive
    }

    pub fn read_from_archive(archive: &ArchiveObject) -> ForgeResult<Self> {
        let input_shape = archive.get_shape("inputShape")?;
        let output_shape = archive.get_shape("outputShape")?;
        let conv_parameters = || -> ForgeResult<ConvolutionalParameters> {
            Ok(ConvolutionalParameters {
                receptive_field: archive.get_usize("receptiveField")?,
                stride: archive.get_usize("stride")?,
                padding: archive.get_usize_or("padding", 0)?,
                num_filters: archive.get_usize("numFilters")?,
            })
        };
        let kind = match archive.get_string("layer")?.as_str() {
            "ActivationLayer" => {
                LayerKind::Activation(ActivationType::read_from_archive(archive, "activation")?)
            }
            "BatchNormalizationLayer" => LayerKind::BatchNormalization {
                mean: archive.get_float_list("mean")?,
                variance: archive.get_float_list("variance")?,
                epsilon: archive.get_float_or("epsilon", 1e-5)?,
            },
            "BiasLayer" => LayerKind::Bias(archive.get_float_list("bias")?),
            "ScalingLayer" => LayerKind::Scaling(archive.get_float_list("scale")?),
            "FullyConnectedLayer" => LayerKind::FullyConnected {
                weights: archive.get_float_list("weights")?,
                bias: if archive.contains("bias") {
                    Some(archive.get_float_list("bias")?)
                } else {
                    None
                },
            },
            "ConvolutionalLayer" => LayerKind::Convolutional {
                parameters: conv_parameters()?,
                filters: archive.get_float_list("filters")?,
            },
            "BinaryConvolutionalLayer" => LayerKind::BinaryConvolutional {
                parameters: conv_parameters()?,
                filters: archive.get_float_list("filters")?,
            },
            "PoolingLayer" => LayerKind::Pooling {
                pool_size: archive.get_usize("poolSize")?,
                stride: archive.get_usize("stride")?,
                padding: archive.get_usize_or("padding", 0)?,
                pooling: archive.get_string("pooling")?.parse()?,
            },
            "SoftmaxLayer" => LayerKind::Softmax,
            "RegionDetectionLayer" => LayerKind::RegionDetection(RegionDetectionParameters {
                width: archive.get_usize("width")?,
                height: archive.get_usize("height")?,
                num_boxes_per_cell: archive.get_usize("numBoxesPerCell")?,
                num_classes: archive.get_usize("numClasses")?,
                num_coordinates: archive.get_usize_or("numCoordinates", 4)?,
            }),
            other => {
                return Err(crate::error::GraphForgeError::UnknownKind(other.to_string()))
            }
        };
        Self::build(input_shape, output_shape, kind)
    }
}

fn filter_volume(parameters: &ConvolutionalParameters, channels: usize) -> Option<usize> {
    parameters
        .receptive_field
        .checked_mul(parameters.receptive_field)?
        .checked_mul(channels)
}

fn conv_geometry(
    input_shape: TensorShape,
    parameters: &ConvolutionalParameters,
) -> ForgeResult<WindowGeometry> {
    WindowGeometry::new(
        input_shape,
        parameters.receptive_field,
        parameters.stride,
        parameters.padding,
        parameters.num_filters,
    )
}

/// A feed-forward network: layers applied in sequence
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralNetworkPredictor {
    input_shape: TensorShape,
    layers: Vec<Layer>,
}

impl NeuralNetworkPredictor {
    /// Each layer's input shape must equal the previous layer's output shape
    pub fn new(input_shape: TensorShape, layers: Vec<Layer>) -> ForgeResult<Self> {
        let mut shape = input_shape;
        for (i, layer) in layers.iter().enumerate() {
            if layer.input_shape() != shape {
                return Err(invalid_argument!(
                    "layer {} ({}) expects input {}, previous output is {}",
                    i,
                    layer.kind().name(),
                    layer.input_shape(),
                    shape
                ));
            }
            shape = layer.output_shape();
        }
        Ok(Self {
            input_shape,
            layers,
        })
    }

    pub fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    pub fn output_shape(&self) -> TensorShape {
        self.layers
            .last()
            .map(Layer::output_shape)
            .unwrap_or(self.input_shape)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn compute<T: Real>(&self, input: &[T]) -> ForgeResult<Vec<T>> {
        let mut current = input.to_vec();
        for layer in &self.layers {
            current = layer.compute(&current)?;
        }
        Ok(current)
    }

    pub fn write_to_archive(&self) -> ArchiveObject {
        let mut archive = ArchiveObject::new();
        archive
            .set_shape("inputShape", &self.input_shape)
            .set_object_list(
                "layers",
                self.layers.iter().map(Layer::write_to_archive).collect(),
            );
        archive
    }

    pub fn read_from_archive(archive: &ArchiveObject) -> ForgeResult<Self> {
        let layers = archive
            .get_object_list("layers")?
            .iter()
            .map(Layer::read_from_archive)
            .collect::<ForgeResult<Vec<_>>>()?;
        Self::new(archive.get_shape("inputShape")?, layers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense() -> Layer {
        Layer::fully_connected(
            TensorShape::vector(3),
            TensorShape::vector(2),
            vec![1.0, 0.0, -1.0, 0.5, 0.5, 0.5],
            Some(vec![0.25, -0.25]),
        )
        .unwrap()
    }

    #[test]
    fn test_fully_connected_compute() {
        let out = dense().compute(&[1.0f64, 2.0, 3.0]).unwrap();
        assert_eq!(out, vec![-1.75, 2.75]);
    }

    #[test]
    fn test_validation_rejects_bad_sizes() {
        assert!(Layer::bias(TensorShape::new(2, 2, 3), vec![1.0, 2.0]).is_err());
        assert!(Layer::fully_connected(
            TensorShape::vector(3),
            TensorShape::vector(2),
            vec![1.0; 5],
            None
        )
        .is_err());
    }

    #[test]
    fn test_oversized_layers_are_rejected() {
        let huge = 1usize << 32;
        assert!(Layer::activation(TensorShape::new(huge, huge, 2), ActivationType::Relu).is_err());
        assert!(Layer::fully_connected(
            TensorShape::vector(huge),
            TensorShape::vector(huge),
            Vec::new(),
            None
        )
        .is_err());
        let parameters = ConvolutionalParameters {
            receptive_field: huge,
            stride: 1,
            padding: usize::MAX / 2,
            num_filters: 1,
        };
        assert!(Layer::convolutional(TensorShape::new(4, 4, 2), parameters, Vec::new()).is_err());
    }

    #[test]
    fn test_bias_is_per_channel() {
        let layer = Layer::bias(TensorShape::new(1, 2, 2), vec![1.0, 10.0]).unwrap();
        let out = layer.compute(&[0.0f32, 0.0, 1.0, 1.0]).unwrap();
        assert_eq!(out, vec![1.0, 10.0, 2.0, 11.0]);
    }

    #[test]
    fn test_predictor_chain_checked() {
        let relu = Layer::activation(TensorShape::vector(2), ActivationType::Relu).unwrap();
        let predictor =
            NeuralNetworkPredictor::new(TensorShape::vector(3), vec![dense(), relu.clone()])
                .unwrap();
        assert_eq!(predictor.output_shape(), TensorShape::vector(2));
        assert_eq!(predictor.compute(&[1.0f64, 2.0, 3.0]).unwrap(), vec![0.0, 2.75]);
        assert!(NeuralNetworkPredictor::new(TensorShape::vector(3), vec![relu]).is_err());
    }

    #[test]
    fn test_layer_archive_round_trip() {
        let conv = Layer::convolutional(
            TensorShape::new(3, 3, 1),
            ConvolutionalParameters {
                receptive_field: 3,
                stride: 1,
                padding: 1,
                num_filters: 2,
            },
            (0..18).map(f64::from).collect(),
        )
        .unwrap();
        for layer in [dense(), conv] {
            let restored = Layer::read_from_archive(&layer.write_to_archive()).unwrap();
            assert_eq!(restored, layer);
        }
    }
}
