//! Neural-network layer descriptors, activations and tensor kernels.

pub mod activation;
pub mod kernels;
pub mod layers;

pub use activation::ActivationType;
pub use kernels::{PoolingType, RegionDetectionParameters, WindowGeometry};
pub use layers::{ConvolutionalParameters, Layer, LayerKind, NeuralNetworkPredictor};
