//! Neural-network nodes: lowered primitives, the predictor and per-layer nodes.

mod lowering;
pub mod layer_nodes;
pub mod predictor;
pub mod primitives;

pub use layer_nodes::{NeuralLayerNode, LAYER_NODE_KINDS};
pub use predictor::NeuralNetworkPredictorNode;
pub use primitives::{
    ActivationNode, ConvolutionNode, PoolingNode, RegionDetectionNode, SoftmaxNode,
};
