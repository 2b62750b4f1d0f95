//! GraphForge - computation-graph core for embedded inference models
//!
//! Typed dataflow graphs of signal-processing and neural-network nodes:
//! a builder that validates every edge, a transformer that refines
//! composite nodes into primitives, an interpretive compute path and a
//! self-describing archive format.

#![allow(clippy::too_many_arguments)] // Node constructors mirror their archived fields
#![allow(clippy::needless_range_loop)] // Index loops read closer to the kernel math

pub mod config;
pub mod error;
pub mod graph;
pub mod logging;
pub mod math;
pub mod neural;
pub mod nodes;

pub use config::TransformerConfig;
pub use error::{ErrorCategory, ForgeResult, GraphForgeError};
pub use graph::{
    Archiver, HostContext, Model, ModelBuilder, ModelTransformer, NodeId, PortData,
    PortElements, PortType, TensorShape, Unarchiver,
};
