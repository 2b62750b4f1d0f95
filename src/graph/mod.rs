//! Model graph: typed ports, nodes, the builder, transformer passes,
//! interpretive compute and archival.
//!
//! # Architecture
//!
//! ```text
//! ModelBuilder ──► Model (arena of Node) ──► ModelTransformer ──► Model
//!                     │                          copy / refine
//!                     ├── compute(HostContext)
//!                     └── Archiver / Unarchiver ◄─► JSON
//! ```

pub mod archive;
pub mod args;
pub mod builder;
pub mod host;
pub mod layout;
pub mod model;
pub mod node;
pub mod port;
pub mod port_elements;
pub mod port_type;
pub mod registry;
pub mod shape;
pub mod transformer;

pub use archive::{ArchiveObject, ArchiveValue, Archiver, Unarchiver};
pub use args::{ArgSpec, NodeArgs};
pub use builder::{ModelBuilder, RecurrentWeights};
pub use host::HostContext;
pub use layout::PortMemoryLayout;
pub use model::Model;
pub use node::{templated_name, ModelId, Node, NodeId, NodeKind};
pub use port::{InputPort, OutputPort, OutputPortRef, PortSpec};
pub use port_elements::{PortElement, PortElements, PortRange};
pub use port_type::{Element, PortData, PortType};
pub use registry::{AddNodeSchema, NodeRegistration, NodeRegistry};
pub use shape::TensorShape;
pub use transformer::{ModelTransformer, TransformStats};
