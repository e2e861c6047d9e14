//! Model Registry & Metadata Provider (§4.1).

pub mod descriptor;
pub mod registry;

pub use descriptor::{Availability, HardwareProfile, ModelDescriptor, Pricing};
pub use registry::{build_registry, DynamicRegistry, MetadataSource, Registry, StaticRegistry};
