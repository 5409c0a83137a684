//! Shared data model, error taxonomy, and JSON path evaluator for the
//! Shelly fleet control plane.
//!
//! Every other crate in the workspace depends on this one and none of them
//! depend on each other's internals directly — `Device`, `Group`,
//! `CapabilityDefinition` and friends are the seams between components.

pub mod capability;
pub mod device;
pub mod error;
pub mod group;
pub mod operation;
pub mod path;

pub use capability::{
    ApiDescriptor, CapabilityDefinition, FieldSchema, Gen1Access, Gen2Access, MappingEntry,
    ParameterDescriptor, ParameterMapping, ParameterType,
};
pub use device::{Device, DeviceCredentials, DiscoveryMethod, Generation};
pub use error::{FleetError, Result};
pub use group::{Group, ALL_DEVICES};
pub use operation::{GroupResult, OperationResult};
