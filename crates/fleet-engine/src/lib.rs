//! Parameter / Operation Engine (C5). Generation-abstracting
//! logical-name resolution, read/write dispatch, control-verb recipes, and
//! reboot coordination, built on the Capability Catalogue (C2) and Device
//! Registry (C4) from `fleet-devices`.

pub mod control;
pub mod engine;
pub mod resolve;
pub mod rw;

pub use control::ControlOutcome;
pub use engine::{Engine, EngineConfig, OperateOptions, OperationState, SetOptions, UpdateFirmwareOptions, UpdateFirmwareOptionsMarker};
