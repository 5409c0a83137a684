//! YAML persistence for devices, groups, and the capability catalogue
//!: atomic write-then-rename underneath every store,
//! and graceful behavior when a data directory hasn't been created yet.

pub mod atomic;
pub mod capabilities;
pub mod devices;
pub mod groups;

pub use atomic::{list_yaml_files, read_yaml, remove_if_exists, write_yaml_atomic};
pub use capabilities::{CapabilityStore, DeviceTypeHint, DeviceTypesStore, ParameterMappingStore};
pub use devices::DeviceStore;
pub use groups::{GroupStore, GROUPS_DIR_ENV};
