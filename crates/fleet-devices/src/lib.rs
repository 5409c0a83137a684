//! Capability Catalogue (C2), Discovery Engine (C3), and Device Registry
//! (C4).

pub mod capability_discovery;
pub mod catalogue;
pub mod discovery;
pub mod registry;

pub use catalogue::{Catalogue, RefreshOptions};
pub use discovery::{classify_probe, listen_mdns, merge_discovered, parse_targets, probe_http, DiscoveryConfig};
pub use registry::Registry;
