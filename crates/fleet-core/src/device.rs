//! The `Device` record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware/firmware generation. Determines which Transport dialect applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    Gen1,
    Gen2,
    Gen3,
    Gen4,
}

impl Generation {
    /// Gen1 speaks legacy REST; everything else speaks JSON-RPC over `/rpc`.
    pub const fn is_rpc(self) -> bool {
        !matches!(self, Self::Gen1)
    }

    /// Classify a generation from a Gen2+ `app`/model prefix, here.
    pub fn from_app_prefix(prefix: &str) -> Self {
        let upper = prefix.to_ascii_uppercase();
        if upper.starts_with("S4") {
            Self::Gen4
        } else if upper.starts_with("S3") {
            Self::Gen3
        } else {
            Self::Gen2
        }
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gen1 => "gen1",
            Self::Gen2 => "gen2",
            Self::Gen3 => "gen3",
            Self::Gen4 => "gen4",
        };
        f.write_str(s)
    }
}

/// How a `Device` record came to exist in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMethod {
    Mdns,
    HttpProbe,
    Manual,
}

/// Optional HTTP credentials for a device that requires auth on the wire.
///
/// Gen1 devices that report `"auth": true` in `/shelly` expect HTTP Basic;
/// Gen2+ devices that enable auth expect HTTP Digest. Carried here as an
/// optional, generation-agnostic credential pair that `fleet-net`
/// interprets per dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCredentials {
    pub username: String,
    pub password: String,
}

/// A single known Shelly device. Identity is the MAC address, uppercased,
/// with no separators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// MAC address, uppercased, no separators. Unique across the registry.
    pub id: String,
    /// Vendor SKU string (e.g. `SHPLG-S`, `Plus1PM`, `SNSW-001X16EU`).
    pub device_type: String,
    pub generation: Generation,
    /// Absent means "known but unreachable": operations fail fast.
    pub ip_address: Option<String>,
    pub hostname: Option<String>,
    pub firmware_version: Option<String>,
    /// Mutable, user-set on the device itself.
    pub name: Option<String>,
    pub discovery_method: DiscoveryMethod,
    pub last_seen_at: DateTime<Utc>,
    /// Free-form snapshot of the device's identification endpoint response.
    #[serde(default)]
    pub raw_info: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<DeviceCredentials>,
}

impl Device {
    /// Normalize a raw MAC-like string into the canonical `id` form:
    /// uppercased, separators stripped.
    pub fn normalize_mac(raw: &str) -> String {
        raw.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase()
    }

    /// A device is reachable iff it has a known IP address.
    pub fn is_reachable(&self) -> bool {
        self.ip_address.is_some()
    }

    /// The filename this device persists under: `<device_type>_<MAC>.yaml`.
    pub fn filename(&self) -> String {
        format!("{}_{}.yaml", sanitize_filename_component(&self.device_type), self.id)
    }
}

/// Replace characters that are unsafe in a filename with `_`, mirroring the
/// same treatment the same rule mandates for `Group::name`.
pub fn sanitize_filename_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_mac_with_separators() {
        assert_eq!(Device::normalize_mac("e8:68:e7:ea:63:33"), "E868E7EA6333");
    }

    #[test]
    fn classifies_generation_from_prefix() {
        assert_eq!(Generation::from_app_prefix("S1"), Generation::Gen2);
        assert_eq!(Generation::from_app_prefix("S3DM"), Generation::Gen3);
        assert_eq!(Generation::from_app_prefix("S4SW"), Generation::Gen4);
    }

    #[test]
    fn sanitizes_unsafe_filename_chars() {
        assert_eq!(sanitize_filename_component("kitchen lights!"), "kitchen_lights_");
    }

    #[test]
    fn round_trips_through_yaml_the_same_format_fleet_storage_persists() {
        let device = Device {
            id: "E868E7EA6333".to_string(),
            device_type: "SHPLG-S".to_string(),
            generation: Generation::Gen1,
            ip_address: Some("192.168.1.100".to_string()),
            hostname: None,
            firmware_version: Some("1.11.0".to_string()),
            name: Some("Kitchen Plug".to_string()),
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: Utc::now(),
            raw_info: serde_json::json!({"type": "SHPLG-S"}),
            auth: None,
        };
        let yaml = serde_yaml::to_string(&device).unwrap();
        let reloaded: Device = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(reloaded.id, device.id);
        assert_eq!(reloaded.generation, device.generation);
        assert_eq!(reloaded.name, device.name);
        assert!(!yaml.contains("auth:"), "None auth field should be omitted, not written as null");
    }
}
