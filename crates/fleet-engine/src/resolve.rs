//! Logical-name resolution (the "Resolution order"): the
//! `CapabilityDefinition` wins if it declares the name; otherwise the
//! process-wide `ParameterMapping` is consulted for a generation-specific
//! access recipe; otherwise the name is unsupported.

use fleet_core::{Device, FleetError, ParameterDescriptor, ParameterMapping};

/// Resolve `logical_name` for `device`, consulting `definition` (if any)
/// before the shared `mapping`.
pub fn resolve(
    definition: Option<&fleet_core::CapabilityDefinition>,
    mapping: &ParameterMapping,
    device: &Device,
    logical_name: &str,
) -> fleet_core::Result<ParameterDescriptor> {
    if let Some(def) = definition {
        if let Some(descriptor) = def.parameters.get(logical_name) {
            return Ok(descriptor.clone());
        }
    }

    if let Some(entry) = mapping.get(logical_name) {
        if !device.generation.is_rpc() {
            if let Some(gen1) = &entry.gen1 {
                return Ok(ParameterDescriptor {
                    ty: entry.ty,
                    description: String::new(),
                    read_only: false,
                    api: gen1.endpoint.clone(),
                    parameter_path: gen1.property.clone(),
                    min: None,
                    max: None,
                    enum_values: Vec::new(),
                    unit: None,
                    default: None,
                    component: None,
                    requires_restart: entry.requires_restart,
                });
            }
        } else if let Some(gen2) = &entry.gen2 {
            return Ok(ParameterDescriptor {
                ty: entry.ty,
                description: String::new(),
                read_only: false,
                api: gen2.method.clone(),
                parameter_path: gen2.property.clone(),
                min: None,
                max: None,
                enum_values: Vec::new(),
                unit: None,
                default: None,
                component: gen2.component.clone(),
                requires_restart: entry.requires_restart,
            });
        }
    }

    Err(FleetError::UnsupportedParameter(logical_name.to_string()))
}

/// The Getter method corresponding to a Setter, per the fixed table below
/// (`Sys.SetConfig → Sys.GetConfig`, `Shelly.SetConfig → Shelly.GetConfig`).
/// Every observed setter in this wire protocol follows the same
/// `<Component>.SetConfig` → `<Component>.GetConfig` pattern.
pub fn getter_for_setter(api: &str) -> String {
    api.replacen("SetConfig", "GetConfig", 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DiscoveryMethod, Gen1Access, Gen2Access, Generation, MappingEntry, ParameterType};

    fn sample_device(generation: Generation) -> Device {
        Device {
            id: "AABBCCDDEEFF".to_string(),
            device_type: "SHPLG-S".to_string(),
            generation,
            ip_address: Some("192.168.1.100".to_string()),
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: chrono::Utc::now(),
            raw_info: serde_json::Value::Null,
            auth: None,
        }
    }

    fn eco_mode_mapping() -> ParameterMapping {
        ParameterMapping::new(vec![MappingEntry {
            canonical_name: "eco_mode".to_string(),
            legacy_gen1_names: vec!["eco_mode_enabled".to_string()],
            gen1: Some(Gen1Access { endpoint: "settings".to_string(), property: "eco_mode_enabled".to_string() }),
            gen2: Some(Gen2Access { method: "Sys.SetConfig".to_string(), component: Some("device".to_string()), property: "eco_mode".to_string() }),
            ty: ParameterType::Boolean,
            requires_restart: false,
        }])
    }

    #[test]
    fn resolves_via_mapping_when_no_capability_definition_present() {
        let mapping = eco_mode_mapping();
        let device = sample_device(Generation::Gen1);
        let descriptor = resolve(None, &mapping, &device, "eco_mode").unwrap();
        assert_eq!(descriptor.api, "settings");
        assert_eq!(descriptor.parameter_path, "eco_mode_enabled");
    }

    #[test]
    fn resolves_gen2_branch_for_rpc_devices() {
        let mapping = eco_mode_mapping();
        let device = sample_device(Generation::Gen2);
        let descriptor = resolve(None, &mapping, &device, "eco_mode").unwrap();
        assert_eq!(descriptor.api, "Sys.SetConfig");
        assert_eq!(descriptor.component.as_deref(), Some("device"));
    }

    #[test]
    fn unknown_name_fails_unsupported_parameter() {
        let mapping = ParameterMapping::new(Vec::new());
        let device = sample_device(Generation::Gen1);
        let err = resolve(None, &mapping, &device, "nonexistent").unwrap_err();
        assert!(matches!(err, FleetError::UnsupportedParameter(_)));
    }

    #[test]
    fn setter_to_getter_name_swap() {
        assert_eq!(getter_for_setter("Sys.SetConfig"), "Sys.GetConfig");
        assert_eq!(getter_for_setter("Shelly.SetConfig"), "Shelly.GetConfig");
    }
}
