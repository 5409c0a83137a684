//! Capability discovery: probes one representative device and
//! generalizes its observed response shapes into a [`CapabilityDefinition`].

use chrono::Utc;
use fleet_core::capability::{ApiDescriptor, FieldSchema};
use fleet_core::{CapabilityDefinition, Device, ParameterDescriptor, ParameterType};
use fleet_net::Transport;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Fixed Gen1 probe set. Each 200 response becomes an API; each
/// leaf field becomes a parameter.
const GEN1_PROBES: &[&str] = &[
    "shelly",
    "settings",
    "status",
    "settings/relay/0",
    "settings/light/0",
    "settings/roller/0",
    "settings/actions",
    "settings/ap",
    "settings/mqtt",
    "settings/cloud",
    "settings/device",
    "settings/network",
    "settings/login",
    "settings/webhooks",
];

/// Gen2+ probe sequence: identity, then config, then status,
/// then the fixed set of per-component getters.
const GEN2_PROBES: &[&str] = &[
    "Shelly.GetDeviceInfo",
    "Shelly.GetConfig",
    "Shelly.GetStatus",
    "Sys.GetStatus",
    "Cloud.GetConfig",
    "MQTT.GetConfig",
    "WiFi.GetConfig",
    "BLE.GetConfig",
    "Script.List",
    "Schedule.List",
];

/// Field names forced `read_only` regardless of the endpoint they came from
///. `build_info` matches any sub-field (`build_info.build_id`, …).
const FORCED_READ_ONLY: &[&str] = &["mac", "fw", "ssid", "uptime"];

fn is_forced_read_only(field_name: &str) -> bool {
    FORCED_READ_ONLY.contains(&field_name) || field_name.starts_with("build_info")
}

/// Probe `device` and build a fresh [`CapabilityDefinition`] for its
/// `device_type`. Dispatches on generation; never mutates the catalogue
/// itself — the caller swaps in a new snapshot atomically.
pub async fn discover(
    transport: &Transport,
    device: &Device,
    cancel: &CancellationToken,
) -> fleet_core::Result<CapabilityDefinition> {
    if device.generation.is_rpc() {
        discover_gen2(transport, device, cancel).await
    } else {
        discover_gen1(transport, device, cancel).await
    }
}

async fn discover_gen1(
    transport: &Transport,
    device: &Device,
    cancel: &CancellationToken,
) -> fleet_core::Result<CapabilityDefinition> {
    let mut apis = BTreeMap::new();
    let mut parameters = BTreeMap::new();

    for &endpoint in GEN1_PROBES {
        let response = match transport.gen1_call(device, endpoint, &[], cancel).await {
            Ok(r) if r.status == 200 => r,
            Ok(_) | Err(_) => continue,
        };
        if !response.body.is_object() {
            continue;
        }
        let fields = object_field_schema(&response.body);
        apis.insert(
            endpoint.to_string(),
            ApiDescriptor {
                description: format!("Gen1 REST endpoint /{endpoint}"),
                response_structure: fields,
            },
        );

        let read_only_endpoint = endpoint == "status";
        let mut leaves = Vec::new();
        flatten_leaves(&response.body, "", &mut leaves);
        for (path, value) in leaves {
            let last = path.rsplit('.').next().unwrap_or(&path).to_string();
            let entry = ParameterDescriptor {
                ty: infer_parameter_type(&value),
                description: String::new(),
                read_only: read_only_endpoint || is_forced_read_only(&last),
                api: endpoint.to_string(),
                parameter_path: path.clone(),
                min: None,
                max: None,
                enum_values: Vec::new(),
                unit: None,
                default: None,
                component: None,
                requires_restart: false,
            };
            parameters.insert(format!("{endpoint}.{path}"), entry);
        }
    }

    Ok(CapabilityDefinition {
        device_type: device.device_type.clone(),
        name: device.device_type.clone(),
        generation: device.generation,
        type_mappings: Vec::new(),
        apis,
        parameters,
        discovered_at: Some(Utc::now()),
    })
}

async fn discover_gen2(
    transport: &Transport,
    device: &Device,
    cancel: &CancellationToken,
) -> fleet_core::Result<CapabilityDefinition> {
    let mut apis = BTreeMap::new();
    let mut parameters = BTreeMap::new();
    let mut config_result = None;

    for &method in GEN2_PROBES {
        let result = match transport.gen2_call(device, method, None, cancel).await {
            Ok(v) => v,
            Err(_) => continue,
        };
        apis.insert(
            method.to_string(),
            ApiDescriptor {
                description: format!("Gen2+ RPC method {method}"),
                response_structure: object_field_schema(&result),
            },
        );
        if method == "Shelly.GetConfig" {
            config_result = Some(result);
        }
    }

    if let Some(Value::Object(components)) = config_result {
        for (component, value) in components {
            let setter = setter_for_component(&component);
            let mut leaves = Vec::new();
            flatten_leaves(&value, "", &mut leaves);
            for (path, leaf) in leaves {
                let last = path.rsplit('.').next().unwrap_or(&path).to_string();
                let entry = ParameterDescriptor {
                    ty: infer_parameter_type(&leaf),
                    description: String::new(),
                    read_only: is_forced_read_only(&last),
                    api: setter.clone(),
                    parameter_path: path.clone(),
                    min: None,
                    max: None,
                    enum_values: Vec::new(),
                    unit: None,
                    default: None,
                    component: Some(component.clone()),
                    requires_restart: false,
                };
                parameters.insert(format!("{component}.{path}"), entry);
            }
        }
    }

    Ok(CapabilityDefinition {
        device_type: device.device_type.clone(),
        name: device.device_type.clone(),
        generation: device.generation,
        type_mappings: Vec::new(),
        apis,
        parameters,
        discovered_at: Some(Utc::now()),
    })
}

/// The `*.SetConfig` method that writes back a component key observed under
/// `Shelly.GetConfig` (`switch:0` → `Switch.SetConfig`, `sys` → `Sys.SetConfig`).
fn setter_for_component(component: &str) -> String {
    let base = component.split(':').next().unwrap_or(component);
    let mut chars = base.chars();
    let capitalized = match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    };
    format!("{capitalized}.SetConfig")
}

/// JSON type → [`ParameterType`] inference at observation time:
/// a literal `null` is recorded as `null` and treated as nullable downstream.
fn infer_parameter_type(value: &Value) -> ParameterType {
    match value {
        Value::Null => ParameterType::Null,
        Value::Bool(_) => ParameterType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ParameterType::Integer,
        Value::Number(_) => ParameterType::Float,
        Value::String(_) => ParameterType::String,
        Value::Array(_) => ParameterType::Array,
        Value::Object(_) => ParameterType::Object,
    }
}

/// Recursively flatten an object/array into dotted/indexed leaf paths
/// matching the syntax `fleet_core::path` parses (`switch:0.in_mode`,
/// `valves[0].state`). Non-leaf containers are not emitted themselves.
fn flatten_leaves(value: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, v) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_leaves(v, &path, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                let path = format!("{prefix}[{i}]");
                flatten_leaves(v, &path, out);
            }
        }
        leaf => {
            if !prefix.is_empty() {
                out.push((prefix.to_string(), leaf.clone()));
            }
        }
    }
}

/// Build the top-level `response_structure` map for an [`ApiDescriptor`]:
/// one [`FieldSchema`] per top-level field, recursing into nested
/// objects/arrays.
fn object_field_schema(value: &Value) -> BTreeMap<String, FieldSchema> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (k.clone(), field_schema_of(v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn field_schema_of(value: &Value) -> FieldSchema {
    match value {
        Value::Object(map) => FieldSchema::Object {
            fields: map.iter().map(|(k, v)| (k.clone(), field_schema_of(v))).collect(),
        },
        Value::Array(items) => {
            let element = items
                .first()
                .map(field_schema_of)
                .unwrap_or(FieldSchema::leaf(ParameterType::Null));
            FieldSchema::Array { element: Box::new(element) }
        }
        leaf => FieldSchema::leaf(infer_parameter_type(leaf)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattens_nested_object_into_dotted_paths() {
        let value = serde_json::json!({"mqtt": {"enable": true, "server": "broker:1883"}});
        let mut leaves = Vec::new();
        flatten_leaves(&value, "", &mut leaves);
        let paths: Vec<&str> = leaves.iter().map(|(p, _)| p.as_str()).collect();
        assert!(paths.contains(&"mqtt.enable"));
        assert!(paths.contains(&"mqtt.server"));
    }

    #[test]
    fn flattens_array_elements_with_bracket_index() {
        let value = serde_json::json!({"valves": [{"state": "open"}]});
        let mut leaves = Vec::new();
        flatten_leaves(&value, "", &mut leaves);
        assert!(leaves.iter().any(|(p, _)| p == "valves[0].state"));
    }

    #[test]
    fn derives_setconfig_method_from_indexed_component() {
        assert_eq!(setter_for_component("switch:0"), "Switch.SetConfig");
        assert_eq!(setter_for_component("sys"), "Sys.SetConfig");
    }

    #[test]
    fn forces_read_only_for_known_patterns() {
        assert!(is_forced_read_only("mac"));
        assert!(is_forced_read_only("build_info"));
        assert!(!is_forced_read_only("eco_mode"));
    }
}
