//! Read and write paths: JSON pointer navigation, type
//! coercion, and the Gen2+ nested-params construction rules.

use fleet_core::{path, Device, FleetError, ParameterDescriptor};
use fleet_net::Transport;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// Read `descriptor`'s value off the wire and coerce it to its declared
/// type.
pub async fn read(
    transport: &Transport,
    device: &Device,
    descriptor: &ParameterDescriptor,
    cancel: &CancellationToken,
) -> fleet_core::Result<Value> {
    let payload = if device.generation.is_rpc() {
        let getter = crate::resolve::getter_for_setter(&descriptor.api);
        transport.gen2_call(device, &getter, Some(Value::Object(Map::new())), cancel).await?
    } else {
        transport.gen1_call(device, &descriptor.api, &[], cancel).await?.body
    };

    let mut scope = &payload;
    let component_holder;
    if let Some(component) = &descriptor.component {
        component_holder = path::get_path(&payload, component)?.clone();
        scope = &component_holder;
    }
    let leaf = path::get_path(scope, &descriptor.parameter_path)?;
    path::coerce(leaf, descriptor.ty)
}

/// Encode and dispatch a write for `descriptor`. Returns the raw response
/// payload (so the caller can inspect `restart_required`/`error`).
pub async fn write(
    transport: &Transport,
    device: &Device,
    descriptor: &ParameterDescriptor,
    value: &Value,
    cancel: &CancellationToken,
) -> fleet_core::Result<Value> {
    path::reject_on_off_literal(value)?;
    let coerced = path::coerce(value, descriptor.ty)?;

    if device.generation.is_rpc() {
        write_gen2(transport, device, descriptor, coerced, cancel).await
    } else {
        write_gen1(transport, device, descriptor, &coerced, cancel).await
    }
}

async fn write_gen1(
    transport: &Transport,
    device: &Device,
    descriptor: &ParameterDescriptor,
    value: &Value,
    cancel: &CancellationToken,
) -> fleet_core::Result<Value> {
    let key = path::last_key(&descriptor.parameter_path).unwrap_or_else(|| descriptor.parameter_path.clone());
    let encoded = path::encode_gen1_query_value(value)?;
    let response = transport.gen1_call(device, &descriptor.api, &[(key, encoded)], cancel).await?;
    if let Some(message) = response.body.get("error").and_then(Value::as_str) {
        return Err(FleetError::DeviceError { code: -1, message: message.to_string() });
    }
    Ok(response.body)
}

async fn write_gen2(
    transport: &Transport,
    device: &Device,
    descriptor: &ParameterDescriptor,
    value: Value,
    cancel: &CancellationToken,
) -> fleet_core::Result<Value> {
    let mut leaf_container = Value::Object(Map::new());
    path::set_path(&mut leaf_container, &descriptor.parameter_path, value);

    let params = match &descriptor.component {
        Some(component) if component.contains(':') => {
            let (_, index) = component.split_once(':').expect("contains ':'");
            let id: i64 = index.parse().unwrap_or(0);
            serde_json::json!({ "id": id, "config": leaf_container })
        }
        Some(component) => {
            let mut config = Map::new();
            config.insert(component.clone(), leaf_container);
            serde_json::json!({ "config": Value::Object(config) })
        }
        None => serde_json::json!({ "config": leaf_container }),
    };

    transport.gen2_call(device, &descriptor.api, Some(params), cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ParameterType;

    fn descriptor(api: &str, component: Option<&str>, path: &str) -> ParameterDescriptor {
        ParameterDescriptor {
            ty: ParameterType::Boolean,
            description: String::new(),
            read_only: false,
            api: api.to_string(),
            parameter_path: path.to_string(),
            min: None,
            max: None,
            enum_values: Vec::new(),
            unit: None,
            default: None,
            component: component.map(str::to_string),
            requires_restart: false,
        }
    }

    #[tokio::test]
    async fn gen2_write_nests_under_named_component() {
        let descriptor = descriptor("Sys.SetConfig", Some("device"), "eco_mode");
        let mut leaf = Value::Object(Map::new());
        fleet_core::path::set_path(&mut leaf, &descriptor.parameter_path, Value::Bool(true));
        let params = match &descriptor.component {
            Some(c) if c.contains(':') => unreachable!(),
            Some(c) => {
                let mut config = Map::new();
                config.insert(c.clone(), leaf);
                serde_json::json!({ "config": Value::Object(config) })
            }
            None => unreachable!(),
        };
        assert_eq!(params, serde_json::json!({"config": {"device": {"eco_mode": true}}}));
    }

    #[tokio::test]
    async fn gen2_write_uses_id_for_indexed_component() {
        let descriptor = descriptor("Switch.SetConfig", Some("switch:0"), "in_mode");
        let mut leaf = Value::Object(Map::new());
        fleet_core::path::set_path(&mut leaf, &descriptor.parameter_path, Value::String("follow".to_string()));
        let (_, index) = descriptor.component.as_deref().unwrap().split_once(':').unwrap();
        let params = serde_json::json!({ "id": index.parse::<i64>().unwrap(), "config": leaf });
        assert_eq!(params, serde_json::json!({"id": 0, "config": {"in_mode": "follow"}}));
    }
}
