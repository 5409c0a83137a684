//! Discovery Engine (component C3): mDNS listening and active
//! HTTP probing, both optional and independently configurable, feeding a
//! single merged stream of `Device` records to the Registry.

use chrono::Utc;
use fleet_core::{Device, DiscoveryMethod, Generation};
use ipnetwork::IpNetwork;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use serde_json::Value;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const SHELLY_SERVICE_TYPE: &str = "_shelly._tcp.local.";

/// Tunables for one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Up to this many IPs are probed concurrently per chunk.
    pub chunk_size: usize,
    /// Connect timeout for the `/shelly` identification probe.
    pub probe_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// Parse one or more CIDR blocks / bare IPs into the flat address list an
/// HTTP probe walks. Accepts a comma-separated list of entries so a caller
/// can combine several subnets in one discovery run.
pub fn parse_targets(ranges: &str) -> fleet_core::Result<Vec<IpAddr>> {
    let mut out = Vec::new();
    for entry in ranges.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Ok(net) = entry.parse::<IpNetwork>() {
            match net {
                IpNetwork::V4(v4) => out.extend(v4.iter().map(IpAddr::V4)),
                IpNetwork::V6(v6) => out.extend(v6.iter().map(IpAddr::V6)),
            }
        } else if let Ok(ip) = entry.parse::<IpAddr>() {
            out.push(ip);
        } else {
            return Err(fleet_core::FleetError::InvalidRequest(format!(
                "not a CIDR block or IP address: {entry}"
            )));
        }
    }
    Ok(out)
}

/// Active HTTP-probe discovery: `GET http://{ip}/shelly` against every
/// target, in chunks of at most `config.chunk_size` so a chunk completes
/// before the next starts (boundary behavior: a /24 with one
/// responsive host finishes in chunk-time, not `timeout * 256`).
pub async fn probe_http(
    targets: &[IpAddr],
    config: &DiscoveryConfig,
    cancel: &CancellationToken,
) -> fleet_core::Result<Vec<Device>> {
    let client = reqwest::Client::builder()
        .connect_timeout(config.probe_timeout)
        .timeout(config.probe_timeout * 2)
        .build()
        .map_err(|e| fleet_core::FleetError::Internal(format!("failed to build probe client: {e}")))?;

    let mut found = Vec::new();
    for chunk in targets.chunks(config.chunk_size.max(1)) {
        if cancel.is_cancelled() {
            break;
        }
        let futures = chunk.iter().map(|ip| probe_one(&client, *ip, cancel));
        let results = futures::future::join_all(futures).await;
        found.extend(results.into_iter().flatten());
    }
    Ok(found)
}

async fn probe_one(client: &reqwest::Client, ip: IpAddr, cancel: &CancellationToken) -> Option<Device> {
    let url = format!("http://{ip}/shelly");
    let response = tokio::select! {
        biased;
        () = cancel.cancelled() => return None,
        result = client.get(&url).send() => result.ok()?,
    };
    if !response.status().is_success() {
        return None;
    }
    let body: Value = response.json().await.ok()?;
    classify_probe(&body, &ip.to_string())
}

/// Classify a `/shelly` identification response into a `Device`.
/// Gen1 has a `type` field; Gen2+ has an `app` field; anything else is
/// silently discarded (not a Shelly device, or an unsupported response).
pub fn classify_probe(body: &Value, ip: &str) -> Option<Device> {
    let mac = body.get("mac").and_then(Value::as_str)?;
    let id = Device::normalize_mac(mac);

    if let Some(app) = body.get("app").and_then(Value::as_str) {
        let generation = classify_gen2_generation(body, app);
        let fw = body
            .get("ver")
            .or_else(|| body.get("fw_id"))
            .and_then(Value::as_str)
            .map(str::to_string);
        return Some(Device {
            id,
            device_type: app.to_string(),
            generation,
            ip_address: Some(ip.to_string()),
            hostname: None,
            firmware_version: fw,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: Utc::now(),
            raw_info: body.clone(),
            auth: None,
        });
    }

    if let Some(device_type) = body.get("type").and_then(Value::as_str) {
        let fw = body.get("fw").and_then(Value::as_str).map(str::to_string);
        return Some(Device {
            id,
            device_type: device_type.to_string(),
            generation: Generation::Gen1,
            ip_address: Some(ip.to_string()),
            hostname: None,
            firmware_version: fw,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: Utc::now(),
            raw_info: body.clone(),
            auth: None,
        });
    }

    None
}

fn classify_gen2_generation(body: &Value, app: &str) -> Generation {
    match body.get("gen").and_then(|g| g.as_i64().or_else(|| g.as_str().and_then(|s| s.parse().ok()))) {
        Some(2) => Generation::Gen2,
        Some(3) => Generation::Gen3,
        Some(4) => Generation::Gen4,
        _ => Generation::from_app_prefix(app),
    }
}

/// mDNS listener: subscribes to `_shelly._tcp.local` and resolves
/// announcements into `Device` records until `cancel` fires or `timeout`
/// elapses, whichever comes first.
pub async fn listen_mdns(timeout: Duration, cancel: &CancellationToken) -> fleet_core::Result<Vec<Device>> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| fleet_core::FleetError::Internal(format!("failed to start mDNS daemon: {e}")))?;
    let receiver = daemon
        .browse(SHELLY_SERVICE_TYPE)
        .map_err(|e| fleet_core::FleetError::Internal(format!("failed to browse mDNS: {e}")))?;

    let mut by_mac: HashMap<String, Device> = HashMap::new();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = &mut deadline => break,
            event = receiver.recv_async() => {
                match event {
                    Ok(ServiceEvent::ServiceResolved(info)) => {
                        if let Some(device) = device_from_mdns(&info) {
                            by_mac.insert(device.id.clone(), device);
                        }
                    }
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }
    }

    let _ = daemon.shutdown();
    Ok(by_mac.into_values().collect())
}

fn device_from_mdns(info: &mdns_sd::ServiceInfo) -> Option<Device> {
    let props = info.get_properties();
    let mac = props
        .get("mac")
        .or_else(|| props.get("id"))
        .and_then(|p| p.val_str())?;
    let app = props
        .get("app")
        .or_else(|| props.get("model"))
        .and_then(|p| p.val_str())
        .unwrap_or("unknown");
    let fw = props
        .get("fw")
        .or_else(|| props.get("ver"))
        .and_then(|p| p.val_str())
        .map(str::to_string);
    let ip = info.get_addresses().iter().next().map(IpAddr::to_string);
    let generation = classify_gen2_generation(&Value::Null, app);

    Some(Device {
        id: Device::normalize_mac(mac),
        device_type: app.to_string(),
        generation,
        ip_address: ip,
        hostname: Some(info.get_fullname().to_string()),
        firmware_version: fw,
        name: None,
        discovery_method: DiscoveryMethod::Mdns,
        last_seen_at: Utc::now(),
        raw_info: Value::Null,
        auth: None,
    })
}

/// Merge an mDNS record with an HTTP-probe record for the same MAC: the
/// HTTP-probe result wins mutable fields (IP, firmware) because it is
/// authoritative at query time; the mDNS timestamp is retained if newer.
pub fn merge_discovered(mdns: Device, http_probe: Device) -> Device {
    let mut merged = http_probe;
    if mdns.last_seen_at > merged.last_seen_at {
        merged.last_seen_at = mdns.last_seen_at;
    }
    if merged.hostname.is_none() {
        merged.hostname = mdns.hostname;
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_gen1_response_by_type_field() {
        let body = serde_json::json!({"type": "SHPLG-S", "mac": "e8:68:e7:ea:63:33", "fw": "1.11.0", "auth": false});
        let device = classify_probe(&body, "192.168.1.100").unwrap();
        assert_eq!(device.id, "E868E7EA6333");
        assert_eq!(device.generation, Generation::Gen1);
        assert_eq!(device.device_type, "SHPLG-S");
    }

    #[test]
    fn classifies_gen2_response_by_app_field_and_explicit_gen() {
        let body = serde_json::json!({"app": "Plus1PM", "gen": 2, "mac": "AABBCCDDEEFF", "ver": "1.0.0"});
        let device = classify_probe(&body, "192.168.0.7").unwrap();
        assert_eq!(device.generation, Generation::Gen2);
        assert_eq!(device.device_type, "Plus1PM");
    }

    #[test]
    fn infers_generation_from_app_prefix_when_gen_field_absent() {
        let body = serde_json::json!({"app": "S3DM-0A101WW", "mac": "AABBCCDDEE11"});
        let device = classify_probe(&body, "192.168.0.8").unwrap();
        assert_eq!(device.generation, Generation::Gen3);
    }

    #[test]
    fn discards_responses_with_neither_type_nor_app() {
        let body = serde_json::json!({"mac": "AABBCCDDEE11", "unrelated": true});
        assert!(classify_probe(&body, "192.168.0.9").is_none());
    }

    #[test]
    fn parses_cidr_and_bare_ip_targets() {
        let targets = parse_targets("192.168.1.0/30, 10.0.0.5").unwrap();
        assert_eq!(targets.len(), 5);
    }

    #[test]
    fn merge_prefers_http_probe_ip_and_keeps_newer_mdns_timestamp() {
        let mut mdns = sample_device("HTTP-OLD");
        mdns.last_seen_at = Utc::now() + chrono::Duration::seconds(60);
        let http = sample_device("HTTP-NEW");
        let merged = merge_discovered(mdns.clone(), http.clone());
        assert_eq!(merged.ip_address, http.ip_address);
        assert_eq!(merged.last_seen_at, mdns.last_seen_at);
    }

    fn sample_device(tag: &str) -> Device {
        Device {
            id: "E868E7EA6333".to_string(),
            device_type: tag.to_string(),
            generation: Generation::Gen1,
            ip_address: Some("192.168.1.100".to_string()),
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: Utc::now(),
            raw_info: Value::Null,
            auth: None,
        }
    }
}
