//! Transport Client (component C1).
//!
//! Two primitives against a single device: [`Transport::gen1_call`] for
//! legacy REST and [`Transport::gen2_call`] for JSON-RPC over `/rpc`. Both
//! share timeout/retry/cancellation handling; callers never see the
//! difference between a connection failure and a timeout beyond what
//! `error_kind` reports.

use fleet_core::{Device, FleetError};
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Tunables for the Transport Client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub timeout: Duration,
    pub retry_backoff: Duration,
    pub idle_pool_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_millis(250),
            idle_pool_timeout: Duration::from_secs(30),
        }
    }
}

/// A single Gen1 REST call's outcome: the raw JSON body and the HTTP status.
#[derive(Debug, Clone)]
pub struct Gen1Response {
    pub body: Value,
    pub status: u16,
}

/// The Transport Client. One instance is shared process-wide; `reqwest`
/// pools connections per host internally, matching the per-host pooling
/// this system calls for.
pub struct Transport {
    http: reqwest::Client,
    config: TransportConfig,
    rpc_id: AtomicI64,
}

impl Transport {
    pub fn new(config: TransportConfig) -> fleet_core::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(config.idle_pool_timeout)
            .build()
            .map_err(|e| FleetError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            rpc_id: AtomicI64::new(1),
        })
    }

    /// Issue `GET http://{ip}/{subpath}[?query]`. Gen1 writes are GETs with
    /// query parameters — this is the vendor convention the Engine must
    /// respect.
    #[tracing::instrument(level = "debug", skip(self, cancel), fields(device = %device.id, subpath))]
    pub async fn gen1_call(
        &self,
        device: &Device,
        subpath: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
    ) -> fleet_core::Result<Gen1Response> {
        let ip = device
            .ip_address
            .as_ref()
            .ok_or_else(|| FleetError::Unreachable(device.id.clone()))?;
        let url = format!("http://{ip}/{subpath}");

        let response = self
            .with_retry(cancel, || {
                let mut request = self.http.get(&url).query(query);
                if let Some(creds) = &device.auth {
                    request = request.basic_auth(&creds.username, Some(&creds.password));
                }
                request
            })
            .await?;

        let status = response.status().as_u16();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status >= 400 {
            return Err(classify_http_error(status, &body));
        }
        Ok(Gen1Response { body, status })
    }

    /// `POST http://{ip}/rpc` with `{"id", "method", "params"}`. A JSON-RPC
    /// error object is distinct from an HTTP failure.
    #[tracing::instrument(level = "debug", skip(self, params, cancel), fields(device = %device.id, method))]
    pub async fn gen2_call(
        &self,
        device: &Device,
        method: &str,
        params: Option<Value>,
        cancel: &CancellationToken,
    ) -> fleet_core::Result<Value> {
        let ip = device
            .ip_address
            .as_ref()
            .ok_or_else(|| FleetError::Unreachable(device.id.clone()))?;
        let url = format!("http://{ip}/rpc");
        let id = self.rpc_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .with_retry(cancel, || {
                let mut request = self.http.post(&url).json(&body);
                if let Some(creds) = &device.auth {
                    request = request.basic_auth(&creds.username, Some(&creds.password));
                }
                request
            })
            .await?;

        let status = response.status().as_u16();
        let envelope: Value = response.json().await.unwrap_or(Value::Null);
        if status >= 400 && envelope.get("error").is_none() {
            return Err(FleetError::HttpError(status));
        }
        if let Some(error) = envelope.get("error") {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(-1);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error")
                .to_string();
            return Err(FleetError::DeviceError { code, message });
        }
        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }

    /// One automatic retry on connection-refused or timeout with a fixed
    /// backoff; never on 4xx (handled by the caller after the response
    /// lands) and never on RPC `-104`-class errors (those are already a
    /// successful HTTP round-trip, so they never reach this layer).
    async fn with_retry<F>(
        &self,
        cancel: &CancellationToken,
        build: F,
    ) -> fleet_core::Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let attempt = |builder: reqwest::RequestBuilder| async move { builder.send().await };

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FleetError::Cancelled),
            result = attempt(build()) => {
                match result {
                    Ok(response) => Ok(response),
                    Err(first_err) if is_retryable(&first_err) => {
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => Err(FleetError::Cancelled),
                            () = tokio::time::sleep(self.config.retry_backoff) => {
                                attempt(build()).await.map_err(|e| classify_transport_error(&e))
                            }
                        }
                    }
                    Err(e) => Err(classify_transport_error(&e)),
                }
            }
        }
    }
}

fn is_retryable(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}

fn classify_transport_error(err: &reqwest::Error) -> FleetError {
    if err.is_timeout() {
        FleetError::Timeout
    } else {
        FleetError::Unreachable(err.to_string())
    }
}

fn classify_http_error(status: u16, body: &Value) -> FleetError {
    if let Some(message) = body.get("error").and_then(Value::as_str) {
        FleetError::DeviceError {
            code: status as i64,
            message: message.to_string(),
        }
    } else {
        FleetError::HttpError(status)
    }
}

/// Time an async transport call, for `OperationResult.duration`.
pub async fn timed<F, T>(future: F) -> (Duration, T)
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let result = future.await;
    (start.elapsed(), result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DiscoveryMethod, Generation};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn device_at(addr: &str) -> Device {
        Device {
            id: "E868E7EA6333".to_string(),
            device_type: "SHPLG-S".to_string(),
            generation: Generation::Gen1,
            ip_address: Some(addr.to_string()),
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::Manual,
            last_seen_at: chrono::Utc::now(),
            raw_info: Value::Null,
            auth: None,
        }
    }

    #[tokio::test]
    async fn gen1_write_sends_lowercase_boolean_literal() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/settings"))
            .and(query_param("eco_mode_enabled", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"eco_mode_enabled": true})))
            .mount(&server)
            .await;

        let transport = Transport::new(TransportConfig::default()).unwrap();
        let device = device_at(&server.address().to_string());
        let cancel = CancellationToken::new();
        let response = transport
            .gen1_call(&device, "settings", &[("eco_mode_enabled".to_string(), "true".to_string())], &cancel)
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn gen2_call_surfaces_rpc_error_distinctly_from_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 1,
                "error": {"code": -103, "message": "invalid argument"}
            })))
            .mount(&server)
            .await;

        let transport = Transport::new(TransportConfig::default()).unwrap();
        let device = device_at(&server.address().to_string());
        let cancel = CancellationToken::new();
        let err = transport
            .gen2_call(&device, "Switch.Set", Some(serde_json::json!({"id": 0})), &cancel)
            .await
            .unwrap_err();
        match err {
            FleetError::DeviceError { code, .. } => assert_eq!(code, -103),
            other => panic!("expected DeviceError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_the_request_completes() {
        let transport = Transport::new(TransportConfig::default()).unwrap();
        let device = device_at("192.0.2.1:80"); // TEST-NET-1, never routable
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = transport
            .gen2_call(&device, "Shelly.GetStatus", None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Cancelled));
    }
}
