//! Parameter / Operation Engine (component C5) — the semantic
//! heart of the control plane. A single code path parameterized by
//! generation (design note), not a Gen1/Gen2 class hierarchy.

use crate::control;
use crate::resolve;
use crate::rw;
use fleet_core::{Device, FleetError, OperationResult};
use fleet_devices::{Catalogue, Registry};
use fleet_net::{timed, Transport};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tunables for reboot coordination.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub reboot_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { reboot_grace: Duration::from_secs(10) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    pub reboot_if_needed: bool,
}

/// Whether `update_firmware` should wait and poll for completion. Resolved
/// as an explicit, undefaulted option rather than inferred behavior: the
/// verb dispatches-and-returns unless the caller opts into polling.
#[derive(Debug, Clone, Copy)]
pub struct UpdateFirmwareOptions {
    pub poll: bool,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for UpdateFirmwareOptions {
    fn default() -> Self {
        Self { poll: false, poll_interval: Duration::from_secs(5), poll_timeout: Duration::from_secs(120) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OperateOptions {
    pub reboot_if_needed: bool,
    pub update_firmware: Option<UpdateFirmwareOptionsMarker>,
}

/// Marker carrying `UpdateFirmwareOptions` only for the `update_firmware`
/// verb; ignored by every other verb.
#[derive(Debug, Clone, Copy)]
pub struct UpdateFirmwareOptionsMarker(pub UpdateFirmwareOptions);

/// The traversal a single operation makes (the "State machine").
/// `Succeeded + MaybeRebooting` is the only state allowed to re-enter
/// network I/O; every other terminal state is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    Resolving,
    Dispatching,
    AwaitingResponse,
    Succeeded,
    Failed,
    Cancelled,
    MaybeRebooting,
    Finalized,
}

#[derive(Clone)]
pub struct Engine {
    transport: Arc<Transport>,
    catalogue: Arc<Catalogue>,
    registry: Arc<Registry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(transport: Arc<Transport>, catalogue: Arc<Catalogue>, registry: Arc<Registry>, config: EngineConfig) -> Self {
        Self { transport, catalogue, registry, config }
    }

    async fn device_or_err(&self, device_id: &str) -> fleet_core::Result<Device> {
        self.registry.get(device_id).await.ok_or_else(|| FleetError::UnknownDevice(device_id.to_string()))
    }

    /// `get(device, logicalName) -> (value, meta)`.
    pub async fn get(
        &self,
        device_id: &str,
        logical_name: &str,
        cancel: &CancellationToken,
    ) -> fleet_core::Result<(Value, fleet_core::ParameterDescriptor)> {
        tracing::debug!(state = ?OperationState::Pending, device = device_id, logical_name, "get");
        let device = self.device_or_err(device_id).await?;
        if !device.is_reachable() {
            return Err(FleetError::Unreachable(device_id.to_string()));
        }

        let definition = self.catalogue.resolve(&device).await;
        let mapping = self.catalogue.parameter_mapping().await;
        tracing::debug!(state = ?OperationState::Resolving, device = device_id, "get");
        let descriptor = resolve::resolve(definition.as_ref(), &mapping, &device, logical_name)?;

        tracing::debug!(state = ?OperationState::Dispatching, device = device_id, "get");
        let value = rw::read(&self.transport, &device, &descriptor, cancel).await?;
        tracing::debug!(state = ?OperationState::Succeeded, device = device_id, "get");
        Ok((value, descriptor))
    }

    /// `set(device, logicalName, value, opts) -> OperationResult`.
    pub async fn set(
        &self,
        device_id: &str,
        logical_name: &str,
        value: Value,
        opts: SetOptions,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let summary = format!("set {logical_name}");
        let (duration, outcome) = timed(self.try_set(device_id, logical_name, &value, opts, cancel)).await;

        match outcome {
            Ok((reboot_required, warning)) => {
                let mut result = OperationResult::success(device_id.to_string(), &summary, "ok", duration)
                    .with_reboot_required(reboot_required);
                if let Some(warning) = warning {
                    result = result.with_warning(warning);
                }
                result
            }
            Err(err) => OperationResult::failure(device_id.to_string(), summary, duration, &err),
        }
    }

    /// The uncounted core of `set`: resolves, writes, and (if asked)
    /// reboots, but leaves `OperationResult` bookkeeping to the caller.
    /// Exposed so the Group Executor's bulk setter can chain several writes
    /// under one timing/aggregation envelope instead of one per parameter.
    pub async fn try_set(
        &self,
        device_id: &str,
        logical_name: &str,
        value: &Value,
        opts: SetOptions,
        cancel: &CancellationToken,
    ) -> fleet_core::Result<(bool, Option<String>)> {
        let device = self.device_or_err(device_id).await?;
        if !device.is_reachable() {
            return Err(FleetError::Unreachable(device_id.to_string()));
        }

        let definition = self.catalogue.resolve(&device).await;
        let mapping = self.catalogue.parameter_mapping().await;
        let descriptor = resolve::resolve(definition.as_ref(), &mapping, &device, logical_name)?;
        if descriptor.read_only {
            return Err(FleetError::InvalidRequest(format!("{logical_name} is read-only")));
        }

        let response = rw::write(&self.transport, &device, &descriptor, value, cancel).await?;
        let reboot_flagged = descriptor.requires_restart
            || response.get("restart_required").and_then(Value::as_bool).unwrap_or(false);

        let mut warning = None;
        if reboot_flagged && opts.reboot_if_needed {
            if let Err(reboot_err) = self.reboot(&device, cancel).await {
                warning = Some(format!("reboot failed after successful write: {reboot_err}"));
            }
        }

        Ok((reboot_flagged, warning))
    }

    /// `operate(device, op, args) -> OperationResult` for control verbs
    ///.
    pub async fn operate(
        &self,
        device_id: &str,
        verb: &str,
        args: Value,
        opts: OperateOptions,
        cancel: &CancellationToken,
    ) -> OperationResult {
        let summary = format!("operate {verb}");
        let (duration, outcome) = timed(self.operate_inner(device_id, verb, args, opts, cancel)).await;
        match outcome {
            Ok((reboot_required, warning)) => {
                let mut result = OperationResult::success(device_id.to_string(), &summary, "ok", duration)
                    .with_reboot_required(reboot_required);
                if let Some(warning) = warning {
                    result = result.with_warning(warning);
                }
                result
            }
            Err(err) => OperationResult::failure(device_id.to_string(), summary, duration, &err),
        }
    }

    async fn operate_inner(
        &self,
        device_id: &str,
        verb: &str,
        args: Value,
        opts: OperateOptions,
        cancel: &CancellationToken,
    ) -> fleet_core::Result<(bool, Option<String>)> {
        let device = self.device_or_err(device_id).await?;
        if !device.is_reachable() {
            return Err(FleetError::Unreachable(device_id.to_string()));
        }

        let outcome = control::dispatch(&self.transport, &device, verb, &args, cancel).await?;

        if verb == "update_firmware" {
            let poll_opts = opts
                .update_firmware
                .map(|m| m.0)
                .unwrap_or_default();
            if poll_opts.poll {
                self.poll_update_completion(&device, poll_opts, cancel).await?;
            }
        }

        let mut warning = None;
        if outcome.reboot_required && opts.reboot_if_needed {
            if let Err(reboot_err) = self.reboot(&device, cancel).await {
                warning = Some(format!("reboot failed after successful operation: {reboot_err}"));
            }
        }

        Ok((outcome.reboot_required, warning))
    }

    async fn poll_update_completion(
        &self,
        device: &Device,
        options: UpdateFirmwareOptions,
        cancel: &CancellationToken,
    ) -> fleet_core::Result<()> {
        let deadline = tokio::time::Instant::now() + options.poll_timeout;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(FleetError::Timeout);
            }
            let outcome = control::dispatch(&self.transport, device, "check_updates", &Value::Null, cancel).await?;
            let still_pending = outcome
                .response
                .get("available")
                .or_else(|| outcome.response.get("has_update"))
                .map(|v| !v.is_null() && v.as_bool() != Some(false))
                .unwrap_or(false);
            if !still_pending {
                return Ok(());
            }
            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(FleetError::Cancelled),
                () = tokio::time::sleep(options.poll_interval) => {}
            }
        }
    }

    async fn reboot(&self, device: &Device, cancel: &CancellationToken) -> fleet_core::Result<()> {
        control::dispatch(&self.transport, device, "reboot", &Value::Null, cancel).await?;
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(FleetError::Cancelled),
            () = tokio::time::sleep(self.config.reboot_grace) => {}
        }
        Ok(())
    }

    /// The same bounded-grace reboot `set`/`operate` issue internally,
    /// exposed for callers that batch several writes and want one reboot at
    /// the end rather than one per write (the Group Executor's bulk setter).
    pub async fn reboot_device(&self, device_id: &str, cancel: &CancellationToken) -> fleet_core::Result<()> {
        let device = self.device_or_err(device_id).await?;
        self.reboot(&device, cancel).await
    }

    /// `supported(device) -> {parameters, operations}`.
    pub async fn supported(&self, device_id: &str) -> fleet_core::Result<(Vec<String>, Vec<String>)> {
        let device = self.device_or_err(device_id).await?;
        let mut parameters: Vec<String> = self
            .catalogue
            .resolve(&device)
            .await
            .map(|def| def.parameters.keys().cloned().collect())
            .unwrap_or_default();
        let mapping = self.catalogue.parameter_mapping().await;
        for name in mapping.names() {
            if !parameters.iter().any(|p| p == name) {
                parameters.push(name.to_string());
            }
        }
        parameters.sort();

        let operations = vec![
            "on".to_string(),
            "off".to_string(),
            "toggle".to_string(),
            "brightness".to_string(),
            "status".to_string(),
            "reboot".to_string(),
            "check_updates".to_string(),
            "update_firmware".to_string(),
        ];
        Ok((parameters, operations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DiscoveryMethod, Generation};
    use fleet_storage::{CapabilityStore, DeviceStore, ParameterMappingStore};
    use wiremock::matchers::{method, path as path_matcher, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn test_engine(server_addr: &str) -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let device_store = DeviceStore::new(dir.path().join("devices"));
        let device = Device {
            id: "E868E7EA6333".to_string(),
            device_type: "SHPLG-S".to_string(),
            generation: Generation::Gen1,
            ip_address: Some(server_addr.to_string()),
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: chrono::Utc::now(),
            raw_info: Value::Null,
            auth: None,
        };
        device_store.save(&device).unwrap();
        let registry = Arc::new(Registry::load(device_store).unwrap());

        let mut mapping = fleet_core::ParameterMapping::new(Vec::new());
        mapping.insert(fleet_core::MappingEntry {
            canonical_name: "eco_mode".to_string(),
            legacy_gen1_names: vec!["eco_mode_enabled".to_string()],
            gen1: Some(fleet_core::Gen1Access { endpoint: "settings".to_string(), property: "eco_mode_enabled".to_string() }),
            gen2: None,
            ty: fleet_core::ParameterType::Boolean,
            requires_restart: false,
        });
        let mapping_store = ParameterMappingStore::new(dir.path().join("parameter_mappings.yaml"));
        mapping_store.save(&mapping).unwrap();
        let capability_store = CapabilityStore::new(dir.path().join("device_capabilities"));
        let catalogue = Arc::new(Catalogue::load(capability_store, mapping_store).unwrap());

        let transport = Arc::new(Transport::new(fleet_net::TransportConfig::default()).unwrap());
        let engine = Engine::new(transport, catalogue, registry, EngineConfig::default());
        (engine, dir)
    }

    #[tokio::test]
    async fn set_via_mapping_issues_gen1_query_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_matcher("/settings"))
            .and(query_param("eco_mode_enabled", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"eco_mode_enabled": true})))
            .mount(&server)
            .await;

        let (engine, _dir) = test_engine(&server.address().to_string()).await;
        let cancel = CancellationToken::new();
        let result = engine
            .set("E868E7EA6333", "eco_mode", Value::Bool(true), SetOptions::default(), &cancel)
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn get_on_unknown_device_fails_fast() {
        let (engine, _dir) = test_engine("127.0.0.1:1").await;
        let cancel = CancellationToken::new();
        let err = engine.get("UNKNOWN", "eco_mode", &cancel).await.unwrap_err();
        assert!(matches!(err, FleetError::UnknownDevice(_)));
    }
}
