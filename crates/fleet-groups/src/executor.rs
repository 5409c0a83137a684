//! Group Executor (component C6): resolve a group name to a
//! device set, fan a logical request out concurrently with a bounded
//! ceiling, and aggregate results in input order. Enforces the
//! all-devices safety interlock for destructive verbs.

use fleet_core::{FleetError, Group, GroupResult, OperationResult};
use fleet_devices::Registry;
use fleet_engine::{Engine, OperateOptions, SetOptions};
use fleet_net::timed;
use fleet_storage::GroupStore;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// One logical request the Executor can fan out to a device set: either a
/// parameter write, a parameter read, a control verb, or a bulk setter of
/// multiple parameters.
#[derive(Debug, Clone)]
pub enum GroupRequest {
    Get { logical_name: String },
    Set { logical_name: String, value: Value, reboot_if_needed: bool },
    BulkSet { writes: Vec<(String, Value)>, reboot_if_needed: bool },
    Operate { verb: String, args: Value, opts: OperateOptions },
}

impl GroupRequest {
    fn summary(&self) -> String {
        match self {
            Self::Get { logical_name } => format!("get {logical_name}"),
            Self::Set { logical_name, .. } => format!("set {logical_name}"),
            Self::BulkSet { writes, .. } => format!("bulk-set {} parameters", writes.len()),
            Self::Operate { verb, .. } => format!("operate {verb}"),
        }
    }

    /// Whether this request writes a `wifi.*` logical name — part of the
    /// destructive set regardless of the configured verb list.
    fn touches_wifi(&self) -> bool {
        match self {
            Self::Set { logical_name, .. } => logical_name.starts_with("wifi."),
            Self::BulkSet { writes, .. } => writes.iter().any(|(name, _)| name.starts_with("wifi.")),
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupExecutorConfig {
    /// Fan-out ceiling: at most this many per-device operations run at once
    /// (default 16).
    pub max_concurrent: usize,
    /// Control verbs that trip the all-devices safety interlock.
    pub destructive_verbs: HashSet<String>,
}

impl Default for GroupExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            destructive_verbs: ["off", "reboot", "update_firmware"].into_iter().map(String::from).collect(),
        }
    }
}

enum Member {
    Known(String),
    Unknown(String),
}

pub struct GroupExecutor {
    registry: Arc<Registry>,
    group_store: GroupStore,
    engine: Engine,
    config: GroupExecutorConfig,
}

impl GroupExecutor {
    pub fn new(registry: Arc<Registry>, group_store: GroupStore, engine: Engine, config: GroupExecutorConfig) -> Self {
        Self { registry, group_store, engine, config }
    }

    fn is_destructive(&self, request: &GroupRequest) -> bool {
        match request {
            GroupRequest::Operate { verb, .. } => self.config.destructive_verbs.contains(verb),
            _ => request.touches_wifi(),
        }
    }

    async fn resolve_target(&self, group_name: &str) -> fleet_core::Result<(Vec<Member>, bool)> {
        if group_name == fleet_core::ALL_DEVICES {
            let devices = self.registry.snapshot().await;
            return Ok((devices.into_iter().map(|d| Member::Known(d.id)).collect(), true));
        }

        let group: Group = self
            .group_store
            .load(group_name)?
            .ok_or_else(|| FleetError::InvalidRequest(format!("unknown group: {group_name}")))?;

        let mut members = Vec::with_capacity(group.device_ids.len());
        for id in &group.device_ids {
            if self.registry.get(id).await.is_some() {
                members.push(Member::Known(id.clone()));
            } else {
                members.push(Member::Unknown(id.clone()));
            }
        }
        Ok((members, false))
    }

    /// Resolve `group_name`, enforce the safety interlock, and fan `request`
    /// out across every resolved member. Returns a top-level `FleetError`
    /// only for caller-contract violations (unknown group, confirmation
    /// required) — every per-device outcome, success or failure, lands in
    /// the returned `GroupResult` (propagation policy discussed below).
    pub async fn operate(
        &self,
        group_name: &str,
        request: GroupRequest,
        confirm: bool,
        cancel: &CancellationToken,
    ) -> fleet_core::Result<GroupResult> {
        let (members, is_all_devices) = self.resolve_target(group_name).await?;

        if is_all_devices && self.is_destructive(&request) && !confirm {
            return Err(FleetError::ConfirmationRequired);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut handles = Vec::with_capacity(members.len());

        for member in members {
            match member {
                Member::Known(device_id) => {
                    let semaphore = semaphore.clone();
                    let engine = self.engine.clone();
                    let request = request.clone();
                    let child_cancel = cancel.child_token();
                    handles.push(tokio::spawn(async move {
                        let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                        dispatch_one(&engine, &device_id, &request, &child_cancel).await
                    }));
                }
                Member::Unknown(device_id) => {
                    let summary = request.summary();
                    handles.push(tokio::spawn(async move {
                        OperationResult::failure(device_id.clone(), summary, Duration::ZERO, &FleetError::UnknownDevice(device_id))
                    }));
                }
            }
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.map_err(|e| FleetError::Internal(e.to_string()))?);
        }
        Ok(GroupResult::from_results(results))
    }
}

async fn dispatch_one(engine: &Engine, device_id: &str, request: &GroupRequest, cancel: &CancellationToken) -> OperationResult {
    match request {
        GroupRequest::Get { logical_name } => {
            let summary = format!("get {logical_name}");
            let (duration, outcome) = timed(engine.get(device_id, logical_name, cancel)).await;
            match outcome {
                Ok((value, _descriptor)) => OperationResult::success(device_id.to_string(), &summary, value.to_string(), duration),
                Err(err) => OperationResult::failure(device_id.to_string(), summary, duration, &err),
            }
        }
        GroupRequest::Set { logical_name, value, reboot_if_needed } => {
            engine
                .set(device_id, logical_name, value.clone(), SetOptions { reboot_if_needed: *reboot_if_needed }, cancel)
                .await
        }
        GroupRequest::Operate { verb, args, opts } => engine.operate(device_id, verb, args.clone(), *opts, cancel).await,
        GroupRequest::BulkSet { writes, reboot_if_needed } => bulk_set(engine, device_id, writes, *reboot_if_needed, cancel).await,
    }
}

/// Apply every write in `writes` sequentially against one device, under a
/// single timing/aggregation envelope. A failure partway through stops the
/// remaining writes and is reported with how many already landed — the
/// bulk setter has no rollback, so partial application is surfaced rather
/// than hidden.
async fn bulk_set(engine: &Engine, device_id: &str, writes: &[(String, Value)], reboot_if_needed: bool, cancel: &CancellationToken) -> OperationResult {
    let summary = format!("bulk-set {} parameters", writes.len());
    let (duration, outcome) = timed(bulk_set_inner(engine, device_id, writes, reboot_if_needed, cancel)).await;
    match outcome {
        Ok((applied, reboot_required, warning)) => {
            let mut result =
                OperationResult::success(device_id.to_string(), &summary, format!("{applied} parameters applied"), duration)
                    .with_reboot_required(reboot_required);
            if let Some(warning) = warning {
                result = result.with_warning(warning);
            }
            result
        }
        Err((applied, err)) => {
            let mut result = OperationResult::failure(device_id.to_string(), summary, duration, &err);
            if applied > 0 {
                result = result.with_warning(format!("{applied} of {} writes applied before failure", writes.len()));
            }
            result
        }
    }
}

async fn bulk_set_inner(
    engine: &Engine,
    device_id: &str,
    writes: &[(String, Value)],
    reboot_if_needed: bool,
    cancel: &CancellationToken,
) -> Result<(usize, bool, Option<String>), (usize, FleetError)> {
    let mut any_reboot_flagged = false;
    for (index, (name, value)) in writes.iter().enumerate() {
        match engine.try_set(device_id, name, value, SetOptions::default(), cancel).await {
            Ok((flagged, _warning)) => any_reboot_flagged |= flagged,
            Err(err) => return Err((index, err)),
        }
    }

    let mut warning = None;
    if any_reboot_flagged && reboot_if_needed {
        if let Err(reboot_err) = engine.reboot_device(device_id, cancel).await {
            warning = Some(format!("reboot failed after bulk write: {reboot_err}"));
        }
    }
    Ok((writes.len(), any_reboot_flagged, warning))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DiscoveryMethod, Generation};
    use fleet_engine::EngineConfig;
    use fleet_devices::Catalogue;
    use fleet_storage::{CapabilityStore, DeviceStore, ParameterMappingStore};
    use wiremock::matchers::{method, path as path_matcher};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_device(id: &str, addr: &str) -> fleet_core::Device {
        fleet_core::Device {
            id: id.to_string(),
            device_type: "SHPLG-S".to_string(),
            generation: Generation::Gen1,
            ip_address: Some(addr.to_string()),
            hostname: None,
            firmware_version: None,
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: chrono::Utc::now(),
            raw_info: Value::Null,
            auth: None,
        }
    }

    async fn test_setup(reachable_addr: &str) -> (GroupExecutor, GroupStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let device_store = DeviceStore::new(dir.path().join("devices"));
        device_store.save(&sample_device("AAAAAAAAAAAA", reachable_addr)).unwrap();
        device_store.save(&sample_device("BBBBBBBBBBBB", "127.0.0.1:1")).unwrap();
        let registry = Arc::new(Registry::load(device_store).unwrap());

        let capability_store = CapabilityStore::new(dir.path().join("device_capabilities"));
        let mapping_store = ParameterMappingStore::new(dir.path().join("parameter_mappings.yaml"));
        let catalogue = Arc::new(Catalogue::load(capability_store, mapping_store).unwrap());
        let transport = Arc::new(fleet_net::Transport::new(fleet_net::TransportConfig::default()).unwrap());
        let engine = Engine::new(transport, catalogue, registry.clone(), EngineConfig::default());

        let group_store = GroupStore::new(dir.path().join("groups"));
        let mut group = Group::new("mixed");
        group.add_device("AAAAAAAAAAAA");
        group.add_device("BBBBBBBBBBBB");
        group.add_device("CCCCCCCCCCCC");
        group_store.save(&group).unwrap();

        let executor = GroupExecutor::new(registry, GroupStore::new(dir.path().join("groups")), engine, GroupExecutorConfig::default());
        (executor, group_store, dir)
    }

    #[tokio::test]
    async fn partial_failure_reports_per_device_outcomes_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_matcher("/relay/0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ison": true})))
            .mount(&server)
            .await;

        let (executor, _store, _dir) = test_setup(&server.address().to_string()).await;
        let cancel = CancellationToken::new();
        let result = executor
            .operate("mixed", GroupRequest::Operate { verb: "on".to_string(), args: Value::Null, opts: OperateOptions::default() }, false, &cancel)
            .await
            .unwrap();

        assert_eq!(result.results.len(), 3);
        assert_eq!(result.success_count, 1);
        assert_eq!(result.failure_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.results[0].device_id, "AAAAAAAAAAAA");
        assert_eq!(result.results[2].device_id, "CCCCCCCCCCCC");
        assert_eq!(result.results[2].error_kind.as_deref(), Some("unknown-device"));
    }

    #[tokio::test]
    async fn all_devices_destructive_verb_without_confirm_is_rejected_with_zero_io() {
        let (executor, _store, _dir) = test_setup("127.0.0.1:1").await;
        let cancel = CancellationToken::new();
        let err = executor
            .operate(fleet_core::ALL_DEVICES, GroupRequest::Operate { verb: "off".to_string(), args: Value::Null, opts: OperateOptions::default() }, false, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::ConfirmationRequired));
    }

    #[tokio::test]
    async fn non_destructive_verb_on_all_devices_needs_no_confirmation() {
        let (executor, _store, _dir) = test_setup("127.0.0.1:1").await;
        let cancel = CancellationToken::new();
        let result = executor
            .operate(fleet_core::ALL_DEVICES, GroupRequest::Operate { verb: "status".to_string(), args: Value::Null, opts: OperateOptions::default() }, false, &cancel)
            .await
            .unwrap();
        assert_eq!(result.results.len(), 2);
    }
}
