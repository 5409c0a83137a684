//! Wires the persistence layout and `config/fleet.toml` tunables
//! into the live Catalogue, Registry, Engine, and Group Executor/Manager a
//! command needs.

use crate::config::FleetConfig;
use fleet_devices::{Catalogue, Registry};
use fleet_engine::Engine;
use fleet_groups::{GroupExecutor, GroupManager};
use fleet_net::Transport;
use fleet_storage::{CapabilityStore, DeviceStore, DeviceTypeHint, DeviceTypesStore, GroupStore, ParameterMappingStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct AppContext {
    pub transport: Arc<Transport>,
    pub catalogue: Arc<Catalogue>,
    pub registry: Arc<Registry>,
    pub engine: Engine,
    pub group_executor: GroupExecutor,
    pub group_manager: GroupManager,
    /// Static generation/feature-flag hints (the design intent: "consulted only for
    /// classification hints"), surfaced alongside fresh `discover` results.
    pub device_type_hints: Vec<DeviceTypeHint>,
    pub config: FleetConfig,
}

impl AppContext {
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let config = FleetConfig::load(data_dir)?;

        let capability_store = CapabilityStore::new(config_dir(data_dir).join("device_capabilities"));
        let mapping_store = ParameterMappingStore::new(config_dir(data_dir).join("parameter_mappings.yaml"));
        let device_store = DeviceStore::new(data_subdir(data_dir).join("devices"));
        let device_types_store = DeviceTypesStore::new(config_dir(data_dir).join("device_types.yaml"));

        let catalogue = Arc::new(Catalogue::load(capability_store, mapping_store)?);
        let registry = Arc::new(Registry::load(device_store)?);
        let transport = Arc::new(Transport::new(config.transport_config())?);
        let device_type_hints = device_types_store.load()?;

        let engine = Engine::new(transport.clone(), catalogue.clone(), registry.clone(), config.engine_config());
        let group_executor = GroupExecutor::new(
            registry.clone(),
            GroupStore::from_env_or(data_subdir(data_dir).join("groups")),
            engine.clone(),
            config.group_executor_config(),
        );
        let group_manager = GroupManager::new(GroupStore::from_env_or(data_subdir(data_dir).join("groups")));

        Ok(Self { transport, catalogue, registry, engine, group_executor, group_manager, device_type_hints, config })
    }
}

fn config_dir(data_dir: &Path) -> PathBuf {
    data_dir.join("config")
}

fn data_subdir(data_dir: &Path) -> PathBuf {
    data_dir.join("data")
}
