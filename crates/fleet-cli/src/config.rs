//! `config/fleet.toml`: static tunables for the Transport, Discovery,
//! Engine, and Group Executor that don't belong in per-device or
//! per-group data. Loading follows a file-beats-code-default rule, with
//! no database tier since this system has no settings store to prefer
//! over it.

use fleet_devices::DiscoveryConfig;
use fleet_engine::EngineConfig;
use fleet_groups::GroupExecutorConfig;
use fleet_net::TransportConfig;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub transport: TransportSection,
    pub discovery: DiscoverySection,
    pub engine: EngineSection,
    pub groups: GroupsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransportSection {
    pub timeout_secs: u64,
    pub retry_backoff_millis: u64,
    pub idle_pool_timeout_secs: u64,
}

impl Default for TransportSection {
    fn default() -> Self {
        let d = TransportConfig::default();
        Self {
            timeout_secs: d.timeout.as_secs(),
            retry_backoff_millis: d.retry_backoff.as_millis() as u64,
            idle_pool_timeout_secs: d.idle_pool_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub chunk_size: usize,
    pub probe_timeout_secs: u64,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        let d = DiscoveryConfig::default();
        Self { chunk_size: d.chunk_size, probe_timeout_secs: d.probe_timeout.as_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub reboot_grace_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self { reboot_grace_secs: EngineConfig::default().reboot_grace.as_secs() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GroupsSection {
    pub max_concurrent: usize,
    pub destructive_verbs: Vec<String>,
}

impl Default for GroupsSection {
    fn default() -> Self {
        let d = GroupExecutorConfig::default();
        Self { max_concurrent: d.max_concurrent, destructive_verbs: d.destructive_verbs.into_iter().collect() }
    }
}

impl FleetConfig {
    /// Load `<data_dir>/config/fleet.toml` if present; an absent file is
    /// not an error, it just means every default applies — the system must
    /// survive its absence.
    pub fn load(data_dir: &Path) -> anyhow::Result<Self> {
        let path = data_dir.join("config").join("fleet.toml");
        match std::fs::read_to_string(&path) {
            Ok(raw) => toml::from_str(&raw).map_err(|e| anyhow::anyhow!("invalid {}: {e}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            timeout: Duration::from_secs(self.transport.timeout_secs),
            retry_backoff: Duration::from_millis(self.transport.retry_backoff_millis),
            idle_pool_timeout: Duration::from_secs(self.transport.idle_pool_timeout_secs),
        }
    }

    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            chunk_size: self.discovery.chunk_size,
            probe_timeout: Duration::from_secs(self.discovery.probe_timeout_secs),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig { reboot_grace: Duration::from_secs(self.engine.reboot_grace_secs) }
    }

    pub fn group_executor_config(&self) -> GroupExecutorConfig {
        GroupExecutorConfig {
            max_concurrent: self.groups.max_concurrent,
            destructive_verbs: self.groups.destructive_verbs.iter().cloned().collect::<HashSet<_>>(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FleetConfig::load(dir.path()).unwrap();
        assert_eq!(config.groups.max_concurrent, 16);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("config")).unwrap();
        std::fs::write(
            dir.path().join("config").join("fleet.toml"),
            "[groups]\nmax_concurrent = 4\n",
        )
        .unwrap();
        let config = FleetConfig::load(dir.path()).unwrap();
        assert_eq!(config.groups.max_concurrent, 4);
        assert_eq!(config.transport.timeout_secs, 5);
    }
}
