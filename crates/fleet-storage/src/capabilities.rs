//! `config/device_capabilities/<SKU>.yaml` and `config/parameter_mappings.yaml`
//! persistence. Capability files are a cache, not the source
//! of truth — the store must survive their absence.

use crate::atomic::{list_yaml_files, read_yaml, remove_if_exists, write_yaml_atomic};
use fleet_core::{CapabilityDefinition, ParameterMapping, Result};
use std::path::{Path, PathBuf};

pub struct CapabilityStore {
    dir: PathBuf,
}

impl CapabilityStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn load_all(&self) -> Result<Vec<CapabilityDefinition>> {
        let files = list_yaml_files(&self.dir)?;
        let mut defs = Vec::with_capacity(files.len());
        for (path, _) in files {
            match read_yaml::<CapabilityDefinition>(&path) {
                Ok(def) => defs.push(def),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable capability file"),
            }
        }
        Ok(defs)
    }

    pub fn save(&self, def: &CapabilityDefinition) -> Result<()> {
        write_yaml_atomic(&self.path_for(&def.device_type), def)
    }

    /// Delete every cached capability file. Used by `refresh(force=true)`
    /// to repopulate from a clean slate.
    pub fn clear_all(&self) -> Result<()> {
        for (path, _) in list_yaml_files(&self.dir)? {
            remove_if_exists(&path)?;
        }
        Ok(())
    }

    pub fn delete(&self, device_type: &str) -> Result<()> {
        remove_if_exists(&self.path_for(device_type))
    }

    fn path_for(&self, device_type: &str) -> PathBuf {
        self.dir
            .join(format!("{}.yaml", fleet_core::device::sanitize_filename_component(device_type)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `config/parameter_mappings.yaml` — the standard [`ParameterMapping`] table.
pub struct ParameterMappingStore {
    path: PathBuf,
}

impl ParameterMappingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<ParameterMapping> {
        if !self.path.exists() {
            return Ok(ParameterMapping::default());
        }
        read_yaml(&self.path)
    }

    pub fn save(&self, mapping: &ParameterMapping) -> Result<()> {
        write_yaml_atomic(&self.path, mapping)
    }
}

/// Static per-SKU classification hints from `config/device_types.yaml`:
/// generation, feature flags, and default limits. Consulted only for
/// classification hints — never authoritative over a live probe.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DeviceTypeHint {
    pub device_type: String,
    pub generation: fleet_core::Generation,
    #[serde(default)]
    pub feature_flags: Vec<String>,
    #[serde(default)]
    pub max_power: Option<f64>,
    #[serde(default)]
    pub num_outputs: Option<u32>,
}

pub struct DeviceTypesStore {
    path: PathBuf,
}

impl DeviceTypesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Vec<DeviceTypeHint>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        read_yaml(&self.path)
    }

    pub fn save(&self, hints: &[DeviceTypeHint]) -> Result<()> {
        write_yaml_atomic(&self.path, &hints.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::Generation;
    use std::collections::BTreeMap;

    fn sample_def() -> CapabilityDefinition {
        CapabilityDefinition {
            device_type: "SHPLG-S".to_string(),
            name: "Shelly Plug S".to_string(),
            generation: Generation::Gen1,
            type_mappings: Vec::new(),
            apis: BTreeMap::new(),
            parameters: BTreeMap::new(),
            discovered_at: None,
        }
    }

    #[test]
    fn save_and_reload_capability_definition() {
        let dir = tempfile::tempdir().unwrap();
        let store = CapabilityStore::new(dir.path());
        store.save(&sample_def()).unwrap();
        let all = store.load_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].device_type, "SHPLG-S");
    }

    #[test]
    fn clear_all_removes_every_cached_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CapabilityStore::new(dir.path());
        store.save(&sample_def()).unwrap();
        store.clear_all().unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn missing_parameter_mappings_file_yields_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParameterMappingStore::new(dir.path().join("parameter_mappings.yaml"));
        let mapping = store.load().unwrap();
        assert_eq!(mapping.entries().len(), 0);
    }
}
