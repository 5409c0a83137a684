//! Capability Catalogue (component C2): the per-model capability
//! definitions, their `type_mappings` synonym table, and the process-wide
//! `ParameterMapping`. Read-mostly; refreshed under a write lock that swaps
//! in a new snapshot atomically so readers never see a torn view.

use fleet_core::{CapabilityDefinition, Device, ParameterDescriptor, ParameterMapping};
use fleet_net::Transport;
use fleet_storage::{CapabilityStore, ParameterMappingStore};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Hand-curated base SKUs consulted by `resolve()` when a device's exact
/// `device_type` has no definition of its own (the design intent: "the one matching
/// its generation's base SKU, else none").
fn base_sku_for(generation: fleet_core::Generation) -> &'static str {
    match generation {
        fleet_core::Generation::Gen1 => "generic-gen1",
        fleet_core::Generation::Gen2 => "generic-gen2",
        fleet_core::Generation::Gen3 => "generic-gen3",
        fleet_core::Generation::Gen4 => "generic-gen4",
    }
}

struct Snapshot {
    definitions: HashMap<String, CapabilityDefinition>,
    synonyms: HashMap<String, String>,
    mapping: ParameterMapping,
}

impl Snapshot {
    fn build(definitions: Vec<CapabilityDefinition>, mapping: ParameterMapping) -> Self {
        let mut synonyms = HashMap::new();
        let mut by_type = HashMap::new();
        for def in definitions {
            for synonym in &def.type_mappings {
                synonyms.insert(synonym.clone(), def.device_type.clone());
            }
            by_type.insert(def.device_type.clone(), def);
        }
        Self { definitions: by_type, synonyms, mapping }
    }
}

/// Options for `Catalogue::refresh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RefreshOptions {
    /// Bypass the "don't overwrite hand-edited files" guard: a hand-curated
    /// definition (`discovered_at: None`) is normally left untouched.
    pub force: bool,
}

pub struct Catalogue {
    snapshot: RwLock<Snapshot>,
    capability_store: CapabilityStore,
    mapping_store: ParameterMappingStore,
}

impl Catalogue {
    /// Load every `config/device_capabilities/*.yaml` file and the standard
    /// `ParameterMapping` table from disk. Survives their
    /// absence — an empty catalogue is valid at first boot.
    pub fn load(capability_store: CapabilityStore, mapping_store: ParameterMappingStore) -> fleet_core::Result<Self> {
        let definitions = capability_store.load_all()?;
        let mapping = mapping_store.load()?;
        Ok(Self {
            snapshot: RwLock::new(Snapshot::build(definitions, mapping)),
            capability_store,
            mapping_store,
        })
    }

    /// Strict lookup, falling back through `type_mappings` synonyms.
    pub async fn get(&self, device_type: &str) -> Option<CapabilityDefinition> {
        let snapshot = self.snapshot.read().await;
        if let Some(def) = snapshot.definitions.get(device_type) {
            return Some(def.clone());
        }
        let primary = snapshot.synonyms.get(device_type)?;
        snapshot.definitions.get(primary).cloned()
    }

    /// Resolve a concrete `Device` to its capability definition: exact
    /// `device_type` match, else synonym, else the generation's base SKU,
    /// else none.
    pub async fn resolve(&self, device: &Device) -> Option<CapabilityDefinition> {
        if let Some(def) = self.get(&device.device_type).await {
            return Some(def);
        }
        self.get(base_sku_for(device.generation)).await
    }

    pub async fn has_parameter(&self, device_type: &str, name: &str) -> bool {
        self.parameter_details(device_type, name).await.is_some()
    }

    pub async fn parameter_details(&self, device_type: &str, name: &str) -> Option<ParameterDescriptor> {
        self.get(device_type).await?.parameters.get(name).cloned()
    }

    /// The current `ParameterMapping` table (cloned; read-mostly, cheap
    /// relative to the network calls that dominate this system).
    pub async fn parameter_mapping(&self) -> ParameterMapping {
        self.snapshot.read().await.mapping.clone()
    }

    /// Every capability definition currently on record, sorted by
    /// `device_type` for stable CLI output.
    pub async fn list(&self) -> Vec<CapabilityDefinition> {
        let snapshot = self.snapshot.read().await;
        let mut defs: Vec<_> = snapshot.definitions.values().cloned().collect();
        defs.sort_by(|a, b| a.device_type.cmp(&b.device_type));
        defs
    }

    /// Every `device_type` whose definition declares `name` as a raw
    /// parameter key, plus a marker for each generation branch the
    /// process-wide `ParameterMapping` declares for `name` (that table
    /// applies across every device of a matching generation, not one SKU).
    pub async fn devices_supporting(&self, name: &str) -> Vec<String> {
        let snapshot = self.snapshot.read().await;
        let mut out: Vec<String> = snapshot
            .definitions
            .values()
            .filter(|def| def.parameters.contains_key(name))
            .map(|def| def.device_type.clone())
            .collect();
        if let Some(entry) = snapshot.mapping.get(name) {
            if entry.gen1.is_some() {
                out.push("*(gen1 via parameter mapping)".to_string());
            }
            if entry.gen2.is_some() {
                out.push("*(gen2+ via parameter mapping)".to_string());
            }
        }
        out.sort();
        out.dedup();
        out
    }

    /// Re-probe `device` and overwrite its catalogue entry. `force` bypasses
    /// the hand-edited guard — without it, a hand-curated definition
    /// (`discovered_at: None`) already on record for this `device_type` is
    /// left in place.
    pub async fn refresh(
        &self,
        transport: &Transport,
        device: &Device,
        options: RefreshOptions,
        cancel: &CancellationToken,
    ) -> fleet_core::Result<CapabilityDefinition> {
        {
            let snapshot = self.snapshot.read().await;
            if !options.force {
                if let Some(existing) = snapshot.definitions.get(&device.device_type) {
                    if existing.discovered_at.is_none() {
                        return Ok(existing.clone());
                    }
                }
            }
        }

        let fresh = crate::capability_discovery::discover(transport, device, cancel).await?;
        self.capability_store.save(&fresh)?;

        let mut snapshot = self.snapshot.write().await;
        for synonym in &fresh.type_mappings {
            snapshot.synonyms.insert(synonym.clone(), fresh.device_type.clone());
        }
        snapshot.definitions.insert(fresh.device_type.clone(), fresh.clone());
        Ok(fresh)
    }

    /// Apply `ParameterMapping` canonicalization renames across every
    /// definition's parameter keys. Returns the `(old, new)`
    /// pairs that changed or would change; persists the rename only when
    /// `dry_run` is false.
    pub async fn standardize(&self, dry_run: bool) -> fleet_core::Result<Vec<(String, String)>> {
        let mut snapshot = self.snapshot.write().await;
        let mapping = snapshot.mapping.clone();
        let mut diffs = Vec::new();
        let mut rewritten = Vec::new();

        for def in snapshot.definitions.values() {
            let mut changed = false;
            let mut new_def = def.clone();
            let old_keys: Vec<String> = new_def.parameters.keys().cloned().collect();
            for old_key in old_keys {
                let canonical = mapping.canonicalize(&old_key).to_string();
                if canonical != old_key {
                    if let Some(descriptor) = new_def.parameters.remove(&old_key) {
                        diffs.push((format!("{}.{old_key}", def.device_type), format!("{}.{canonical}", def.device_type)));
                        new_def.parameters.insert(canonical, descriptor);
                        changed = true;
                    }
                }
            }
            if changed {
                rewritten.push(new_def);
            }
        }

        if !dry_run {
            for def in rewritten {
                self.capability_store.save(&def)?;
                snapshot.definitions.insert(def.device_type.clone(), def);
            }
        }

        Ok(diffs)
    }

    /// Replace the process-wide `ParameterMapping` table, persisting it.
    pub async fn set_parameter_mapping(&self, mapping: ParameterMapping) -> fleet_core::Result<()> {
        self.mapping_store.save(&mapping)?;
        self.snapshot.write().await.mapping = mapping;
        Ok(())
    }
}
