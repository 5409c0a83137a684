//! Device Registry (component C4): a durable, in-memory index
//! keyed by MAC. One writer at a time per device; readers observe
//! consistent snapshots via a reader-writer lock at the index
//! level plus a per-device mutex for mutation.

use fleet_core::Device;
use fleet_storage::DeviceStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// One registry entry: the device record behind its own mutex so a group
/// run and a direct call can't interleave mutations of the same device
///.
type Entry = Arc<Mutex<Device>>;

pub struct Registry {
    index: RwLock<HashMap<String, Entry>>,
    store: DeviceStore,
}

impl Registry {
    /// Load every persisted device file, deduplicated by MAC.
    pub fn load(store: DeviceStore) -> fleet_core::Result<Self> {
        let devices = store.load_all()?;
        let index = devices
            .into_iter()
            .map(|d| (d.id.clone(), Arc::new(Mutex::new(d))))
            .collect();
        Ok(Self { index: RwLock::new(index), store })
    }

    /// Insert a brand-new device, or merge an observation into an existing
    /// one (discovery re-observing the same MAC may update IP, firmware,
    /// name; an explicit operation may update `name`/`firmware_version`).
    /// Persists the result.
    pub async fn upsert(&self, observed: Device) -> fleet_core::Result<()> {
        let entry = {
            let mut index = self.index.write().await;
            index.entry(observed.id.clone()).or_insert_with(|| Arc::new(Mutex::new(observed.clone()))).clone()
        };
        let mut guard = entry.lock().await;
        *guard = observed;
        self.store.save(&guard)?;
        Ok(())
    }

    /// A point-in-time clone of one device, if known.
    pub async fn get(&self, id: &str) -> Option<Device> {
        let entry = self.index.read().await.get(id).cloned()?;
        Some(entry.lock().await.clone())
    }

    /// True one-writer-at-a-time access to a device for the duration of the
    /// closure — used by the Engine so a `set` followed by a `get` on the
    /// same device is causal.
    pub async fn with_device<F, T>(&self, id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut Device) -> T,
    {
        let entry = self.index.read().await.get(id).cloned()?;
        let mut guard = entry.lock().await;
        let result = f(&mut guard);
        let _ = self.store.save(&guard);
        Some(result)
    }

    /// A snapshot of every known device, in insertion (registry) order —
    /// the order the Group Executor dispatches in to make replays
    /// deterministic. `HashMap` doesn't preserve insertion
    /// order, so the snapshot is sorted by MAC for a stable, reproducible
    /// ordering instead.
    pub async fn snapshot(&self) -> Vec<Device> {
        let index = self.index.read().await;
        let mut devices = Vec::with_capacity(index.len());
        for entry in index.values() {
            devices.push(entry.lock().await.clone());
        }
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// Explicit delete; removes both the in-memory entry and its file.
    pub async fn delete(&self, id: &str) -> fleet_core::Result<bool> {
        let removed = self.index.write().await.remove(id);
        match removed {
            Some(entry) => {
                let device = entry.lock().await.clone();
                self.store.delete(&device)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn len(&self) -> usize {
        self.index.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DiscoveryMethod, Generation};

    fn sample(id: &str) -> Device {
        Device {
            id: id.to_string(),
            device_type: "SHPLG-S".to_string(),
            generation: Generation::Gen1,
            ip_address: Some("192.168.1.100".to_string()),
            hostname: None,
            firmware_version: Some("1.11.0".to_string()),
            name: None,
            discovery_method: DiscoveryMethod::HttpProbe,
            last_seen_at: chrono::Utc::now(),
            raw_info: serde_json::Value::Null,
            auth: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(DeviceStore::new(dir.path())).unwrap();
        registry.upsert(sample("AABBCCDDEEFF")).await.unwrap();
        let loaded = registry.get("AABBCCDDEEFF").await.unwrap();
        assert_eq!(loaded.device_type, "SHPLG-S");
    }

    #[tokio::test]
    async fn upsert_merges_into_existing_entry_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(DeviceStore::new(dir.path())).unwrap();
        registry.upsert(sample("AABBCCDDEEFF")).await.unwrap();

        let mut updated = sample("AABBCCDDEEFF");
        updated.firmware_version = Some("1.12.0".to_string());
        registry.upsert(updated).await.unwrap();

        assert_eq!(registry.len().await, 1);
        let loaded = registry.get("AABBCCDDEEFF").await.unwrap();
        assert_eq!(loaded.firmware_version.as_deref(), Some("1.12.0"));
    }

    #[tokio::test]
    async fn delete_removes_device_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(DeviceStore::new(dir.path())).unwrap();
        registry.upsert(sample("AABBCCDDEEFF")).await.unwrap();
        assert!(registry.delete("AABBCCDDEEFF").await.unwrap());
        assert!(registry.get("AABBCCDDEEFF").await.is_none());
    }

    #[tokio::test]
    async fn snapshot_is_stably_ordered_by_mac() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::load(DeviceStore::new(dir.path())).unwrap();
        registry.upsert(sample("BBBBBBBBBBBB")).await.unwrap();
        registry.upsert(sample("AAAAAAAAAAAA")).await.unwrap();
        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot[0].id, "AAAAAAAAAAAA");
        assert_eq!(snapshot[1].id, "BBBBBBBBBBBB");
    }
}
