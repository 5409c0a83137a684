//! `data/devices/<device_type>_<MAC>.yaml` persistence.

use crate::atomic::{list_yaml_files, read_yaml, remove_if_exists, write_yaml_atomic};
use fleet_core::{Device, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Durable store for `Device` records, one file per device.
pub struct DeviceStore {
    dir: PathBuf,
}

impl DeviceStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Load every device file, deduplicated by MAC. A duplicate filename for
    /// the same MAC (e.g. after a `device_type` rename left a stale file
    /// behind) is a warning, not an error — the most recently modified file
    /// wins.
    pub fn load_all(&self) -> Result<Vec<Device>> {
        let files = list_yaml_files(&self.dir)?;
        let mut by_mac: HashMap<String, (Device, std::time::SystemTime)> = HashMap::new();
        for (path, modified) in files {
            let device: Device = match read_yaml(&path) {
                Ok(d) => d,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable device file");
                    continue;
                }
            };
            match by_mac.get(&device.id) {
                Some((_, existing_modified)) if *existing_modified >= modified => {
                    tracing::warn!(mac = %device.id, path = %path.display(), "duplicate device file, keeping the more recently modified one");
                }
                _ => {
                    by_mac.insert(device.id.clone(), (device, modified));
                }
            }
        }
        Ok(by_mac.into_values().map(|(d, _)| d).collect())
    }

    /// Persist one device, atomically.
    pub fn save(&self, device: &Device) -> Result<()> {
        let path = self.path_for(device);
        write_yaml_atomic(&path, device)
    }

    /// Delete a device's file. No-op if it never existed.
    pub fn delete(&self, device: &Device) -> Result<()> {
        remove_if_exists(&self.path_for(device))
    }

    fn path_for(&self, device: &Device) -> PathBuf {
        self.dir.join(device.filename())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::{DiscoveryMethod, Generation};
    use std::thread::sleep;
    use std::time::Duration;

    fn sample_device(mac: &str) -> Device {
        Device {
            id: mac.to_string(),
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

    #[test]
    fn save_then_load_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::new(dir.path());
        let device = sample_device("E868E7EA6333");
        store.save(&device).unwrap();

        let expected_path = dir.path().join("SHPLG-S_E868E7EA6333.yaml");
        assert!(expected_path.exists());

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "E868E7EA6333");
    }

    #[test]
    fn duplicate_files_for_same_mac_keep_the_newer_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::new(dir.path());

        let mut older = sample_device("E868E7EA6333");
        older.firmware_version = Some("1.10.0".to_string());
        store.save(&older).unwrap();

        // Also write under a stale device_type filename, simulating a rename
        // that left the old file behind.
        let stale_path = dir.path().join("SHPLG-OLD_E868E7EA6333.yaml");
        crate::atomic::write_yaml_atomic(&stale_path, &older).unwrap();

        sleep(Duration::from_millis(10));

        let mut newer = sample_device("E868E7EA6333");
        newer.firmware_version = Some("1.12.0".to_string());
        store.save(&newer).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].firmware_version.as_deref(), Some("1.12.0"));
    }

    #[test]
    fn delete_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeviceStore::new(dir.path());
        let device = sample_device("E868E7EA6333");
        store.save(&device).unwrap();
        store.delete(&device).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }
}
