//! `data/groups/<group>.yaml` persistence.
//!
//! `SHELLY_GROUPS_DIR` overrides the directory a `GroupStore`
//! reads and writes, so tests can isolate runs without touching a shared
//! data directory.

use crate::atomic::{list_yaml_files, read_yaml, remove_if_exists, write_yaml_atomic};
use fleet_core::{FleetError, Group, Result};
use std::path::{Path, PathBuf};

pub const GROUPS_DIR_ENV: &str = "SHELLY_GROUPS_DIR";

pub struct GroupStore {
    dir: PathBuf,
}

impl GroupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Build a store honoring `SHELLY_GROUPS_DIR` when set, else `default_dir`.
    pub fn from_env_or(default_dir: impl Into<PathBuf>) -> Self {
        match std::env::var(GROUPS_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(default_dir),
        }
    }

    pub fn load_all(&self) -> Result<Vec<Group>> {
        let files = list_yaml_files(&self.dir)?;
        let mut groups = Vec::with_capacity(files.len());
        for (path, _) in files {
            match read_yaml::<Group>(&path) {
                Ok(group) => groups.push(group),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable group file"),
            }
        }
        Ok(groups)
    }

    pub fn load(&self, name: &str) -> Result<Option<Group>> {
        let path = self.path_for(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(read_yaml(&path)?))
    }

    pub fn save(&self, group: &Group) -> Result<()> {
        if group.name == fleet_core::ALL_DEVICES {
            return Err(FleetError::InvalidRequest(
                "all-devices is reserved and cannot be persisted".to_string(),
            ));
        }
        write_yaml_atomic(&self.path_for(&group.name), group)
    }

    /// Rename `group` to `new_name`, leaving exactly one file on disk
    /// .
    pub fn rename(&self, group: &mut Group, new_name: &str) -> Result<()> {
        let old_path = self.path_for(&group.name);
        group.name = fleet_core::group::sanitize_group_name(new_name);
        self.save(group)?;
        if old_path != self.path_for(&group.name) {
            remove_if_exists(&old_path)?;
        }
        Ok(())
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        remove_if_exists(&self.path_for(name))
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.yaml", fleet_core::group::sanitize_group_name(name)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rename_leaves_exactly_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let mut group = Group::new("kitchen");
        group.add_device("AA");
        store.save(&group).unwrap();

        store.rename(&mut group, "dining room").unwrap();

        let files = list_yaml_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(group.name, "dining_room");
    }

    #[test]
    fn all_devices_name_refuses_to_persist() {
        let dir = tempfile::tempdir().unwrap();
        let store = GroupStore::new(dir.path());
        let group = Group::new(fleet_core::ALL_DEVICES);
        assert!(store.save(&group).is_err());
    }

    #[test]
    fn groups_dir_env_override_takes_precedence() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(GROUPS_DIR_ENV, dir.path());
        let store = GroupStore::from_env_or("/nonexistent/default");
        assert_eq!(store.dir(), dir.path());
        std::env::remove_var(GROUPS_DIR_ENV);
    }
}
