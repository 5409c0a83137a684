//! Group CRUD: create/list/show/update/delete and
//! membership edits, layered over `fleet_storage::GroupStore`'s raw
//! persistence with the invariants below (unique names, the
//! reserved `all-devices` name never persists, a rename leaves exactly
//! one file on disk).

use fleet_core::{FleetError, Group};
use fleet_storage::GroupStore;
use std::collections::{BTreeSet, HashMap};

pub struct GroupManager {
    store: GroupStore,
}

#[derive(Debug, Clone, Default)]
pub struct GroupUpdate {
    pub new_name: Option<String>,
    pub description: Option<String>,
    pub tags: Option<BTreeSet<String>>,
    pub config: Option<HashMap<String, serde_json::Value>>,
}

impl GroupManager {
    pub fn new(store: GroupStore) -> Self {
        Self { store }
    }

    pub fn create(&self, name: &str, description: &str) -> fleet_core::Result<Group> {
        if name == fleet_core::ALL_DEVICES {
            return Err(FleetError::InvalidRequest("all-devices is reserved and cannot be created".to_string()));
        }
        if self.store.load(name)?.is_some() {
            return Err(FleetError::InvalidRequest(format!("group already exists: {name}")));
        }
        let mut group = Group::new(name);
        group.description = description.to_string();
        self.store.save(&group)?;
        Ok(group)
    }

    pub fn list(&self) -> fleet_core::Result<Vec<Group>> {
        self.store.load_all()
    }

    pub fn show(&self, name: &str) -> fleet_core::Result<Group> {
        self.store
            .load(name)?
            .ok_or_else(|| FleetError::InvalidRequest(format!("unknown group: {name}")))
    }

    pub fn update(&self, name: &str, update: GroupUpdate) -> fleet_core::Result<Group> {
        let mut group = self.show(name)?;
        if let Some(description) = update.description {
            group.description = description;
        }
        if let Some(tags) = update.tags {
            group.tags = tags;
        }
        if let Some(config) = update.config {
            group.config = config;
        }
        match update.new_name {
            Some(new_name) => self.store.rename(&mut group, &new_name)?,
            None => self.store.save(&group)?,
        }
        Ok(group)
    }

    pub fn delete(&self, name: &str) -> fleet_core::Result<()> {
        self.store.delete(name)
    }

    pub fn add_device(&self, name: &str, mac: &str) -> fleet_core::Result<Group> {
        let mut group = self.show(name)?;
        group.add_device(mac);
        self.store.save(&group)?;
        Ok(group)
    }

    pub fn remove_device(&self, name: &str, mac: &str) -> fleet_core::Result<Group> {
        let mut group = self.show(name)?;
        group.remove_device(mac);
        self.store.save(&group)?;
        Ok(group)
    }
}
