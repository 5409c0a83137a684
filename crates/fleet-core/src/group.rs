//! `Group`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// The reserved group name representing the current registry snapshot.
/// Never persisted; resolving it triggers the safety-interlock contract
/// for destructive verbs.
pub const ALL_DEVICES: &str = "all-devices";

/// A named, persisted set of device MACs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered set of member MACs. A device referenced here but absent from
    /// the registry is retained — groups don't lose devices just because
    /// discovery missed them.
    pub device_ids: Vec<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Per-group config overlay applied when operations run on the group.
    #[serde(default)]
    pub config: HashMap<String, serde_json::Value>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: sanitize_group_name(&name.into()),
            description: String::new(),
            device_ids: Vec::new(),
            tags: BTreeSet::new(),
            config: HashMap::new(),
        }
    }

    /// The filename this group persists under, with unsafe characters in the
    /// name replaced by `_`.
    pub fn filename(&self) -> String {
        format!("{}.yaml", sanitize_group_name(&self.name))
    }

    pub fn add_device(&mut self, mac: &str) {
        if !self.device_ids.iter().any(|id| id == mac) {
            self.device_ids.push(mac.to_string());
        }
    }

    pub fn remove_device(&mut self, mac: &str) {
        self.device_ids.retain(|id| id != mac);
    }
}

/// Filesystem-safe group name: disallowed characters replaced with `_`.
pub fn sanitize_group_name(name: &str) -> String {
    crate::device::sanitize_filename_component(name)
}
