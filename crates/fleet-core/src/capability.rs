//! `CapabilityDefinition` / `ParameterDescriptor` / `ParameterMapping`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The declared type of a parameter or a response-schema leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    Boolean,
    Integer,
    Float,
    String,
    Enum,
    Object,
    Array,
    Null,
}

/// A field-type descriptor in an API's recorded `response_structure`.
///
/// This is the "well-defined schema language" this schema requires in place of
/// free-form JSON: every leaf carries a [`ParameterType`], objects recurse,
/// and arrays describe their element type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldSchema {
    Leaf { ty: ParameterType },
    Object { fields: BTreeMap<String, FieldSchema> },
    Array { element: Box<FieldSchema> },
}

impl FieldSchema {
    pub fn leaf(ty: ParameterType) -> Self {
        Self::Leaf { ty }
    }
}

/// Describes one vendor API call (a Gen1 REST sub-path or a Gen2+ RPC method)
/// recorded by capability discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDescriptor {
    pub description: String,
    pub response_structure: BTreeMap<String, FieldSchema>,
}

/// One logical parameter as discovered or hand-curated for a device type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDescriptor {
    #[serde(rename = "type")]
    pub ty: ParameterType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub read_only: bool,
    /// API name within the same `CapabilityDefinition` that carries this
    /// parameter. For Gen1: a REST sub-path (`settings`, `settings/relay/0`).
    /// For Gen2+: an RPC method (`Sys.SetConfig`, `Switch.SetConfig`).
    pub api: String,
    /// Dotted/indexed path into the API's JSON payload (`mqtt.enable`,
    /// `switch:0.in_mode`, `valves[0].state`).
    pub parameter_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    /// Gen2 component hint (`switch:0`, `sys`, `wifi`, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    #[serde(default)]
    pub requires_restart: bool,
}

/// Per-SKU descriptor of supported APIs and parameters, keyed by `device_type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub device_type: String,
    pub name: String,
    pub generation: crate::device::Generation,
    /// Other SKU strings treated as this same type.
    #[serde(default)]
    pub type_mappings: Vec<String>,
    pub apis: BTreeMap<String, ApiDescriptor>,
    pub parameters: BTreeMap<String, ParameterDescriptor>,
    /// Normalized generation timestamp of the last (re)discovery, used by
    /// `capabilities.refresh()`'s idempotency contract (scenario 6):
    /// excluded from the byte-identity comparison by tests, but present on
    /// disk so operators can tell cache age.
    #[serde(default)]
    pub discovered_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl CapabilityDefinition {
    /// True if `sku` is this definition's primary type or one of its synonyms.
    pub fn matches_sku(&self, sku: &str) -> bool {
        self.device_type == sku || self.type_mappings.iter().any(|s| s == sku)
    }
}

/// One generation-specific access recipe for a canonical logical parameter
/// name in the process-wide [`ParameterMapping`] table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gen1Access {
    pub endpoint: String,
    pub property: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gen2Access {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub property: String,
}

/// One entry in the standard [`ParameterMapping`] table: a canonical logical
/// name plus its Gen1 and Gen2+ access recipes, and the legacy Gen1 field
/// name(s) it subsumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub canonical_name: String,
    #[serde(default)]
    pub legacy_gen1_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gen1: Option<Gen1Access>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gen2: Option<Gen2Access>,
    #[serde(default)]
    pub ty: ParameterType,
    #[serde(default)]
    pub requires_restart: bool,
}

impl Default for ParameterType {
    fn default() -> Self {
        Self::String
    }
}

/// The single, process-wide, editable table translating legacy Gen1 field
/// names to canonical logical names and carrying each canonical name's
/// per-generation access recipe. Consulted by the Engine *before* falling
/// back to the per-type `CapabilityDefinition`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParameterMapping {
    entries: Vec<MappingEntry>,
}

impl ParameterMapping {
    pub fn new(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn insert(&mut self, entry: MappingEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.canonical_name == entry.canonical_name)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
    }

    /// Resolve `name` to its canonical form, translating a legacy Gen1 field
    /// name (`eco_mode_enabled`) to its canonical logical name (`eco_mode`)
    /// when one applies. Names with no legacy alias pass through unchanged.
    pub fn canonicalize<'a>(&'a self, name: &'a str) -> &'a str {
        for entry in &self.entries {
            if entry.canonical_name == name {
                return &entry.canonical_name;
            }
            if entry.legacy_gen1_names.iter().any(|n| n == name) {
                return &entry.canonical_name;
            }
        }
        name
    }

    /// Look up the mapping entry for a canonical (or legacy-aliased) name.
    pub fn get(&self, name: &str) -> Option<&MappingEntry> {
        let canonical = self.canonicalize(name);
        self.entries.iter().find(|e| e.canonical_name == canonical)
    }

    /// Every canonical name this table knows, for `devicesSupporting`-style
    /// scans.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.canonical_name.as_str())
    }
}
