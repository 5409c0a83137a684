//! Atomic write-to-temp-then-rename, and a small "load every YAML file in
//! this directory" helper shared by the devices/groups/capability stores.
//! Writes are atomic: a crash mid-write never leaves a half-written file.

use fleet_core::{FleetError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

fn to_io_err(path: &Path, e: impl std::fmt::Display) -> FleetError {
    FleetError::Internal(format!("{}: {e}", path.display()))
}

/// Serialize `value` as YAML and write it to `path`, via a sibling temp file
/// that is then renamed into place. A crash mid-write leaves either the old
/// file or nothing — never a half-written one.
pub fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| to_io_err(parent, e))?;
    }
    let yaml = serde_yaml::to_string(value).map_err(|e| to_io_err(path, e))?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, yaml).map_err(|e| to_io_err(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| to_io_err(path, e))?;
    Ok(())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("data");
    tmp.set_file_name(format!(".{file_name}.tmp"));
    tmp
}

/// Deserialize a single YAML file.
pub fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = fs::read_to_string(path).map_err(|e| to_io_err(path, e))?;
    serde_yaml::from_str(&raw).map_err(|e| to_io_err(path, e))
}

/// Every `*.yaml` file directly inside `dir`, paired with its modification
/// time (used to break ties when duplicate files describe the same key —
/// the intent: "the most recently modified wins"). Returns an empty list, not
/// an error, when `dir` doesn't exist yet: the system must survive the
/// absence of persisted data.
pub fn list_yaml_files(dir: &Path) -> Result<Vec<(PathBuf, std::time::SystemTime)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| to_io_err(dir, e))? {
        let entry = entry.map_err(|e| to_io_err(dir, e))?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let modified = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        out.push((path, modified));
    }
    Ok(out)
}

/// Remove a persisted file if present; absence is not an error.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(to_io_err(path, e)),
    }
}
