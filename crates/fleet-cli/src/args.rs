//! Flag parsing for the full CLI surface. The core crates never see a
//! `clap` type; every variant here is translated into a plain core call by
//! `commands.rs`.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "shelly-fleet")]
#[command(author, version, about = "Fleet manager for Shelly-family smart devices", long_about = None)]
pub struct Cli {
    /// Directory holding `config/` and `data/` (defaults to the current directory).
    #[arg(long, global = true, default_value = ".")]
    pub data_dir: std::path::PathBuf,

    /// Emit JSON-formatted logs instead of the compact human format.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Find devices via mDNS and/or active HTTP probing.
    Discover {
        /// CIDR block(s) or explicit IPs to probe, comma-separated (e.g. "192.168.1.0/24").
        #[arg(long)]
        targets: Option<String>,
        /// How long to listen for mDNS announcements, in seconds.
        #[arg(long, default_value_t = 3)]
        mdns_timeout_secs: u64,
    },
    /// Inspect and manage the device registry.
    Devices {
        #[command(subcommand)]
        command: DevicesCommand,
    },
    /// Create, inspect, and operate on device groups.
    Groups {
        #[command(subcommand)]
        command: GroupsCommand,
    },
    /// Read and write logical parameters on a device or group.
    Parameters {
        #[command(subcommand)]
        command: ParametersCommand,
    },
    /// Inspect and refresh the capability catalogue.
    Capabilities {
        #[command(subcommand)]
        command: CapabilitiesCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum DevicesCommand {
    /// List every device in the registry.
    List,
    /// Show one device's full record.
    Show { mac: String },
    /// Re-run capability discovery against one device.
    Refresh {
        mac: String,
        /// Bypass the "don't overwrite hand-edited files" guard.
        #[arg(long)]
        force: bool,
    },
    /// Remove a device from the registry.
    Delete { mac: String },
}

#[derive(Subcommand, Debug)]
pub enum GroupsCommand {
    /// Create a new, empty group.
    Create {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// List every persisted group.
    List,
    /// Show one group's full record.
    Show { name: String },
    /// Rename a group and/or change its description.
    Update {
        name: String,
        #[arg(long)]
        rename: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a group.
    Delete { name: String },
    /// Add a device MAC to a group.
    AddDevice { name: String, mac: String },
    /// Remove a device MAC from a group.
    RemoveDevice { name: String, mac: String },
    /// Run a logical request across every device in a group.
    Operate {
        /// Group name, or the reserved `all-devices` for the whole registry.
        name: String,
        #[command(subcommand)]
        request: GroupOperateCommand,
        /// Required to target `all-devices` with a destructive verb.
        #[arg(long)]
        confirm: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum GroupOperateCommand {
    /// Read a logical parameter from every device in the group.
    Get { logical_name: String },
    /// Write a logical parameter on every device in the group.
    Set {
        logical_name: String,
        /// JSON-encoded value (e.g. `true`, `42`, `"follow"`).
        value: String,
        #[arg(long)]
        reboot_if_needed: bool,
    },
    /// Write several logical parameters at once, each `NAME=JSON_VALUE`.
    BulkSet {
        #[arg(long, num_args = 1.., value_name = "NAME=VALUE")]
        writes: Vec<String>,
        #[arg(long)]
        reboot_if_needed: bool,
    },
    /// Run a control verb (`on`, `off`, `toggle`, `reboot`, ...).
    Verb {
        verb: String,
        /// JSON-encoded argument object (e.g. `{"brightness":50}`).
        #[arg(default_value = "null")]
        args: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ParametersCommand {
    /// List the parameters and operations a device's capability surface supports.
    List { mac: String },
    /// Read a logical parameter from one device.
    Get { mac: String, logical_name: String },
    /// Write a logical parameter on one device.
    Set {
        mac: String,
        logical_name: String,
        /// JSON-encoded value.
        value: String,
        #[arg(long)]
        reboot_if_needed: bool,
    },
    /// Write a logical parameter across a whole group (shorthand for `groups operate ... set`).
    Apply {
        group: String,
        logical_name: String,
        value: String,
        #[arg(long)]
        confirm: bool,
        #[arg(long)]
        reboot_if_needed: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum CapabilitiesCommand {
    /// List every capability definition in the catalogue.
    List,
    /// Show one device type's capability definition.
    Show { device_type: String },
    /// Probe a device and record a fresh capability definition for its type.
    Discover { mac: String },
    /// Re-run discovery for a device's type, bypassing the hand-edit guard.
    Refresh { mac: String },
    /// List device types that support a given logical parameter name.
    CheckParameter { logical_name: String },
    /// Apply (or, with `--dry-run`, just report) Gen1-to-canonical renames across the catalogue.
    Standardize {
        #[arg(long)]
        dry_run: bool,
    },
}
