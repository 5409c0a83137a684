//! Handlers for every verb in the CLI surface: each parses its
//! own arguments into a core call, prints the result as JSON, and picks an
//! exit code. The core crates stay free of both flag parsing and terminal
//! output, here — that's this crate's entire job.

use crate::args::{CapabilitiesCommand, DevicesCommand, GroupOperateCommand, GroupsCommand, ParametersCommand};
use crate::context::AppContext;
use fleet_core::FleetError;
use fleet_devices::{parse_targets, probe_http};
use fleet_engine::{OperateOptions, SetOptions};
use fleet_groups::{GroupRequest, GroupUpdate};
use serde_json::Value;
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Exit codes for caller-contract violations and the safety interlock map
/// to `2`; everything else unexpected maps to `3`.
fn exit_for_fleet_error(err: &FleetError) -> ExitCode {
    match err {
        FleetError::ConfirmationRequired
        | FleetError::InvalidRequest(_)
        | FleetError::UnknownDevice(_)
        | FleetError::UnsupportedParameter(_) => ExitCode::from(2),
        _ => ExitCode::from(3),
    }
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_for_group_result(result: &fleet_core::GroupResult) -> ExitCode {
    if result.failure_count > 0 || result.skipped_count > 0 {
        ExitCode::from(1)
    } else {
        ExitCode::from(0)
    }
}

fn parse_value(raw: &str) -> anyhow::Result<Value> {
    serde_json::from_str(raw).map_err(|e| anyhow::anyhow!("invalid JSON value {raw:?}: {e}"))
}

pub async fn discover(context: &AppContext, targets: Option<String>, mdns_timeout_secs: u64) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    let mut http_devices = Vec::new();
    if let Some(targets) = targets {
        let addrs = parse_targets(&targets)?;
        http_devices = probe_http(&addrs, &context.config.discovery_config(), &cancel).await?;
    }
    let mdns_devices = fleet_devices::listen_mdns(Duration::from_secs(mdns_timeout_secs), &cancel).await?;

    let mut by_mac: std::collections::HashMap<String, fleet_core::Device> = std::collections::HashMap::new();
    for device in mdns_devices {
        by_mac.insert(device.id.clone(), device);
    }
    for device in http_devices {
        match by_mac.remove(&device.id) {
            Some(mdns_device) => {
                by_mac.insert(device.id.clone(), fleet_devices::merge_discovered(mdns_device, device));
            }
            None => {
                by_mac.insert(device.id.clone(), device);
            }
        }
    }

    let mut discovered: Vec<fleet_core::Device> = by_mac.into_values().collect();
    discovered.sort_by(|a, b| a.id.cmp(&b.id));
    for device in &discovered {
        context.registry.upsert(device.clone()).await?;
    }

    if !context.device_type_hints.is_empty() {
        tracing::debug!(count = context.device_type_hints.len(), "device_types.yaml hints loaded for classification");
    }

    print_json(&discovered)?;
    Ok(ExitCode::from(0))
}

pub async fn devices(context: &AppContext, cmd: DevicesCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        DevicesCommand::List => {
            print_json(&context.registry.snapshot().await)?;
            Ok(ExitCode::from(0))
        }
        DevicesCommand::Show { mac } => match context.registry.get(&mac).await {
            Some(device) => {
                print_json(&device)?;
                Ok(ExitCode::from(0))
            }
            None => {
                eprintln!("unknown device: {mac}");
                Ok(ExitCode::from(2))
            }
        },
        DevicesCommand::Refresh { mac, force } => {
            let Some(device) = context.registry.get(&mac).await else {
                eprintln!("unknown device: {mac}");
                return Ok(ExitCode::from(2));
            };
            let cancel = CancellationToken::new();
            match context
                .catalogue
                .refresh(&context.transport, &device, fleet_devices::RefreshOptions { force }, &cancel)
                .await
            {
                Ok(definition) => {
                    print_json(&definition)?;
                    Ok(ExitCode::from(0))
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    Ok(exit_for_fleet_error(&err))
                }
            }
        }
        DevicesCommand::Delete { mac } => {
            let deleted = context.registry.delete(&mac).await?;
            if deleted {
                Ok(ExitCode::from(0))
            } else {
                eprintln!("unknown device: {mac}");
                Ok(ExitCode::from(2))
            }
        }
    }
}

pub async fn groups(context: &AppContext, cmd: GroupsCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        GroupsCommand::Create { name, description } => match context.group_manager.create(&name, &description) {
            Ok(group) => {
                print_json(&group)?;
                Ok(ExitCode::from(0))
            }
            Err(err) => {
                eprintln!("error: {err}");
                Ok(exit_for_fleet_error(&err))
            }
        },
        GroupsCommand::List => {
            print_json(&context.group_manager.list()?)?;
            Ok(ExitCode::from(0))
        }
        GroupsCommand::Show { name } => match context.group_manager.show(&name) {
            Ok(group) => {
                print_json(&group)?;
                Ok(ExitCode::from(0))
            }
            Err(err) => {
                eprintln!("error: {err}");
                Ok(exit_for_fleet_error(&err))
            }
        },
        GroupsCommand::Update { name, rename, description } => {
            let update = GroupUpdate { new_name: rename, description, ..Default::default() };
            match context.group_manager.update(&name, update) {
                Ok(group) => {
                    print_json(&group)?;
                    Ok(ExitCode::from(0))
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    Ok(exit_for_fleet_error(&err))
                }
            }
        }
        GroupsCommand::Delete { name } => {
            context.group_manager.delete(&name)?;
            Ok(ExitCode::from(0))
        }
        GroupsCommand::AddDevice { name, mac } => match context.group_manager.add_device(&name, &mac) {
            Ok(group) => {
                print_json(&group)?;
                Ok(ExitCode::from(0))
            }
            Err(err) => {
                eprintln!("error: {err}");
                Ok(exit_for_fleet_error(&err))
            }
        },
        GroupsCommand::RemoveDevice { name, mac } => match context.group_manager.remove_device(&name, &mac) {
            Ok(group) => {
                print_json(&group)?;
                Ok(ExitCode::from(0))
            }
            Err(err) => {
                eprintln!("error: {err}");
                Ok(exit_for_fleet_error(&err))
            }
        },
        GroupsCommand::Operate { name, request, confirm } => {
            let request = translate_group_request(request)?;
            run_group_operate(context, &name, request, confirm).await
        }
    }
}

fn translate_group_request(command: GroupOperateCommand) -> anyhow::Result<GroupRequest> {
    Ok(match command {
        GroupOperateCommand::Get { logical_name } => GroupRequest::Get { logical_name },
        GroupOperateCommand::Set { logical_name, value, reboot_if_needed } => {
            GroupRequest::Set { logical_name, value: parse_value(&value)?, reboot_if_needed }
        }
        GroupOperateCommand::BulkSet { writes, reboot_if_needed } => {
            let mut parsed = Vec::with_capacity(writes.len());
            for entry in writes {
                let (name, raw_value) = entry
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("expected NAME=VALUE, got {entry:?}"))?;
                parsed.push((name.to_string(), parse_value(raw_value)?));
            }
            GroupRequest::BulkSet { writes: parsed, reboot_if_needed }
        }
        GroupOperateCommand::Verb { verb, args } => {
            GroupRequest::Operate { verb, args: parse_value(&args)?, opts: OperateOptions::default() }
        }
    })
}

async fn run_group_operate(context: &AppContext, name: &str, request: GroupRequest, confirm: bool) -> anyhow::Result<ExitCode> {
    let cancel = CancellationToken::new();
    match context.group_executor.operate(name, request, confirm, &cancel).await {
        Ok(result) => {
            let code = exit_for_group_result(&result);
            print_json(&result)?;
            Ok(code)
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(exit_for_fleet_error(&err))
        }
    }
}

pub async fn parameters(context: &AppContext, cmd: ParametersCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        ParametersCommand::List { mac } => match context.engine.supported(&mac).await {
            Ok((parameters, operations)) => {
                print_json(&serde_json::json!({"parameters": parameters, "operations": operations}))?;
                Ok(ExitCode::from(0))
            }
            Err(err) => {
                eprintln!("error: {err}");
                Ok(exit_for_fleet_error(&err))
            }
        },
        ParametersCommand::Get { mac, logical_name } => {
            let cancel = CancellationToken::new();
            match context.engine.get(&mac, &logical_name, &cancel).await {
                Ok((value, descriptor)) => {
                    print_json(&serde_json::json!({"value": value, "descriptor": descriptor}))?;
                    Ok(ExitCode::from(0))
                }
                Err(err) => {
                    eprintln!("error: {err}");
                    Ok(exit_for_fleet_error(&err))
                }
            }
        }
        ParametersCommand::Set { mac, logical_name, value, reboot_if_needed } => {
            let cancel = CancellationToken::new();
            let value = parse_value(&value)?;
            let result = context.engine.set(&mac, &logical_name, value, SetOptions { reboot_if_needed }, &cancel).await;
            let code = if result.success { ExitCode::from(0) } else { ExitCode::from(1) };
            print_json(&result)?;
            Ok(code)
        }
        ParametersCommand::Apply { group, logical_name, value, confirm, reboot_if_needed } => {
            let value = parse_value(&value)?;
            let request = GroupRequest::Set { logical_name, value, reboot_if_needed };
            run_group_operate(context, &group, request, confirm).await
        }
    }
}

pub async fn capabilities(context: &AppContext, cmd: CapabilitiesCommand) -> anyhow::Result<ExitCode> {
    match cmd {
        CapabilitiesCommand::List => {
            print_json(&context.catalogue.list().await)?;
            Ok(ExitCode::from(0))
        }
        CapabilitiesCommand::Show { device_type } => match context.catalogue.get(&device_type).await {
            Some(definition) => {
                print_json(&definition)?;
                Ok(ExitCode::from(0))
            }
            None => {
                eprintln!("unknown device type: {device_type}");
                Ok(ExitCode::from(2))
            }
        },
        CapabilitiesCommand::Discover { mac } => capability_refresh(context, &mac, false).await,
        CapabilitiesCommand::Refresh { mac } => capability_refresh(context, &mac, true).await,
        CapabilitiesCommand::CheckParameter { logical_name } => {
            print_json(&context.catalogue.devices_supporting(&logical_name).await)?;
            Ok(ExitCode::from(0))
        }
        CapabilitiesCommand::Standardize { dry_run } => match context.catalogue.standardize(dry_run).await {
            Ok(diffs) => {
                let rendered: Vec<_> = diffs.into_iter().map(|(from, to)| serde_json::json!({"from": from, "to": to})).collect();
                print_json(&rendered)?;
                Ok(ExitCode::from(0))
            }
            Err(err) => {
                eprintln!("error: {err}");
                Ok(exit_for_fleet_error(&err))
            }
        },
    }
}

async fn capability_refresh(context: &AppContext, mac: &str, force: bool) -> anyhow::Result<ExitCode> {
    let Some(device) = context.registry.get(mac).await else {
        eprintln!("unknown device: {mac}");
        return Ok(ExitCode::from(2));
    };
    let cancel = CancellationToken::new();
    match context.catalogue.refresh(&context.transport, &device, fleet_devices::RefreshOptions { force }, &cancel).await {
        Ok(definition) => {
            print_json(&definition)?;
            Ok(ExitCode::from(0))
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(exit_for_fleet_error(&err))
        }
    }
}
