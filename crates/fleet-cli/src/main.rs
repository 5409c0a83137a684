//! `shelly-fleet` — CLI front-end over the fleet control plane.
//! Parses flags, wires up an `AppContext`, dispatches to `commands`, and
//! prints JSON. No core crate depends on this one.

mod args;
mod commands;
mod config;
mod context;

use args::{Cli, Command};
use clap::Parser;
use context::AppContext;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let log_json = cli.log_json || std::env::var("SHELLY_LOG_JSON").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    init_logging(cli.verbose, log_json);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::from(3)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let context = AppContext::load(&cli.data_dir)?;

    match cli.command {
        Command::Discover { targets, mdns_timeout_secs } => commands::discover(&context, targets, mdns_timeout_secs).await,
        Command::Devices { command } => commands::devices(&context, command).await,
        Command::Groups { command } => commands::groups(&context, command).await,
        Command::Parameters { command } => commands::parameters(&context, command).await,
        Command::Capabilities { command } => commands::capabilities(&context, command).await,
    }
}

fn init_logging(verbose: bool, json: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("shelly_fleet={default_level}")));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).with_target(true).init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_level(true)
            .compact()
            .init();
    }
}
