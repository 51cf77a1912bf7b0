// netswitch - Main Entry Point
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # netswitch
//!
//! Per-device and per-category network switches on top of NetworkManager.
//!
//! `netswitch run` starts the daemon. The other commands talk to a running
//! daemon over D-Bus.

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

mod adapter;
mod dbus_client;
mod dbus_service;
mod models;
mod nm_client;
mod services;
mod storage;

use dbus_client::DaemonClient;
use dbus_service::DaemonService;
use models::{DaemonConfig, Result, SwitchCategory};
use nm_client::NmAdapter;
use services::{CascadeService, DeviceMonitor, DeviceSwitchManager};
use storage::SettingsStore;

/// Human-readable application name.
pub const APP_NAME: &str = "netswitch";

/// Application version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Print version information and exit.
fn print_version() {
    println!("{} {}", APP_NAME, VERSION);
    println!("Copyright (C) 2026 Christos A. Daggas");
    println!("License: MIT");
}

/// Print help information and exit.
fn print_help() {
    println!(
        "Usage: {} [OPTIONS] [COMMAND]",
        env::args().next().unwrap_or_else(|| APP_NAME.to_string())
    );
    println!();
    println!("Per-device and per-category network switches for NetworkManager.");
    println!();
    println!("Commands:");
    println!("  run                          Run the daemon (default)");
    println!("  enable <device-path>         Switch a device on");
    println!("  disable <device-path>        Switch a device off");
    println!("  restore <device-path>        Reapply a device's previous state");
    println!("  status <device-path>         Show whether a device is switched on");
    println!("  switch <category> [on|off|restore]");
    println!("                               Show, set or restore a global switch");
    println!("                               (wired, wireless, wwan, vpn)");
    println!();
    println!("Options:");
    println!("  -h, --help           Show this help message and exit");
    println!("  -v, --version        Show version information and exit");
    println!("  -d, --debug          Enable debug logging");
    println!("  -c, --config <file>  Use an alternative configuration file");
    println!();
    println!("Environment variables:");
    println!("  RUST_LOG             Set log level (trace, debug, info, warn, error)");
}

/// What the command line asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Run,
    Enable(String),
    Disable(String),
    Restore(String),
    Status(String),
    Switch(SwitchCategory, Option<bool>),
    RestoreSwitch(SwitchCategory),
}

#[derive(Debug)]
struct Options {
    command: Command,
    debug: bool,
    config: Option<PathBuf>,
}

enum Parsed {
    Options(Options),
    Exit(ExitCode),
}

fn parse_args(args: &[String]) -> std::result::Result<Parsed, String> {
    let mut debug = false;
    let mut config = None;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(Parsed::Exit(ExitCode::SUCCESS));
            }
            "-v" | "--version" => {
                print_version();
                return Ok(Parsed::Exit(ExitCode::SUCCESS));
            }
            "-d" | "--debug" => {
                debug = true;
            }
            "-c" | "--config" => match iter.next() {
                Some(path) => config = Some(PathBuf::from(path)),
                None => return Err(format!("{} requires a file argument", arg)),
            },
            _ => {
                if arg.starts_with('-') {
                    return Err(format!("Unknown option: {}", arg));
                }
                positional.push(arg.as_str());
            }
        }
    }

    let command = parse_command(&positional)?;
    Ok(Parsed::Options(Options {
        command,
        debug,
        config,
    }))
}

fn parse_command(words: &[&str]) -> std::result::Result<Command, String> {
    let device = |name: &str| -> std::result::Result<String, String> {
        match words.get(1) {
            Some(path) if words.len() == 2 => Ok(path.to_string()),
            _ => Err(format!("Usage: {} {} <device-path>", APP_NAME, name)),
        }
    };

    match words.first().copied() {
        None => Ok(Command::Run),
        Some("run") if words.len() == 1 => Ok(Command::Run),
        Some("run") => Err(format!("Unexpected argument: {}", words[1])),
        Some("enable") => Ok(Command::Enable(device("enable")?)),
        Some("disable") => Ok(Command::Disable(device("disable")?)),
        Some("restore") => Ok(Command::Restore(device("restore")?)),
        Some("status") => Ok(Command::Status(device("status")?)),
        Some("switch") => {
            let category = words
                .get(1)
                .ok_or_else(|| format!("Usage: {} switch <category> [on|off|restore]", APP_NAME))?
                .parse::<SwitchCategory>()
                .map_err(|e| e.to_string())?;
            if words.len() > 3 {
                return Err(format!("Unexpected argument: {}", words[3]));
            }
            match words.get(2).copied() {
                None => Ok(Command::Switch(category, None)),
                Some("on") => Ok(Command::Switch(category, Some(true))),
                Some("off") => Ok(Command::Switch(category, Some(false))),
                Some("restore") => Ok(Command::RestoreSwitch(category)),
                Some(other) => Err(format!("Expected on, off or restore, got: {}", other)),
            }
        }
        Some(other) => Err(format!("Unknown command: {}", other)),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Parsed::Options(options)) => options,
        Ok(Parsed::Exit(code)) => return code,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Try '--help' for more information.");
            return ExitCode::FAILURE;
        }
    };

    let config_path = options.config.clone().unwrap_or_else(DaemonConfig::default_path);
    let config = match DaemonConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging with appropriate level
    let log_level = if options.debug {
        tracing::Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(tracing::Level::INFO)
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(log_level.into()),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(async {
        match options.command {
            Command::Run => run_daemon(config, &config_path).await,
            command => run_client(command, &config).await,
        }
    });

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if e.is_daemon_not_running() {
                eprintln!("{} daemon is not running", APP_NAME);
            } else {
                eprintln!("Error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run_daemon(config: DaemonConfig, config_path: &std::path::Path) -> Result<()> {
    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    if !config_path.exists() {
        match config.save_to_file(config_path) {
            Ok(()) => tracing::info!("Wrote default configuration to {}", config_path.display()),
            Err(e) => tracing::warn!("Could not write {}: {}", config_path.display(), e),
        }
    }

    let adapter = Arc::new(NmAdapter::connect().await?);
    let store = SettingsStore::with_path(config.state_file_path());
    let manager = Arc::new(DeviceSwitchManager::new(
        adapter.clone(),
        store,
        config.event_buffer,
    ));

    let cascade = Arc::new(CascadeService::new(manager.clone()));
    let cascade_task = cascade.start();

    let monitor = Arc::new(DeviceMonitor::new(manager.clone(), config.restore_on_hotplug));
    let (events_tx, events_rx) = mpsc::channel(config.event_buffer.max(1));
    let watcher = adapter.clone().watch(events_tx).await?;
    monitor.register_existing(config.restore_on_startup).await;
    let monitor_task = monitor.clone().start(events_rx);

    let service = DaemonService::start(manager.clone(), config.service_bus).await?;
    tracing::info!("{} ready", APP_NAME);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to wait for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");

    service.stop().await;
    watcher.abort();
    monitor_task.abort();
    cascade.stop();
    cascade_task.abort();
    Ok(())
}

async fn run_client(command: Command, config: &DaemonConfig) -> Result<()> {
    let mut client = DaemonClient::new();
    client.connect(config.service_bus).await?;

    match command {
        Command::Run => {}
        Command::Enable(device) => client.enable_device(&device, true).await?,
        Command::Disable(device) => client.enable_device(&device, false).await?,
        Command::Restore(device) => client.restore_device_state(&device).await?,
        Command::Status(device) => {
            let enabled = client.is_device_enabled(&device).await?;
            println!("{}: {}", device, if enabled { "on" } else { "off" });
        }
        Command::Switch(category, None) => {
            let enabled = client.category_enabled(category).await?;
            println!("{}: {}", category, if enabled { "on" } else { "off" });
        }
        Command::Switch(category, Some(enabled)) => {
            if !client.set_category_enabled(category, enabled).await? {
                println!("{} already {}", category, if enabled { "on" } else { "off" });
            }
        }
        Command::RestoreSwitch(category) => {
            if !client.restore_category_state(category).await? {
                println!("{} already at its remembered value", category);
            }
        }
    }
    Ok(())
}
