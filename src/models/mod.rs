// netswitch - Shared Models
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! # Shared Models
//!
//! Types shared by the daemon, the D-Bus service and the CLI client:
//!
//! - **Document**: Persisted switch state and the device registry
//! - **Switches**: Global category switches (wired, wireless, wwan, vpn)
//! - **Device**: Device handles, stable identifiers, types and states
//! - **Event**: Notifications broadcast on state changes
//! - **Config**: Daemon configuration
//! - **Error**: Shared error types

pub mod config;
pub mod device;
pub mod document;
pub mod error;
pub mod event;
pub mod switches;

// Re-export main types for convenience
pub use config::{BusKind, DaemonConfig};
pub use device::{DeviceId, DeviceRef, DeviceState, DeviceType};
pub use document::{DeviceSettings, SettingsDocument};
pub use error::{Error, Result};
pub use event::SwitchEvent;
pub use switches::SwitchCategory;

/// D-Bus service name for the daemon.
pub const DBUS_SERVICE_NAME: &str = "com.netswitch.Daemon";

/// D-Bus object path for the daemon interface.
pub const DBUS_OBJECT_PATH: &str = "/com/netswitch/Daemon";

/// D-Bus interface name for the daemon.
pub const DBUS_INTERFACE: &str = "com.netswitch.Daemon";

/// Configuration directory name (under XDG_CONFIG_HOME).
pub const CONFIG_DIR_NAME: &str = "netswitch";

/// Switch state file name.
pub const STATE_FILE_NAME: &str = "network.json";
