// netswitch - Daemon Configuration
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Daemon configuration model.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::{CONFIG_DIR_NAME, STATE_FILE_NAME};

/// Bus on which the daemon publishes its own service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Per-user session bus.
    #[default]
    Session,
    /// System bus (requires a matching bus policy).
    System,
}

impl BusKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::System => "system",
        }
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Override for the switch state file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Reapply every device's previous state when the daemon starts.
    #[serde(default = "default_true")]
    pub restore_on_startup: bool,

    /// Reapply a device's previous state when it is plugged in.
    #[serde(default = "default_true")]
    pub restore_on_hotplug: bool,

    /// Bus the daemon service is published on.
    #[serde(default)]
    pub service_bus: BusKind,

    /// Capacity of the notification channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_event_buffer() -> usize {
    64
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: None,
            log_level: default_log_level(),
            restore_on_startup: true,
            restore_on_hotplug: true,
            service_bus: BusKind::Session,
            event_buffer: default_event_buffer(),
        }
    }
}

impl DaemonConfig {
    /// Default configuration directory (`$XDG_CONFIG_HOME/netswitch`).
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME)
    }

    /// Default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("daemon.toml")
    }

    /// Path of the switch state document.
    pub fn state_file_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join(STATE_FILE_NAME))
    }

    /// Load configuration from TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, super::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| super::Error::ConfigReadFailed(format!("{}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self, super::Error> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), super::Error> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
