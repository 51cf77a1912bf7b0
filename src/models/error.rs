// netswitch - Error Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Shared error types for the switch daemon.

use thiserror::Error;

/// Result type alias for netswitch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for netswitch operations.
#[derive(Debug, Error)]
pub enum Error {
    // ========================================
    // Resolution Errors
    // ========================================
    #[error("Cannot derive a device identifier for {0}")]
    DeviceIdentifierUnavailable(String),

    #[error("Device config for {0} does not exist")]
    DeviceConfigNotFound(String),

    #[error("Unknown switch category: {0}")]
    UnknownCategory(String),

    // ========================================
    // Adapter Errors
    // ========================================
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    #[error("Adapter operation failed: {operation} - {reason}")]
    AdapterFailed { operation: String, reason: String },

    // ========================================
    // D-Bus Errors
    // ========================================
    #[error("D-Bus error: {0}")]
    Dbus(String),

    #[error("NetworkManager D-Bus error: {0}")]
    NetworkManagerDbus(String),

    #[error("Daemon not running")]
    DaemonNotRunning,

    #[error("D-Bus connection failed: {0}")]
    DbusConnectionFailed(String),

    // ========================================
    // Storage Errors
    // ========================================
    #[error("Failed to read configuration: {0}")]
    ConfigReadFailed(String),

    #[error("Failed to write configuration: {0}")]
    ConfigWriteFailed(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParseFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new adapter failure.
    pub fn adapter_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AdapterFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error means a device could not be resolved to a registry entry.
    pub fn is_resolution_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceIdentifierUnavailable(_) | Self::DeviceConfigNotFound(_)
        )
    }

    /// Check if this error indicates the daemon is not running.
    pub fn is_daemon_not_running(&self) -> bool {
        matches!(self, Self::DaemonNotRunning | Self::DbusConnectionFailed(_))
    }
}

// Convert from zbus errors
impl From<zbus::Error> for Error {
    fn from(err: zbus::Error) -> Self {
        Error::Dbus(err.to_string())
    }
}

impl From<zbus::zvariant::Error> for Error {
    fn from(err: zbus::zvariant::Error) -> Self {
        Error::Dbus(err.to_string())
    }
}

// Convert from toml parse errors
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

// Convert from toml serialize errors
impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::ConfigWriteFailed(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::ConfigParseFailed(err.to_string())
    }
}

// Errors surfaced to D-Bus callers
impl From<Error> for zbus::fdo::Error {
    fn from(err: Error) -> Self {
        zbus::fdo::Error::Failed(err.to_string())
    }
}
