// netswitch - Device Types
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Device handles, identifiers and states as reported by the network stack.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::switches::SwitchCategory;

/// Transient handle of a live device (a NetworkManager object path).
///
/// Handles change across NetworkManager restarts and hotplug cycles, so
/// they are never persisted. See [`DeviceId`] for the stable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceRef(String);

impl DeviceRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceRef {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Stable identifier of a physical or logical device.
///
/// This is the key of the persisted device map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Kind of device, reduced to what the switch logic distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    /// Wired Ethernet device.
    Ethernet,
    /// Wireless (Wi-Fi) device.
    Wifi,
    /// Mobile broadband modem.
    Modem,
    /// Anything else (bridges, tunnels, loopback...).
    Other,
}

impl DeviceType {
    /// Map a raw `NM_DEVICE_TYPE_*` value.
    pub fn from_nm(raw: u32) -> Self {
        match raw {
            1 => Self::Ethernet,
            2 => Self::Wifi,
            8 => Self::Modem,
            _ => Self::Other,
        }
    }

    /// Global switch governing this kind of device, if any.
    pub fn category(&self) -> Option<SwitchCategory> {
        match self {
            Self::Ethernet => Some(SwitchCategory::Wired),
            Self::Wifi => Some(SwitchCategory::Wireless),
            Self::Modem => Some(SwitchCategory::Wwan),
            Self::Other => None,
        }
    }

    /// Get human-readable name for this device type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Ethernet => "Ethernet",
            Self::Wifi => "Wi-Fi",
            Self::Modem => "Mobile Broadband",
            Self::Other => "Network",
        }
    }
}

/// Device state, mirroring `NM_DEVICE_STATE_*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Unknown,
    Unmanaged,
    Unavailable,
    Disconnected,
    Prepare,
    Config,
    NeedAuth,
    IpConfig,
    IpCheck,
    Secondaries,
    Activated,
    Deactivating,
    Failed,
}

impl DeviceState {
    /// Map a raw `NM_DEVICE_STATE_*` value.
    pub fn from_nm(raw: u32) -> Self {
        match raw {
            10 => Self::Unmanaged,
            20 => Self::Unavailable,
            30 => Self::Disconnected,
            40 => Self::Prepare,
            50 => Self::Config,
            60 => Self::NeedAuth,
            70 => Self::IpConfig,
            80 => Self::IpCheck,
            90 => Self::Secondaries,
            100 => Self::Activated,
            110 => Self::Deactivating,
            120 => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Whether the device is fully activated.
    pub fn is_activated(&self) -> bool {
        matches!(self, Self::Activated)
    }
}
