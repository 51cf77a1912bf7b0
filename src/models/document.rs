// netswitch - Settings Document
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! The persisted settings document and its device registry.
//!
//! Field names are serialized in PascalCase so state files written by
//! earlier releases keep loading. Every field has a default, so older
//! files missing a field load as if the field held its default.
//!
//! The methods here only mutate memory. Callers own locking and saving
//! (see `services::reconcile`).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::device::DeviceId;
use super::error::{Error, Result};

/// Per-device switch settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DeviceSettings {
    /// Current user intent for this device.
    pub enabled: bool,

    /// Value of `enabled` right before the most recent change.
    pub last_enabled: bool,

    /// UUID of the connection most recently activated on the device.
    ///
    /// Runtime only: the network stack picks connections on its own after
    /// login, this is only used to reactivate within the same session.
    #[serde(skip)]
    pub last_connection_uuid: String,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            last_enabled: true,
            last_connection_uuid: String::new(),
        }
    }
}

impl DeviceSettings {
    /// Create default settings remembering the given active connection.
    pub fn with_connection(uuid: Option<String>) -> Self {
        Self {
            last_connection_uuid: uuid.unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Record a transition: the current value moves to `last_enabled`.
    pub fn transition(&mut self, enabled: bool) {
        self.last_enabled = self.enabled;
        self.enabled = enabled;
    }
}

/// Root of the persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SettingsDocument {
    pub wired_enabled: bool,
    pub vpn_enabled: bool,

    pub last_wireless_enabled: bool,
    pub last_wwan_enabled: bool,
    pub last_wired_enabled: bool,
    pub last_vpn_enabled: bool,

    /// Known devices keyed by stable identifier, kept sorted so repeated
    /// saves of the same state produce the same bytes.
    pub devices: BTreeMap<DeviceId, DeviceSettings>,
}

impl Default for SettingsDocument {
    fn default() -> Self {
        Self {
            wired_enabled: true,
            vpn_enabled: true,
            last_wireless_enabled: true,
            last_wwan_enabled: true,
            last_wired_enabled: true,
            last_vpn_enabled: true,
            devices: BTreeMap::new(),
        }
    }
}

impl SettingsDocument {
    // ========================================================================
    // Device Registry
    // ========================================================================

    /// Whether an entry exists for the device.
    pub fn device_exists(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    /// Get the entry for a device.
    pub fn device(&self, id: &DeviceId) -> Result<&DeviceSettings> {
        self.devices
            .get(id)
            .ok_or_else(|| Error::DeviceConfigNotFound(id.to_string()))
    }

    /// Get the entry for a device, mutably.
    pub fn device_mut(&mut self, id: &DeviceId) -> Result<&mut DeviceSettings> {
        self.devices
            .get_mut(id)
            .ok_or_else(|| Error::DeviceConfigNotFound(id.to_string()))
    }

    /// Insert an entry unless one exists. Returns whether it was inserted.
    pub fn insert_device(&mut self, id: DeviceId, settings: DeviceSettings) -> bool {
        if self.devices.contains_key(&id) {
            return false;
        }
        self.devices.insert(id, settings);
        true
    }

    /// Remove an entry. Returns whether one existed.
    pub fn remove_device(&mut self, id: &DeviceId) -> bool {
        self.devices.remove(id).is_some()
    }

    /// Set `last_enabled` on every entry.
    pub fn set_all_last_enabled(&mut self, enabled: bool) {
        for settings in self.devices.values_mut() {
            settings.last_enabled = enabled;
        }
    }

    /// Remember the last connection of a device. Returns whether it changed.
    pub fn set_last_connection_uuid(&mut self, id: &DeviceId, uuid: &str) -> Result<bool> {
        let settings = self.device_mut(id)?;
        if settings.last_connection_uuid == uuid {
            return Ok(false);
        }
        settings.last_connection_uuid = uuid.to_string();
        Ok(true)
    }

    /// Forget a deleted connection on every device. Returns how many referenced it.
    pub fn clear_connection(&mut self, uuid: &str) -> usize {
        let mut cleared = 0;
        for settings in self.devices.values_mut() {
            if settings.last_connection_uuid == uuid {
                settings.last_connection_uuid.clear();
                cleared += 1;
            }
        }
        cleared
    }

    /// Serialize to the on-disk representation.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from the on-disk representation.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document_with(ids: &[&str]) -> SettingsDocument {
        let mut doc = SettingsDocument::default();
        for id in ids {
            doc.insert_device(DeviceId::from(*id), DeviceSettings::default());
        }
        doc
    }

    #[test]
    fn test_defaults_are_all_on() {
        let doc = SettingsDocument::default();
        assert!(doc.wired_enabled && doc.vpn_enabled);
        assert!(doc.last_wireless_enabled && doc.last_wwan_enabled);
        assert!(doc.last_wired_enabled && doc.last_vpn_enabled);
        assert!(doc.devices.is_empty());
    }

    #[test]
    fn test_missing_fields_keep_defaults() {
        let doc = SettingsDocument::from_json(
            r#"{"WiredEnabled": false, "Devices": {"aa": {"Enabled": false}}}"#,
        )
        .expect("partial document should load");
        assert!(!doc.wired_enabled);
        assert!(doc.vpn_enabled);
        assert!(doc.last_vpn_enabled);
        let dev = doc.device(&DeviceId::from("aa")).expect("device should load");
        assert!(!dev.enabled);
        assert!(dev.last_enabled);
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let doc = SettingsDocument::from_json(r#"{"VpnEnabled": false, "VpnConnections": {}}"#)
            .expect("unknown fields should be ignored");
        assert!(!doc.vpn_enabled);
    }

    #[test]
    fn test_connection_uuid_not_serialized() {
        let mut doc = document_with(&["aa"]);
        doc.set_last_connection_uuid(&DeviceId::from("aa"), "uuid-1")
            .expect("device exists");
        let json = doc.to_json().expect("document should serialize");
        assert!(!json.contains("uuid-1"));
        assert!(json.contains("\"LastEnabled\""));
    }

    #[test]
    fn test_insert_is_noop_when_present() {
        let mut doc = document_with(&["aa"]);
        doc.device_mut(&DeviceId::from("aa")).expect("present").enabled = false;
        assert!(!doc.insert_device(DeviceId::from("aa"), DeviceSettings::default()));
        assert!(!doc.device(&DeviceId::from("aa")).expect("present").enabled);
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let mut doc = SettingsDocument::default();
        let err = doc
            .set_last_connection_uuid(&DeviceId::from("zz"), "uuid")
            .expect_err("unknown device should fail");
        assert!(matches!(err, Error::DeviceConfigNotFound(_)));
        assert!(!doc.remove_device(&DeviceId::from("zz")));
    }

    #[test]
    fn test_set_last_connection_reports_change() {
        let mut doc = document_with(&["aa"]);
        let id = DeviceId::from("aa");
        assert!(doc.set_last_connection_uuid(&id, "uuid-1").expect("present"));
        assert!(!doc.set_last_connection_uuid(&id, "uuid-1").expect("present"));
    }

    #[test]
    fn test_clear_connection_only_touches_matches() {
        let mut doc = document_with(&["aa", "bb", "cc"]);
        doc.set_last_connection_uuid(&DeviceId::from("aa"), "home").expect("present");
        doc.set_last_connection_uuid(&DeviceId::from("bb"), "home").expect("present");
        doc.set_last_connection_uuid(&DeviceId::from("cc"), "office").expect("present");

        assert_eq!(doc.clear_connection("home"), 2);
        assert_eq!(doc.clear_connection("missing"), 0);
        assert!(doc.devices.values().all(|d| d.last_connection_uuid != "home"));
        assert_eq!(
            doc.device(&DeviceId::from("cc")).expect("present").last_connection_uuid,
            "office"
        );
    }

    #[test]
    fn test_transition_keeps_one_step_history() {
        let mut settings = DeviceSettings::default();
        settings.transition(false);
        assert!(!settings.enabled && settings.last_enabled);
        settings.transition(false);
        assert!(!settings.enabled && !settings.last_enabled);
    }

    #[test]
    fn test_json_is_stable() {
        let doc = document_with(&["cc", "aa", "bb"]);
        let first = doc.to_json().expect("serialize");
        let reloaded = SettingsDocument::from_json(&first).expect("deserialize");
        assert_eq!(reloaded.to_json().expect("serialize"), first);
    }
}
