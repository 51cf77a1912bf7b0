// netswitch - Device Switch Reconciliation
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Reconciliation of user switch intent with the live network stack.
//!
//! [`DeviceSwitchManager`] exclusively owns the settings document. Each
//! read-modify-write, and the save that follows it, runs under the
//! document mutex. The mutex is never held across an adapter call, so a
//! slow activation on one device does not stall requests for another.
//!
//! Failure policy:
//!
//! | failure                                         | outcome                 |
//! |-------------------------------------------------|-------------------------|
//! | identifier resolution in `is_device_enabled`    | device reported enabled |
//! | identifier resolution anywhere else             | returned to caller      |
//! | missing registry entry                          | logged, returned        |
//! | device type / radio read during auto-enable     | logged, auto-enable off |
//! | connection lookup / state read before activate  | logged, no activation   |
//! | activate / disconnect                           | returned after notify   |
//! | saving                                          | logged by the store     |

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::adapter::NetworkAdapter;
use crate::models::{
    DeviceId, DeviceRef, DeviceSettings, DeviceType, Error, Result, SettingsDocument,
    SwitchCategory, SwitchEvent,
};
use crate::storage::SettingsStore;

/// Owner of the switch state and the policy applied to it.
pub struct DeviceSwitchManager {
    adapter: Arc<dyn NetworkAdapter>,
    store: SettingsStore,
    document: Mutex<SettingsDocument>,
    events: broadcast::Sender<SwitchEvent>,
}

impl DeviceSwitchManager {
    /// Create a manager, loading (or creating) the document from the store.
    pub fn new(adapter: Arc<dyn NetworkAdapter>, store: SettingsStore, event_buffer: usize) -> Self {
        let document = store.load();
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            adapter,
            store,
            document: Mutex::new(document),
            events,
        }
    }

    /// Subscribe to state change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SwitchEvent> {
        self.events.subscribe()
    }

    /// The network stack this manager drives.
    pub fn adapter(&self) -> &Arc<dyn NetworkAdapter> {
        &self.adapter
    }

    /// Copy of the current document.
    pub fn snapshot(&self) -> SettingsDocument {
        self.read(|doc| doc.clone())
    }

    // ========================================================================
    // Mutex Helper Methods (handle poisoning gracefully)
    // ========================================================================

    fn read<R>(&self, reader: impl FnOnce(&SettingsDocument) -> R) -> R {
        match self.document.lock() {
            Ok(guard) => reader(&guard),
            Err(poisoned) => {
                warn!("Document lock poisoned reading, recovering");
                reader(&poisoned.into_inner())
            }
        }
    }

    fn write<R>(&self, writer: impl FnOnce(&mut SettingsDocument) -> R) -> R {
        match self.document.lock() {
            Ok(mut guard) => writer(&mut guard),
            Err(poisoned) => {
                warn!("Document lock poisoned writing, recovering");
                writer(&mut poisoned.into_inner())
            }
        }
    }

    fn emit(&self, event: SwitchEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // ========================================================================
    // Device Registry
    // ========================================================================

    pub fn device_exists(&self, id: &DeviceId) -> bool {
        self.read(|doc| doc.device_exists(id))
    }

    pub fn device_settings(&self, id: &DeviceId) -> Result<DeviceSettings> {
        self.read(|doc| doc.device(id).cloned()).map_err(log_missing)
    }

    /// Register a device reported by the network stack.
    ///
    /// Does nothing if the device already has an entry.
    pub async fn add_device_config(&self, device: &DeviceRef) -> Result<DeviceId> {
        let id = self.adapter.device_identifier(device).await?;
        if self.device_exists(&id) {
            return Ok(id);
        }

        let active_uuid = match self.adapter.active_connection_uuid(device).await {
            Ok(uuid) => uuid,
            Err(e) => {
                debug!("No active connection for {}: {}", device, e);
                None
            }
        };

        let added = self.write(|doc| {
            let inserted = doc.insert_device(id.clone(), DeviceSettings::with_connection(active_uuid));
            if inserted {
                self.store.save(doc);
            }
            inserted
        });
        if added {
            info!("Added device config {} for {}", id, device);
        }
        Ok(id)
    }

    /// Forget a device. Removing an unknown device is logged, not an error.
    ///
    /// Returns whether an entry existed.
    pub fn remove_device_config(&self, id: &DeviceId) -> bool {
        let removed = self.write(|doc| {
            let removed = doc.remove_device(id);
            self.store.save(doc);
            removed
        });
        if removed {
            info!("Removed device config {}", id);
        } else {
            error!("Device config for {} does not exist", id);
        }
        removed
    }

    /// Set `last_enabled` on every device, saving once.
    pub fn set_all_last_enabled(&self, enabled: bool) {
        self.write(|doc| {
            doc.set_all_last_enabled(enabled);
            self.store.save(doc);
        });
    }

    /// Remember the connection a device last activated.
    pub async fn set_last_connection_uuid(&self, device: &DeviceRef, uuid: &str) -> Result<()> {
        let id = self.adapter.device_identifier(device).await?;
        self.write(|doc| -> Result<()> {
            if doc.set_last_connection_uuid(&id, uuid)? {
                self.store.save(doc);
            }
            Ok(())
        })
        .map_err(log_missing)
    }

    /// Forget a deleted connection on every device.
    pub fn clear_connection(&self, uuid: &str) {
        let cleared = self.write(|doc| {
            let cleared = doc.clear_connection(uuid);
            self.store.save(doc);
            cleared
        });
        debug!("Cleared connection {} from {} devices", uuid, cleared);
    }

    // ========================================================================
    // Global Switches
    // ========================================================================

    /// Current value of a global switch.
    pub async fn category_enabled(&self, category: SwitchCategory) -> Result<bool> {
        if category.is_radio() {
            return self.adapter.radio_enabled(category).await;
        }
        Ok(self.read(|doc| doc.stored_switch(category).unwrap_or(true)))
    }

    /// Flip a global switch. Returns whether it changed.
    ///
    /// The previous value is kept as the category's "last" value. Devices
    /// of the category are not touched here; subscribers of
    /// [`SwitchEvent::CategoryEnabledChanged`] cascade the change.
    pub async fn set_category_enabled(&self, category: SwitchCategory, enabled: bool) -> Result<bool> {
        let changed = if category.is_radio() {
            let previous = self.adapter.radio_enabled(category).await?;
            if previous != enabled {
                self.adapter.set_radio_enabled(category, enabled).await?;
            }
            self.write(|doc| {
                let changed = doc.record_switch(category, previous, enabled);
                if changed {
                    self.store.save(doc);
                }
                changed
            })
        } else {
            self.write(|doc| {
                let changed = doc.set_switch(category, enabled);
                if changed {
                    self.store.save(doc);
                }
                changed
            })
        };

        if changed {
            info!("Global {} switch turned {}", category, on_off(enabled));
            self.emit(SwitchEvent::CategoryEnabledChanged { category, enabled });
        }
        Ok(changed)
    }

    /// Remember a switch value without recording a transition.
    pub fn set_last_category_enabled(&self, category: SwitchCategory, enabled: bool) {
        self.write(|doc| {
            if doc.set_last_switch(category, enabled) {
                self.store.save(doc);
            }
        });
    }

    /// Remember the same value for every switch, saving once.
    pub fn set_all_last_category_enabled(&self, enabled: bool) {
        self.write(|doc| {
            doc.set_all_last_switches(enabled);
            self.store.save(doc);
        });
    }

    /// Remembered value of a global switch.
    pub fn last_category_enabled(&self, category: SwitchCategory) -> bool {
        self.read(|doc| doc.last_switch(category))
    }

    /// Put a global switch back to its remembered value.
    ///
    /// Returns whether the switch changed.
    pub async fn restore_category_state(&self, category: SwitchCategory) -> Result<bool> {
        let last = self.last_category_enabled(category);
        debug!("Restoring {} switch to {}", category, on_off(last));
        self.set_category_enabled(category, last).await
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Whether the user wants the device on.
    ///
    /// Devices without a derivable identifier are reported as enabled so
    /// they are never hidden.
    pub async fn is_device_enabled(&self, device: &DeviceRef) -> Result<bool> {
        let id = match self.adapter.device_identifier(device).await {
            Ok(id) => id,
            Err(e) => {
                debug!("Treating {} as enabled: {}", device, e);
                return Ok(true);
            }
        };
        self.read(|doc| doc.device(&id).map(|settings| settings.enabled))
            .map_err(log_missing)
    }

    /// Switch a device on or off.
    pub async fn enable_device(&self, device: &DeviceRef, enabled: bool) -> Result<()> {
        if enabled && self.turn_on_category_if_needed(device).await? {
            // The category cascade brings the device up
            return Ok(());
        }

        let id = self.adapter.device_identifier(device).await?;
        let last_connection = self
            .write(|doc| -> Result<String> {
                let settings = doc.device_mut(&id)?;
                settings.transition(enabled);
                Ok(settings.last_connection_uuid.clone())
            })
            .map_err(log_missing)?;

        let outcome = if enabled {
            self.reactivate_last_connection(device, &last_connection).await
        } else {
            self.adapter.disconnect_device(device).await
        };

        info!("Device {} ({}) turned {}", id, device, on_off(enabled));
        self.emit(SwitchEvent::DeviceEnabledChanged {
            device: device.clone(),
            id,
            enabled,
        });
        self.write(|doc| self.store.save(doc));

        if let Err(e) = &outcome {
            warn!("Network stack did not follow {} for {}: {}", on_off(enabled), device, e);
        }
        outcome
    }

    /// Reapply the state a device had before its most recent change.
    ///
    /// Never turns a global switch on: a device that should come back up
    /// while its category is off is left alone, and the category cascade
    /// restores it once the switch is turned on.
    pub async fn restore_device_state(&self, device: &DeviceRef) -> Result<()> {
        let id = self.adapter.device_identifier(device).await?;
        let last_enabled = self.device_settings(&id)?.last_enabled;
        if last_enabled {
            if let Some((_, category)) = self.disabled_category(device).await {
                debug!("Not restoring {} while {} is off", id, category);
                return Ok(());
            }
        }
        debug!("Restoring {} to {}", id, on_off(last_enabled));
        self.enable_device(device, last_enabled).await
    }

    /// The device's category, if its global switch is known to be off.
    ///
    /// Type or switch read failures are logged and reported as `None`.
    async fn disabled_category(&self, device: &DeviceRef) -> Option<(DeviceType, SwitchCategory)> {
        let device_type = match self.adapter.device_type(device).await {
            Ok(device_type) => device_type,
            Err(e) => {
                warn!("Cannot read type of {}: {}", device, e);
                return None;
            }
        };
        let category = device_type.category()?;
        match self.category_enabled(category).await {
            Ok(true) => None,
            Ok(false) => Some((device_type, category)),
            Err(e) => {
                warn!("Cannot read {} switch: {}", category, e);
                None
            }
        }
    }

    /// Turn the device's category on if it is globally off.
    ///
    /// Only the requesting device is marked to come back up: every device
    /// gets `last_enabled = false` first, then the requester gets `true`.
    /// If the switch cannot be turned on the previous values are put back.
    /// Returns whether the category was turned on.
    async fn turn_on_category_if_needed(&self, device: &DeviceRef) -> Result<bool> {
        let Some((device_type, category)) = self.disabled_category(device).await else {
            return Ok(false);
        };

        let id = self.adapter.device_identifier(device).await?;
        let previous = self
            .write(|doc| -> Result<BTreeMap<DeviceId, bool>> {
                doc.device(&id)?;
                let previous = doc
                    .devices
                    .iter()
                    .map(|(id, settings)| (id.clone(), settings.last_enabled))
                    .collect();
                doc.set_all_last_enabled(false);
                doc.device_mut(&id)?.last_enabled = true;
                self.store.save(doc);
                Ok(previous)
            })
            .map_err(log_missing)?;

        info!(
            "{} {} requested while {} is off, turning {} on",
            device_type.display_name(),
            id,
            category,
            category
        );
        if let Err(e) = self.set_category_enabled(category, true).await {
            warn!("Could not turn {} on, keeping remembered device states", category);
            self.write(|doc| {
                for (id, last_enabled) in &previous {
                    if let Ok(settings) = doc.device_mut(id) {
                        settings.last_enabled = *last_enabled;
                    }
                }
                self.store.save(doc);
            });
            return Err(e);
        }
        Ok(true)
    }

    /// Bring back the device's last connection unless it is already up.
    async fn reactivate_last_connection(&self, device: &DeviceRef, uuid: &str) -> Result<()> {
        if uuid.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.adapter.connection_by_uuid(uuid).await {
            debug!("Not reactivating {} on {}: {}", uuid, device, e);
            return Ok(());
        }
        let state = match self.adapter.device_state(device).await {
            Ok(state) => state,
            Err(e) => {
                warn!("Cannot read state of {}: {}", device, e);
                return Ok(());
            }
        };
        if state.is_activated() {
            return Ok(());
        }
        info!("Reactivating {} on {}", uuid, device);
        self.adapter.activate_connection(uuid, device).await
    }
}

fn log_missing(err: Error) -> Error {
    if err.is_resolution_error() {
        error!("{}", err);
    }
    err
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::models::{DeviceState, DeviceType};
    use tokio::sync::broadcast::error::TryRecvError;

    struct Fixture {
        _dir: tempfile::TempDir,
        adapter: Arc<MockAdapter>,
        manager: Arc<DeviceSwitchManager>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().expect("tempdir");
            let adapter = Arc::new(MockAdapter::new());
            let store = SettingsStore::with_path(dir.path().join("network.json"));
            let manager = Arc::new(DeviceSwitchManager::new(adapter.clone(), store, 16));
            Self {
                _dir: dir,
                adapter,
                manager,
            }
        }

        async fn plug(&self, path: &str, id: &str, device_type: DeviceType) -> DeviceRef {
            let device = self.adapter.add_device(path, id, device_type);
            self.manager
                .add_device_config(&device)
                .await
                .expect("device should register");
            device
        }

        fn settings(&self, id: &str) -> DeviceSettings {
            self.manager
                .device_settings(&DeviceId::from(id))
                .expect("device should be registered")
        }

        fn on_disk(&self) -> SettingsDocument {
            let store = SettingsStore::with_path(self.manager.store.path());
            store.load()
        }

        fn snapshot_last(&self, category: SwitchCategory) -> bool {
            self.manager.snapshot().last_switch(category)
        }
    }

    fn drain(rx: &mut broadcast::Receiver<SwitchEvent>) -> Vec<SwitchEvent> {
        let mut events = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return events,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    #[tokio::test]
    async fn test_enable_twice_is_stable() {
        let fx = Fixture::new();
        let eth = fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;

        fx.manager.enable_device(&eth, true).await.expect("enable");
        fx.manager.enable_device(&eth, true).await.expect("enable");

        let settings = fx.settings("eth-mac");
        assert!(settings.enabled);
        assert!(settings.last_enabled);
    }

    #[tokio::test]
    async fn test_disable_then_restore() {
        let fx = Fixture::new();
        let eth = fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;

        fx.manager.enable_device(&eth, false).await.expect("disable");
        assert!(!fx.manager.is_device_enabled(&eth).await.expect("known device"));
        assert_eq!(fx.adapter.calls(), vec!["disconnect /dev/1".to_string()]);

        fx.manager.restore_device_state(&eth).await.expect("restore");
        assert!(fx.manager.is_device_enabled(&eth).await.expect("known device"));
        assert!(!fx.settings("eth-mac").last_enabled);
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let fx = Fixture::new();
        let eth = fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;
        fx.manager.enable_device(&eth, false).await.expect("disable");

        let reloaded = fx.on_disk();
        let settings = reloaded.device(&DeviceId::from("eth-mac")).expect("persisted");
        assert!(!settings.enabled);
        assert!(settings.last_enabled);
    }

    #[tokio::test]
    async fn test_enable_under_disabled_category_only_wakes_requester() {
        let fx = Fixture::new();
        let a = fx.plug("/dev/a", "wifi-a", DeviceType::Wifi).await;
        let b = fx.plug("/dev/b", "wifi-b", DeviceType::Wifi).await;
        fx.plug("/dev/e", "eth-mac", DeviceType::Ethernet).await;
        fx.manager.enable_device(&a, false).await.expect("disable a");
        fx.manager.enable_device(&b, false).await.expect("disable b");
        fx.adapter.set_radio(SwitchCategory::Wireless, false);

        let mut rx = fx.manager.subscribe();
        fx.manager.enable_device(&a, true).await.expect("enable a");

        assert!(fx.adapter.radio(SwitchCategory::Wireless));
        assert!(fx.settings("wifi-a").last_enabled);
        assert!(!fx.settings("wifi-b").last_enabled);
        // Every device is snapshotted, not only the category's
        assert!(!fx.settings("eth-mac").last_enabled);
        assert!(!fx.snapshot_last(SwitchCategory::Wireless));

        // Early return: the requester itself is left for the cascade
        assert!(!fx.settings("wifi-a").enabled);
        assert_eq!(
            drain(&mut rx),
            vec![SwitchEvent::CategoryEnabledChanged {
                category: SwitchCategory::Wireless,
                enabled: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_failed_auto_enable_keeps_remembered_states() {
        let fx = Fixture::new();
        let a = fx.plug("/dev/a", "wifi-a", DeviceType::Wifi).await;
        let b = fx.plug("/dev/b", "wifi-b", DeviceType::Wifi).await;
        fx.plug("/dev/e", "eth-mac", DeviceType::Ethernet).await;
        fx.manager.enable_device(&b, false).await.expect("disable b");
        fx.manager.enable_device(&a, false).await.expect("disable a");
        fx.manager.enable_device(&a, false).await.expect("disable a again");
        fx.adapter.set_radio(SwitchCategory::Wireless, false);
        fx.adapter.fail_radio(true);

        let err = fx
            .manager
            .enable_device(&a, true)
            .await
            .expect_err("radio failure should propagate");
        assert!(matches!(err, Error::AdapterFailed { .. }));
        assert!(!fx.adapter.radio(SwitchCategory::Wireless));

        // a: last=false after two disables, b: last=true, eth untouched
        for doc in [fx.manager.snapshot(), fx.on_disk()] {
            let last = |id: &str| doc.device(&DeviceId::from(id)).expect("registered").last_enabled;
            assert!(!last("wifi-a"));
            assert!(last("wifi-b"));
            assert!(last("eth-mac"));
        }
    }

    #[tokio::test]
    async fn test_enable_under_disabled_wired_switch() {
        let fx = Fixture::new();
        let eth = fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;
        fx.manager
            .set_category_enabled(SwitchCategory::Wired, false)
            .await
            .expect("switch off");

        fx.manager.enable_device(&eth, true).await.expect("enable");

        let doc = fx.on_disk();
        assert!(doc.wired_enabled);
        assert!(!doc.last_wired_enabled);
        assert!(doc.device(&DeviceId::from("eth-mac")).expect("persisted").last_enabled);
    }

    #[tokio::test]
    async fn test_enable_reactivates_last_connection() {
        let fx = Fixture::new();
        let device = fx.adapter.add_device("/dev/1", "wifi-a", DeviceType::Wifi);
        fx.adapter.set_active_connection(&device, "home");
        fx.adapter.add_connection("home");
        fx.manager.add_device_config(&device).await.expect("register");
        assert_eq!(fx.settings("wifi-a").last_connection_uuid, "home");

        fx.manager.enable_device(&device, true).await.expect("enable");
        assert_eq!(fx.adapter.calls(), vec!["activate home /dev/1".to_string()]);

        // Already activated: nothing to do
        fx.manager.enable_device(&device, true).await.expect("enable");
        assert_eq!(fx.adapter.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_enable_skips_deleted_connection() {
        let fx = Fixture::new();
        let device = fx.adapter.add_device("/dev/1", "wifi-a", DeviceType::Wifi);
        fx.adapter.set_active_connection(&device, "gone");
        fx.manager.add_device_config(&device).await.expect("register");

        fx.manager.enable_device(&device, true).await.expect("enable");
        assert!(fx.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_state_skips_activation() {
        let fx = Fixture::new();
        let device = fx.adapter.add_device("/dev/1", "wifi-a", DeviceType::Wifi);
        fx.adapter.set_active_connection(&device, "home");
        fx.adapter.add_connection("home");
        fx.manager.add_device_config(&device).await.expect("register");
        fx.adapter.fail_state(true);

        fx.manager.enable_device(&device, true).await.expect("enable");
        assert!(fx.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_activation_failure_still_notifies_and_saves() {
        let fx = Fixture::new();
        let device = fx.adapter.add_device("/dev/1", "wifi-a", DeviceType::Wifi);
        fx.adapter.set_active_connection(&device, "home");
        fx.adapter.add_connection("home");
        fx.manager.add_device_config(&device).await.expect("register");
        fx.manager.enable_device(&device, false).await.expect("disable");
        fx.adapter.fail_activation(true);

        let mut rx = fx.manager.subscribe();
        let err = fx
            .manager
            .enable_device(&device, true)
            .await
            .expect_err("activation failure should propagate");
        assert!(matches!(err, Error::AdapterFailed { .. }));

        assert!(fx.settings("wifi-a").enabled);
        assert!(fx.on_disk().device(&DeviceId::from("wifi-a")).expect("persisted").enabled);
        assert_eq!(
            drain(&mut rx),
            vec![SwitchEvent::DeviceEnabledChanged {
                device: device.clone(),
                id: DeviceId::from("wifi-a"),
                enabled: true,
            }]
        );
    }

    #[tokio::test]
    async fn test_disconnect_failure_propagates_after_mutation() {
        let fx = Fixture::new();
        let eth = fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;
        fx.adapter.fail_disconnect(true);

        let mut rx = fx.manager.subscribe();
        assert!(fx.manager.enable_device(&eth, false).await.is_err());
        assert!(!fx.settings("eth-mac").enabled);
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_unresolvable_device() {
        let fx = Fixture::new();
        let anonymous = fx.adapter.add_anonymous_device("/dev/x", DeviceType::Other);

        assert!(fx.manager.is_device_enabled(&anonymous).await.expect("permissive"));
        assert!(matches!(
            fx.manager.enable_device(&anonymous, false).await,
            Err(Error::DeviceIdentifierUnavailable(_))
        ));
        assert!(fx.manager.add_device_config(&anonymous).await.is_err());
        assert!(fx.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_device_is_an_error() {
        let fx = Fixture::new();
        let device = fx.adapter.add_device("/dev/1", "eth-mac", DeviceType::Ethernet);

        assert!(matches!(
            fx.manager.is_device_enabled(&device).await,
            Err(Error::DeviceConfigNotFound(_))
        ));
        let mut rx = fx.manager.subscribe();
        assert!(fx.manager.enable_device(&device, false).await.is_err());
        assert!(fx.manager.restore_device_state(&device).await.is_err());
        assert!(drain(&mut rx).is_empty());
        assert!(fx.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_remove_remove() {
        let fx = Fixture::new();
        fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;
        let id = DeviceId::from("eth-mac");
        assert!(fx.manager.device_exists(&id));

        assert!(fx.manager.remove_device_config(&id));
        assert!(!fx.manager.device_exists(&id));
        assert!(!fx.manager.remove_device_config(&id));
        assert!(!fx.manager.device_exists(&id));
        assert!(fx.on_disk().devices.is_empty());
    }

    #[tokio::test]
    async fn test_no_op_registry_changes_still_save() {
        let fx = Fixture::new();
        fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;
        let path = fx.manager.store.path();

        std::fs::remove_file(&path).expect("remove state file");
        fx.manager.clear_connection("nobody-uses-this");
        assert!(path.exists());
        assert!(fx.on_disk().device(&DeviceId::from("eth-mac")).is_ok());

        std::fs::remove_file(&path).expect("remove state file");
        assert!(!fx.manager.remove_device_config(&DeviceId::from("absent")));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_add_keeps_existing_entry() {
        let fx = Fixture::new();
        let eth = fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;
        fx.manager.enable_device(&eth, false).await.expect("disable");

        fx.manager.add_device_config(&eth).await.expect("re-register");
        assert!(!fx.settings("eth-mac").enabled);
    }

    #[tokio::test]
    async fn test_last_connection_tracking() {
        let fx = Fixture::new();
        let a = fx.plug("/dev/a", "wifi-a", DeviceType::Wifi).await;
        let b = fx.plug("/dev/b", "wifi-b", DeviceType::Wifi).await;
        fx.manager.set_last_connection_uuid(&a, "home").await.expect("a");
        fx.manager.set_last_connection_uuid(&b, "home").await.expect("b");

        fx.manager.clear_connection("home");
        assert!(fx.settings("wifi-a").last_connection_uuid.is_empty());
        assert!(fx.settings("wifi-b").last_connection_uuid.is_empty());

        // Nothing references it any more, still fine
        fx.manager.clear_connection("home");

        let unknown = fx.adapter.add_device("/dev/c", "wifi-c", DeviceType::Wifi);
        assert!(matches!(
            fx.manager.set_last_connection_uuid(&unknown, "home").await,
            Err(Error::DeviceConfigNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_radio_switch_goes_through_adapter() {
        let fx = Fixture::new();
        let mut rx = fx.manager.subscribe();

        assert!(fx
            .manager
            .set_category_enabled(SwitchCategory::Wwan, false)
            .await
            .expect("switch"));
        assert!(!fx.adapter.radio(SwitchCategory::Wwan));
        assert!(fx.snapshot_last(SwitchCategory::Wwan));
        assert!(!fx
            .manager
            .set_category_enabled(SwitchCategory::Wwan, false)
            .await
            .expect("switch"));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn test_last_switch_setters_persist() {
        let fx = Fixture::new();
        fx.manager.set_last_category_enabled(SwitchCategory::Vpn, false);
        assert!(!fx.on_disk().last_vpn_enabled);

        fx.manager.set_all_last_category_enabled(false);
        let doc = fx.on_disk();
        assert!(SwitchCategory::ALL.iter().all(|c| !doc.last_switch(*c)));

        fx.manager.set_all_last_category_enabled(true);
        assert!(fx.on_disk().last_wired_enabled);
        assert!(fx.manager.last_category_enabled(SwitchCategory::Vpn));
    }

    #[tokio::test]
    async fn test_restore_category_state() {
        let fx = Fixture::new();
        fx.manager
            .set_category_enabled(SwitchCategory::Wireless, false)
            .await
            .expect("switch off");

        // Last value is on, so restoring turns the radio back on
        assert!(fx
            .manager
            .restore_category_state(SwitchCategory::Wireless)
            .await
            .expect("restore"));
        assert!(fx.adapter.radio(SwitchCategory::Wireless));
        assert!(!fx.snapshot_last(SwitchCategory::Wireless));

        fx.manager.set_last_category_enabled(SwitchCategory::Vpn, false);
        assert!(fx
            .manager
            .restore_category_state(SwitchCategory::Vpn)
            .await
            .expect("restore"));
        let doc = fx.on_disk();
        assert!(!doc.vpn_enabled);
        assert!(doc.last_vpn_enabled);
    }

    #[tokio::test]
    async fn test_set_all_last_enabled() {
        let fx = Fixture::new();
        fx.plug("/dev/a", "wifi-a", DeviceType::Wifi).await;
        fx.plug("/dev/b", "eth-b", DeviceType::Ethernet).await;

        fx.manager.set_all_last_enabled(false);
        assert!(fx.on_disk().devices.values().all(|d| !d.last_enabled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_on_different_devices() {
        let fx = Fixture::new();
        let mut devices = Vec::new();
        for i in 0..8 {
            devices.push(
                fx.plug(&format!("/dev/{i}"), &format!("eth-{i}"), DeviceType::Ethernet)
                    .await,
            );
        }

        let mut handles = Vec::new();
        for device in devices {
            let manager = fx.manager.clone();
            handles.push(tokio::spawn(async move {
                manager.enable_device(&device, false).await
            }));
        }
        for handle in handles {
            handle.await.expect("task").expect("disable");
        }

        let doc = fx.on_disk();
        assert_eq!(doc.devices.len(), 8);
        assert!(doc.devices.values().all(|d| !d.enabled && d.last_enabled));
    }

    #[tokio::test]
    async fn test_activated_device_is_not_reconnected() {
        let fx = Fixture::new();
        let device = fx.adapter.add_device("/dev/1", "eth-mac", DeviceType::Ethernet);
        fx.adapter.set_active_connection(&device, "wired-1");
        fx.adapter.add_connection("wired-1");
        fx.adapter.set_state(&device, DeviceState::Activated);
        fx.manager.add_device_config(&device).await.expect("register");

        fx.manager.restore_device_state(&device).await.expect("restore");
        assert!(fx.adapter.calls().is_empty());
    }

    #[tokio::test]
    async fn test_restore_leaves_disabled_category_off() {
        let fx = Fixture::new();
        let wifi = fx.plug("/dev/1", "wifi-a", DeviceType::Wifi).await;
        fx.adapter.set_radio(SwitchCategory::Wireless, false);

        let mut rx = fx.manager.subscribe();
        fx.manager.restore_device_state(&wifi).await.expect("restore");

        assert!(!fx.adapter.radio(SwitchCategory::Wireless));
        assert!(fx.adapter.calls().is_empty());
        assert!(fx.settings("wifi-a").last_enabled);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_restore_off_under_disabled_category() {
        let fx = Fixture::new();
        let eth = fx.plug("/dev/1", "eth-mac", DeviceType::Ethernet).await;
        fx.manager.enable_device(&eth, false).await.expect("disable");
        fx.manager.enable_device(&eth, false).await.expect("disable again");
        fx.manager
            .set_category_enabled(SwitchCategory::Wired, false)
            .await
            .expect("switch off");

        fx.manager.restore_device_state(&eth).await.expect("restore");
        assert!(!fx.manager.category_enabled(SwitchCategory::Wired).await.expect("read"));
        assert!(!fx.settings("eth-mac").enabled);
    }
}
