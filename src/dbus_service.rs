// netswitch - D-Bus Service
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! D-Bus service exposing the switch daemon.
//!
//! Publishes `com.netswitch.Daemon` at `/com/netswitch/Daemon`. Device
//! arguments are NetworkManager device object paths. Every switched
//! device is announced with the `DeviceEnabled` signal.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use zbus::zvariant::ObjectPath;
use zbus::{fdo, interface, Connection, SignalContext};

use crate::models::{
    BusKind, DeviceRef, Error, Result, SwitchCategory, SwitchEvent, DBUS_OBJECT_PATH,
    DBUS_SERVICE_NAME,
};
use crate::services::DeviceSwitchManager;

/// Daemon interface.
pub struct SwitchInterface {
    manager: Arc<DeviceSwitchManager>,
}

impl SwitchInterface {
    pub fn new(manager: Arc<DeviceSwitchManager>) -> Self {
        Self { manager }
    }
}

#[interface(name = "com.netswitch.Daemon")]
impl SwitchInterface {
    /// Whether the user wants the device on.
    async fn is_device_enabled(&self, device: ObjectPath<'_>) -> fdo::Result<bool> {
        Ok(self.manager.is_device_enabled(&device_ref(&device)).await?)
    }

    /// Switch a device on or off.
    async fn enable_device(&self, device: ObjectPath<'_>, enabled: bool) -> fdo::Result<()> {
        Ok(self.manager.enable_device(&device_ref(&device), enabled).await?)
    }

    /// Reapply the state the device had before its last change.
    async fn restore_device_state(&self, device: ObjectPath<'_>) -> fdo::Result<()> {
        Ok(self.manager.restore_device_state(&device_ref(&device)).await?)
    }

    /// Current value of a global switch (`wired`, `wireless`, `wwan`, `vpn`).
    async fn category_enabled(&self, category: &str) -> fdo::Result<bool> {
        let category = parse_category(category)?;
        Ok(self.manager.category_enabled(category).await?)
    }

    /// Flip a global switch. Returns whether it changed.
    async fn set_category_enabled(&self, category: &str, enabled: bool) -> fdo::Result<bool> {
        let category = parse_category(category)?;
        Ok(self.manager.set_category_enabled(category, enabled).await?)
    }

    /// Remembered value of a global switch.
    async fn last_category_enabled(&self, category: &str) -> fdo::Result<bool> {
        let category = parse_category(category)?;
        Ok(self.manager.last_category_enabled(category))
    }

    /// Put a global switch back to its remembered value. Returns whether it changed.
    async fn restore_category_state(&self, category: &str) -> fdo::Result<bool> {
        let category = parse_category(category)?;
        Ok(self.manager.restore_category_state(category).await?)
    }

    /// Set the remembered value of a global switch without flipping it.
    async fn set_last_category_enabled(&self, category: &str, enabled: bool) -> fdo::Result<()> {
        let category = parse_category(category)?;
        self.manager.set_last_category_enabled(category, enabled);
        Ok(())
    }

    /// Set the remembered value of every global switch.
    async fn set_all_last_category_enabled(&self, enabled: bool) {
        self.manager.set_all_last_category_enabled(enabled);
    }

    /// Set the remembered state of every known device.
    async fn set_all_last_enabled(&self, enabled: bool) {
        self.manager.set_all_last_enabled(enabled);
    }

    #[zbus(signal)]
    async fn device_enabled(
        ctxt: &SignalContext<'_>,
        device: ObjectPath<'_>,
        enabled: bool,
    ) -> zbus::Result<()>;
}

fn device_ref(path: &ObjectPath<'_>) -> DeviceRef {
    DeviceRef::new(path.as_str())
}

fn parse_category(category: &str) -> fdo::Result<SwitchCategory> {
    category
        .parse()
        .map_err(|e: Error| fdo::Error::InvalidArgs(e.to_string()))
}

/// Handle for the published service.
pub struct DaemonService {
    connection: Connection,
    forwarder: JoinHandle<()>,
}

impl DaemonService {
    /// Publish the interface and start forwarding notifications as signals.
    pub async fn start(manager: Arc<DeviceSwitchManager>, bus: BusKind) -> Result<Self> {
        let connection = match bus {
            BusKind::Session => Connection::session().await,
            BusKind::System => Connection::system().await,
        }
        .map_err(|e| Error::DbusConnectionFailed(e.to_string()))?;

        // Subscribe before serving so no change is missed
        let events = manager.subscribe();

        connection
            .object_server()
            .at(DBUS_OBJECT_PATH, SwitchInterface::new(manager))
            .await?;
        connection.request_name(DBUS_SERVICE_NAME).await?;
        info!(
            "Serving {} at {} on the {} bus",
            DBUS_SERVICE_NAME,
            DBUS_OBJECT_PATH,
            bus.as_str()
        );

        let signal_connection = connection.clone();
        let forwarder = tokio::spawn(async move {
            let mut events = events;
            loop {
                match events.recv().await {
                    Ok(SwitchEvent::DeviceEnabledChanged { device, enabled, .. }) => {
                        if let Err(e) = emit_device_enabled(&signal_connection, &device, enabled).await {
                            warn!("Failed to emit DeviceEnabled for {}: {}", device, e);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Signal forwarder fell behind, {} notifications dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Signal forwarder stopped");
        });

        Ok(Self {
            connection,
            forwarder,
        })
    }

    /// Release the bus name and stop emitting signals.
    pub async fn stop(self) {
        self.forwarder.abort();
        if let Err(e) = self.connection.release_name(DBUS_SERVICE_NAME).await {
            debug!("Failed to release {}: {}", DBUS_SERVICE_NAME, e);
        }
    }
}

async fn emit_device_enabled(connection: &Connection, device: &DeviceRef, enabled: bool) -> Result<()> {
    let ctxt = SignalContext::new(connection, DBUS_OBJECT_PATH)?;
    let path = ObjectPath::try_from(device.as_str())?;
    SwitchInterface::device_enabled(&ctxt, path, enabled).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_category_accepts_aliases() {
        assert_eq!(parse_category("wifi").expect("alias"), SwitchCategory::Wireless);
        assert_eq!(parse_category("Wired").expect("name"), SwitchCategory::Wired);
    }

    #[test]
    fn test_parse_category_rejects_unknown() {
        let err = parse_category("bluetooth").expect_err("unknown category");
        assert!(matches!(err, fdo::Error::InvalidArgs(_)));
    }

    #[test]
    fn test_device_ref_keeps_path() {
        let path = ObjectPath::try_from("/org/freedesktop/NetworkManager/Devices/3").expect("path");
        assert_eq!(
            device_ref(&path).as_str(),
            "/org/freedesktop/NetworkManager/Devices/3"
        );
    }
}
