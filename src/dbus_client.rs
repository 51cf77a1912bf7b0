// netswitch - D-Bus Client
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Async D-Bus client used by the CLI to call a running daemon.

use std::sync::Arc;
use tracing::{debug, error, info};
use zbus::zvariant::ObjectPath;
use zbus::Connection;

use crate::models::{
    BusKind, Error, Result, SwitchCategory, DBUS_INTERFACE, DBUS_OBJECT_PATH, DBUS_SERVICE_NAME,
};

const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

/// D-Bus client for the switch daemon.
#[derive(Clone)]
pub struct DaemonClient {
    connection: Option<Arc<Connection>>,
}

impl DaemonClient {
    /// Create a new daemon client.
    pub fn new() -> Self {
        Self { connection: None }
    }

    /// Connect to the bus the daemon is published on.
    pub async fn connect(&mut self, bus: BusKind) -> Result<()> {
        let connection = match bus {
            BusKind::Session => Connection::session().await,
            BusKind::System => Connection::system().await,
        };
        match connection {
            Ok(conn) => {
                debug!("Connected to {} D-Bus", bus.as_str());
                self.connection = Some(Arc::new(conn));
                Ok(())
            }
            Err(e) => {
                error!("Failed to connect to {} D-Bus: {}", bus.as_str(), e);
                Err(Error::DbusConnectionFailed(e.to_string()))
            }
        }
    }

    /// Check if connected to the bus.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    async fn call<B>(&self, method: &str, body: &B) -> Result<zbus::Message>
    where
        B: serde::Serialize + zbus::zvariant::DynamicType,
    {
        let conn = self.connection.as_ref().ok_or(Error::DaemonNotRunning)?;
        conn.call_method(
            Some(DBUS_SERVICE_NAME),
            DBUS_OBJECT_PATH,
            Some(DBUS_INTERFACE),
            method,
            body,
        )
        .await
        .map_err(|e| call_error(method, e))
    }

    /// Whether the user wants the device on.
    pub async fn is_device_enabled(&self, device: &str) -> Result<bool> {
        let device = ObjectPath::try_from(device)?;
        let reply = self.call("IsDeviceEnabled", &(device,)).await?;
        Ok(reply.body().deserialize()?)
    }

    /// Switch a device on or off.
    pub async fn enable_device(&self, device: &str, enabled: bool) -> Result<()> {
        info!("Requesting {} {}", device, if enabled { "on" } else { "off" });
        let device = ObjectPath::try_from(device)?;
        self.call("EnableDevice", &(device, enabled)).await?;
        Ok(())
    }

    /// Reapply the state a device had before its last change.
    pub async fn restore_device_state(&self, device: &str) -> Result<()> {
        let device = ObjectPath::try_from(device)?;
        self.call("RestoreDeviceState", &(device,)).await?;
        Ok(())
    }

    /// Current value of a global switch.
    pub async fn category_enabled(&self, category: SwitchCategory) -> Result<bool> {
        let reply = self.call("CategoryEnabled", &(category.as_str(),)).await?;
        Ok(reply.body().deserialize()?)
    }

    /// Flip a global switch. Returns whether it changed.
    pub async fn set_category_enabled(&self, category: SwitchCategory, enabled: bool) -> Result<bool> {
        let reply = self
            .call("SetCategoryEnabled", &(category.as_str(), enabled))
            .await?;
        Ok(reply.body().deserialize()?)
    }

    /// Put a global switch back to its remembered value. Returns whether it changed.
    pub async fn restore_category_state(&self, category: SwitchCategory) -> Result<bool> {
        let reply = self.call("RestoreCategoryState", &(category.as_str(),)).await?;
        Ok(reply.body().deserialize()?)
    }
}

impl Default for DaemonClient {
    fn default() -> Self {
        Self::new()
    }
}

fn call_error(method: &str, err: zbus::Error) -> Error {
    match &err {
        zbus::Error::MethodError(name, _, _) if name.as_str() == SERVICE_UNKNOWN => {
            Error::DaemonNotRunning
        }
        zbus::Error::MethodError(_, Some(detail), _) => {
            Error::Dbus(format!("{} failed: {}", method, detail))
        }
        _ => Error::Dbus(format!("{} failed: {}", method, err)),
    }
}
