// netswitch - Network Stack Adapter
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Seam between the switch logic and the live network stack.
//!
//! The engine only queries and commands the stack through this trait. The
//! NetworkManager implementation lives in `nm_client`.

use async_trait::async_trait;

use crate::models::{DeviceId, DeviceRef, DeviceState, DeviceType, Result, SwitchCategory};

/// Events reported by the network stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterEvent {
    DeviceAdded(DeviceRef),
    DeviceRemoved(DeviceRef),
    /// A device finished activating a connection.
    DeviceActivated {
        device: DeviceRef,
        connection_uuid: String,
    },
    /// A saved connection was deleted.
    ConnectionRemoved { uuid: String },
}

/// Operations the switch logic needs from the network stack.
#[async_trait]
pub trait NetworkAdapter: Send + Sync {
    /// Every device currently known to the stack.
    async fn devices(&self) -> Result<Vec<DeviceRef>>;

    /// Stable identifier, independent of the transient handle.
    async fn device_identifier(&self, device: &DeviceRef) -> Result<DeviceId>;

    async fn device_type(&self, device: &DeviceRef) -> Result<DeviceType>;

    async fn device_state(&self, device: &DeviceRef) -> Result<DeviceState>;

    /// UUID of the connection active on the device, if any.
    async fn active_connection_uuid(&self, device: &DeviceRef) -> Result<Option<String>>;

    /// Look up a saved connection. Fails with `ConnectionNotFound` when absent.
    async fn connection_by_uuid(&self, uuid: &str) -> Result<String>;

    async fn activate_connection(&self, uuid: &str, device: &DeviceRef) -> Result<()>;

    async fn disconnect_device(&self, device: &DeviceRef) -> Result<()>;

    /// State of a radio switch (`Wireless` or `Wwan`).
    async fn radio_enabled(&self, radio: SwitchCategory) -> Result<bool>;

    async fn set_radio_enabled(&self, radio: SwitchCategory, enabled: bool) -> Result<()>;
}
