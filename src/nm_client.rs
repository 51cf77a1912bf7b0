// netswitch - NetworkManager Client
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! NetworkManager implementation of [`NetworkAdapter`].
//!
//! Talks to `org.freedesktop.NetworkManager` on the system bus and turns
//! its signals into [`AdapterEvent`]s.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use zbus::zvariant::{ObjectPath, OwnedObjectPath};
use zbus::Connection;

use crate::adapter::{AdapterEvent, NetworkAdapter};
use crate::models::{DeviceId, DeviceRef, DeviceState, DeviceType, Error, Result, SwitchCategory};

const NM_SERVICE: &str = "org.freedesktop.NetworkManager";

// ============================================================================
// Proxies
// ============================================================================

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager"
)]
trait NetworkManager {
    fn get_devices(&self) -> zbus::Result<Vec<OwnedObjectPath>>;

    fn activate_connection(
        &self,
        connection: &ObjectPath<'_>,
        device: &ObjectPath<'_>,
        specific_object: &ObjectPath<'_>,
    ) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn wireless_enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn set_wireless_enabled(&self, enabled: bool) -> zbus::Result<()>;

    #[zbus(property)]
    fn wwan_enabled(&self) -> zbus::Result<bool>;

    #[zbus(property)]
    fn set_wwan_enabled(&self, enabled: bool) -> zbus::Result<()>;

    #[zbus(signal)]
    fn device_added(&self, device_path: OwnedObjectPath) -> zbus::Result<()>;

    #[zbus(signal)]
    fn device_removed(&self, device_path: OwnedObjectPath) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Settings",
    default_service = "org.freedesktop.NetworkManager",
    default_path = "/org/freedesktop/NetworkManager/Settings"
)]
trait Settings {
    fn get_connection_by_uuid(&self, uuid: &str) -> zbus::Result<OwnedObjectPath>;

    #[zbus(signal)]
    fn connection_removed(&self, connection: OwnedObjectPath) -> zbus::Result<()>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Device",
    default_service = "org.freedesktop.NetworkManager"
)]
trait Device {
    fn disconnect(&self) -> zbus::Result<()>;

    #[zbus(property)]
    fn udi(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn device_type(&self) -> zbus::Result<u32>;

    /// Property only: the `StateChanged` signal would clash with the
    /// generated property stream of the same name.
    #[zbus(property)]
    fn state(&self) -> zbus::Result<u32>;

    #[zbus(property)]
    fn active_connection(&self) -> zbus::Result<OwnedObjectPath>;

    #[zbus(property)]
    fn hw_address(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wired",
    default_service = "org.freedesktop.NetworkManager"
)]
trait DeviceWired {
    #[zbus(property)]
    fn perm_hw_address(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Device.Wireless",
    default_service = "org.freedesktop.NetworkManager"
)]
trait DeviceWireless {
    #[zbus(property)]
    fn perm_hw_address(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Device.Modem",
    default_service = "org.freedesktop.NetworkManager"
)]
trait DeviceModem {
    #[zbus(property)]
    fn device_id(&self) -> zbus::Result<String>;
}

#[zbus::proxy(
    interface = "org.freedesktop.NetworkManager.Connection.Active",
    default_service = "org.freedesktop.NetworkManager"
)]
trait ActiveConnection {
    #[zbus(property)]
    fn uuid(&self) -> zbus::Result<String>;

    #[zbus(property)]
    fn connection(&self) -> zbus::Result<OwnedObjectPath>;
}

// ============================================================================
// Adapter
// ============================================================================

/// [`NetworkAdapter`] backed by NetworkManager.
pub struct NmAdapter {
    connection: Connection,
    manager: NetworkManagerProxy<'static>,
    settings: SettingsProxy<'static>,
    /// Settings object path to UUID of every connection seen so far.
    /// `ConnectionRemoved` only carries the path.
    connection_uuids: Mutex<HashMap<String, String>>,
}

impl NmAdapter {
    /// Connect to NetworkManager on the system bus.
    pub async fn connect() -> Result<Self> {
        let connection = Connection::system().await.map_err(|e| {
            error!("Failed to connect to system D-Bus: {}", e);
            Error::DbusConnectionFailed(e.to_string())
        })?;
        Self::new(connection).await
    }

    /// Build the adapter over an existing bus connection.
    pub async fn new(connection: Connection) -> Result<Self> {
        let manager = NetworkManagerProxy::new(&connection)
            .await
            .map_err(|e| Error::NetworkManagerDbus(e.to_string()))?;
        let settings = SettingsProxy::new(&connection)
            .await
            .map_err(|e| Error::NetworkManagerDbus(e.to_string()))?;
        debug!("Connected to {}", NM_SERVICE);

        Ok(Self {
            connection,
            manager,
            settings,
            connection_uuids: Mutex::new(HashMap::new()),
        })
    }

    fn uuids(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.connection_uuids.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Connection cache lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn remember_connection(&self, path: &str, uuid: &str) {
        self.uuids().insert(path.to_string(), uuid.to_string());
    }

    fn forget_connection(&self, path: &str) -> Option<String> {
        self.uuids().remove(path)
    }

    async fn device_proxy(&self, device: &DeviceRef) -> Result<DeviceProxy<'static>> {
        Ok(DeviceProxy::builder(&self.connection)
            .path(device.as_str().to_string())?
            .build()
            .await?)
    }

    async fn permanent_address(&self, device: &DeviceRef, device_type: DeviceType) -> Option<String> {
        let path = device.as_str().to_string();
        match device_type {
            DeviceType::Ethernet => {
                let proxy = DeviceWiredProxy::builder(&self.connection)
                    .path(path)
                    .ok()?
                    .build()
                    .await
                    .ok()?;
                proxy.perm_hw_address().await.ok()
            }
            DeviceType::Wifi => {
                let proxy = DeviceWirelessProxy::builder(&self.connection)
                    .path(path)
                    .ok()?
                    .build()
                    .await
                    .ok()?;
                proxy.perm_hw_address().await.ok()
            }
            _ => None,
        }
    }

    /// Forward NetworkManager signals as [`AdapterEvent`]s until the
    /// receiver goes away.
    pub async fn watch(self: Arc<Self>, events: mpsc::Sender<AdapterEvent>) -> Result<JoinHandle<()>> {
        let mut added = self.manager.receive_device_added().await?;
        let mut removed = self.manager.receive_device_removed().await?;
        let mut connections_removed = self.settings.receive_connection_removed().await?;

        let mut followers = HashMap::new();
        for device in self.devices().await? {
            let follower = self.follow(device.clone(), events.clone());
            followers.insert(device, follower);
        }

        Ok(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(signal) = added.next() => {
                        let Ok(args) = signal.args() else { continue };
                        let device = DeviceRef::new(args.device_path().to_string());
                        let follower = self.follow(device.clone(), events.clone());
                        if let Some(stale) = followers.insert(device.clone(), follower) {
                            stale.abort();
                        }
                        AdapterEvent::DeviceAdded(device)
                    }
                    Some(signal) = removed.next() => {
                        let Ok(args) = signal.args() else { continue };
                        let device = DeviceRef::new(args.device_path().to_string());
                        if let Some(follower) = followers.remove(&device) {
                            follower.abort();
                        }
                        AdapterEvent::DeviceRemoved(device)
                    }
                    Some(signal) = connections_removed.next() => {
                        let Ok(args) = signal.args() else { continue };
                        let Some(uuid) = self.forget_connection(args.connection().as_str()) else {
                            continue;
                        };
                        AdapterEvent::ConnectionRemoved { uuid }
                    }
                    else => {
                        warn!("NetworkManager signal streams ended");
                        break;
                    }
                };

                debug!("NetworkManager event: {:?}", event);
                if events.send(event).await.is_err() {
                    break;
                }
            }

            for follower in followers.into_values() {
                follower.abort();
            }
            info!("Stopped watching NetworkManager");
        }))
    }

    /// Report each activation of a device.
    fn follow(self: &Arc<Self>, device: DeviceRef, events: mpsc::Sender<AdapterEvent>) -> JoinHandle<()> {
        let adapter = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = adapter.follow_device(&device, &events).await {
                debug!("Stopped following {}: {}", device, e);
            }
        })
    }

    async fn follow_device(&self, device: &DeviceRef, events: &mpsc::Sender<AdapterEvent>) -> Result<()> {
        let proxy = self.device_proxy(device).await?;
        let mut changes = proxy.receive_state_changed().await;

        while let Some(change) = changes.next().await {
            let Ok(state) = change.get().await else {
                continue;
            };
            if !DeviceState::from_nm(state).is_activated() {
                continue;
            }
            match self.active_connection_uuid(device).await {
                Ok(Some(connection_uuid)) => {
                    let event = AdapterEvent::DeviceActivated {
                        device: device.clone(),
                        connection_uuid,
                    };
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Cannot read active connection of {}: {}", device, e),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkAdapter for NmAdapter {
    async fn devices(&self) -> Result<Vec<DeviceRef>> {
        let paths = self
            .manager
            .get_devices()
            .await
            .map_err(|e| Error::NetworkManagerDbus(e.to_string()))?;
        Ok(paths
            .into_iter()
            .map(|path| DeviceRef::new(path.to_string()))
            .collect())
    }

    async fn device_identifier(&self, device: &DeviceRef) -> Result<DeviceId> {
        let proxy = self.device_proxy(device).await?;
        let device_type = DeviceType::from_nm(proxy.device_type().await?);

        let candidates = match device_type {
            DeviceType::Ethernet | DeviceType::Wifi => vec![
                self.permanent_address(device, device_type).await,
                proxy.hw_address().await.ok(),
            ],
            DeviceType::Modem => {
                let modem = DeviceModemProxy::builder(&self.connection)
                    .path(device.as_str().to_string())?
                    .build()
                    .await?;
                vec![modem.device_id().await.ok()]
            }
            DeviceType::Other => vec![proxy.udi().await.ok()],
        };

        first_present(candidates)
            .map(DeviceId::new)
            .ok_or_else(|| Error::DeviceIdentifierUnavailable(device.to_string()))
    }

    async fn device_type(&self, device: &DeviceRef) -> Result<DeviceType> {
        let proxy = self.device_proxy(device).await?;
        Ok(DeviceType::from_nm(proxy.device_type().await?))
    }

    async fn device_state(&self, device: &DeviceRef) -> Result<DeviceState> {
        let proxy = self.device_proxy(device).await?;
        Ok(DeviceState::from_nm(proxy.state().await?))
    }

    async fn active_connection_uuid(&self, device: &DeviceRef) -> Result<Option<String>> {
        let proxy = self.device_proxy(device).await?;
        let active_path = proxy.active_connection().await?;
        if active_path.as_str() == "/" {
            return Ok(None);
        }

        let active = ActiveConnectionProxy::builder(&self.connection)
            .path(active_path.as_str().to_string())?
            .build()
            .await?;
        let uuid = active.uuid().await?;
        match active.connection().await {
            Ok(settings_path) => self.remember_connection(settings_path.as_str(), &uuid),
            Err(e) => debug!("No settings path for active connection {}: {}", uuid, e),
        }
        Ok(Some(uuid))
    }

    async fn connection_by_uuid(&self, uuid: &str) -> Result<String> {
        let path = self
            .settings
            .get_connection_by_uuid(uuid)
            .await
            .map_err(|e| {
                debug!("GetConnectionByUuid({}) failed: {}", uuid, e);
                Error::ConnectionNotFound(uuid.to_string())
            })?;
        self.remember_connection(path.as_str(), uuid);
        Ok(path.to_string())
    }

    async fn activate_connection(&self, uuid: &str, device: &DeviceRef) -> Result<()> {
        let connection_path = self.connection_by_uuid(uuid).await?;
        let connection = ObjectPath::try_from(connection_path.as_str())?;
        let device_path = ObjectPath::try_from(device.as_str())?;
        let no_specific_object = ObjectPath::from_static_str_unchecked("/");

        self.manager
            .activate_connection(&connection, &device_path, &no_specific_object)
            .await
            .map_err(|e| Error::adapter_failed("ActivateConnection", e.to_string()))?;
        Ok(())
    }

    async fn disconnect_device(&self, device: &DeviceRef) -> Result<()> {
        let proxy = self.device_proxy(device).await?;
        proxy
            .disconnect()
            .await
            .map_err(|e| Error::adapter_failed("Disconnect", e.to_string()))
    }

    async fn radio_enabled(&self, radio: SwitchCategory) -> Result<bool> {
        let enabled = match radio {
            SwitchCategory::Wireless => self.manager.wireless_enabled().await?,
            SwitchCategory::Wwan => self.manager.wwan_enabled().await?,
            other => return Err(Error::Internal(format!("{} is not a radio switch", other))),
        };
        Ok(enabled)
    }

    async fn set_radio_enabled(&self, radio: SwitchCategory, enabled: bool) -> Result<()> {
        match radio {
            SwitchCategory::Wireless => self
                .manager
                .set_wireless_enabled(enabled)
                .await
                .map_err(|e| Error::adapter_failed("SetWirelessEnabled", e.to_string())),
            SwitchCategory::Wwan => self
                .manager
                .set_wwan_enabled(enabled)
                .await
                .map_err(|e| Error::adapter_failed("SetWwanEnabled", e.to_string())),
            other => Err(Error::Internal(format!("{} is not a radio switch", other))),
        }
    }
}

/// First non-empty candidate.
fn first_present(candidates: Vec<Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}
