// netswitch - Device Monitor
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Keeps the device registry in step with the network stack.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reconcile::DeviceSwitchManager;
use crate::adapter::AdapterEvent;
use crate::models::{DeviceId, DeviceRef, Error, Result};

/// Handles [`AdapterEvent`]s reported by the network stack.
pub struct DeviceMonitor {
    manager: Arc<DeviceSwitchManager>,
    restore_on_hotplug: bool,
    /// Identifiers of live devices. Removed devices can no longer be
    /// queried, so the identifier is remembered when they appear.
    known: Mutex<HashMap<DeviceRef, DeviceId>>,
}

impl DeviceMonitor {
    pub fn new(manager: Arc<DeviceSwitchManager>, restore_on_hotplug: bool) -> Self {
        Self {
            manager,
            restore_on_hotplug,
            known: Mutex::new(HashMap::new()),
        }
    }

    fn known(&self) -> std::sync::MutexGuard<'_, HashMap<DeviceRef, DeviceId>> {
        match self.known.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("Device map lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Register every device present now, optionally restoring each one.
    ///
    /// Entries for devices that are no longer present are forgotten, unless
    /// some present device could not be resolved.
    pub async fn register_existing(&self, restore: bool) {
        let devices = match self.manager.adapter().devices().await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Cannot list devices: {}", e);
                return;
            }
        };

        let mut present = HashSet::new();
        let mut complete = true;
        for device in devices {
            let id = match self.try_register(&device).await {
                Ok(Some(id)) => id,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Failed to register {}: {}", device, e);
                    complete = false;
                    continue;
                }
            };
            present.insert(id);
            if restore {
                self.restore(&device).await;
            }
        }
        info!("Registered {} devices", present.len());

        if !complete {
            debug!("Keeping stale device configs, some devices were unreadable");
            return;
        }
        let stale: Vec<DeviceId> = self
            .manager
            .snapshot()
            .devices
            .into_keys()
            .filter(|id| !present.contains(id))
            .collect();
        for id in stale {
            info!("Device {} is gone, forgetting it", id);
            self.manager.remove_device_config(&id);
        }
    }

    /// Consume events until the sender side is dropped.
    pub fn start(self: Arc<Self>, mut events: mpsc::Receiver<AdapterEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.handle(event).await;
            }
            debug!("Device monitor stopped");
        })
    }

    /// Apply one event.
    pub async fn handle(&self, event: AdapterEvent) {
        match event {
            AdapterEvent::DeviceAdded(device) => {
                if self.register(&device).await.is_some() && self.restore_on_hotplug {
                    self.restore(&device).await;
                }
            }
            AdapterEvent::DeviceRemoved(device) => {
                let removed = self.known().remove(&device);
                match removed {
                    Some(id) => {
                        self.manager.remove_device_config(&id);
                    }
                    None => debug!("Untracked device {} removed", device),
                }
            }
            AdapterEvent::DeviceActivated {
                device,
                connection_uuid,
            } => {
                if let Err(e) = self
                    .manager
                    .set_last_connection_uuid(&device, &connection_uuid)
                    .await
                {
                    debug!("Not tracking connection on {}: {}", device, e);
                }
            }
            AdapterEvent::ConnectionRemoved { uuid } => {
                self.manager.clear_connection(&uuid);
            }
        }
    }

    async fn register(&self, device: &DeviceRef) -> Option<DeviceId> {
        match self.try_register(device).await {
            Ok(id) => id,
            Err(e) => {
                warn!("Failed to register {}: {}", device, e);
                None
            }
        }
    }

    /// `Ok(None)` for devices without a stable identifier.
    async fn try_register(&self, device: &DeviceRef) -> Result<Option<DeviceId>> {
        match self.manager.add_device_config(device).await {
            Ok(id) => {
                self.known().insert(device.clone(), id.clone());
                Ok(Some(id))
            }
            Err(Error::DeviceIdentifierUnavailable(_)) => {
                debug!("Ignoring {}: no stable identifier", device);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn restore(&self, device: &DeviceRef) {
        if let Err(e) = self.manager.restore_device_state(device).await {
            warn!("Failed to restore {}: {}", device, e);
        }
    }
}
