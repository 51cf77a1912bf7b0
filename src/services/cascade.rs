// netswitch - Category Cascade Service
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Propagates global switch changes to the devices of the category.
//!
//! Turning a category on restores each of its devices to the state it
//! had before. Turning it off switches each device off, so the intent it
//! had lands in `last_enabled` for the next restore.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::reconcile::DeviceSwitchManager;
use crate::models::{DeviceRef, Result, SwitchCategory, SwitchEvent};

/// Reacts to [`SwitchEvent::CategoryEnabledChanged`].
pub struct CascadeService {
    manager: Arc<DeviceSwitchManager>,
    running: Arc<AtomicBool>,
}

impl CascadeService {
    /// Create a new cascade service.
    pub fn new(manager: Arc<DeviceSwitchManager>) -> Self {
        Self {
            manager,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if the service is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the service after the event being handled.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Subscribe to the engine and handle events on a background task.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.manager.subscribe();
        self.running.store(true, Ordering::SeqCst);
        let service = Arc::clone(self);

        tokio::spawn(async move {
            while service.is_running() {
                match events.recv().await {
                    Ok(SwitchEvent::CategoryEnabledChanged { category, enabled }) => {
                        service.apply(category, enabled).await;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Cascade fell behind, {} notifications dropped", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            service.running.store(false, Ordering::SeqCst);
            debug!("Cascade service stopped");
        })
    }

    /// Bring the devices of a category in line with its switch.
    pub async fn apply(&self, category: SwitchCategory, enabled: bool) {
        if category == SwitchCategory::Vpn {
            debug!("No devices behind the vpn switch");
            return;
        }

        let devices = match self.devices_of(category).await {
            Ok(devices) => devices,
            Err(e) => {
                warn!("Cannot list {} devices: {}", category, e);
                return;
            }
        };
        info!(
            "Cascading {} switch ({}) to {} devices",
            category,
            if enabled { "on" } else { "off" },
            devices.len()
        );

        for device in devices {
            let outcome = if enabled {
                self.manager.restore_device_state(&device).await
            } else {
                self.manager.enable_device(&device, false).await
            };
            if let Err(e) = outcome {
                warn!("Cascade to {} failed: {}", device, e);
            }
        }
    }

    async fn devices_of(&self, category: SwitchCategory) -> Result<Vec<DeviceRef>> {
        let adapter = self.manager.adapter();
        let mut matching = Vec::new();
        for device in adapter.devices().await? {
            match adapter.device_type(&device).await {
                Ok(device_type) if device_type.category() == Some(category) => matching.push(device),
                Ok(_) => {}
                Err(e) => debug!("Skipping {}: {}", device, e),
            }
        }
        Ok(matching)
    }
}
