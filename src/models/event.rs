// netswitch - Notifications
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Notifications broadcast by the reconciliation engine.

use super::device::{DeviceId, DeviceRef};
use super::switches::SwitchCategory;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchEvent {
    /// A device was switched on or off. Reflects the requested state, not
    /// whether the network stack managed to connect or disconnect it.
    DeviceEnabledChanged {
        device: DeviceRef,
        id: DeviceId,
        enabled: bool,
    },

    /// A global category switch changed.
    CategoryEnabledChanged {
        category: SwitchCategory,
        enabled: bool,
    },
}
