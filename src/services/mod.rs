// netswitch - Services
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Switch services.
//!
//! - Reconcile: The engine owning the switch state
//! - Cascade: Applies global switch changes to devices
//! - Monitor: Follows devices and connections appearing and disappearing

pub mod cascade;
pub mod monitor;
pub mod reconcile;

pub use cascade::CascadeService;
pub use monitor::DeviceMonitor;
pub use reconcile::DeviceSwitchManager;
