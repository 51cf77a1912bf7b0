// netswitch - Global Switches
// Copyright (C) 2026 Christos A. Daggas
// SPDX-License-Identifier: MIT

//! Global category switches and their "last" shadow values.
//!
//! Wired and VPN keep their current value in the document. Wireless and
//! mobile broadband mirror the network stack's radio switches, so only
//! their "last" value lives here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::document::SettingsDocument;
use super::error::Error;

/// A global network switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwitchCategory {
    Wired,
    Wireless,
    /// Mobile broadband.
    Wwan,
    Vpn,
}

impl SwitchCategory {
    pub const ALL: [SwitchCategory; 4] = [Self::Wired, Self::Wireless, Self::Wwan, Self::Vpn];

    /// Whether the current value is a radio switch owned by the network stack.
    pub fn is_radio(&self) -> bool {
        matches!(self, Self::Wireless | Self::Wwan)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wired => "wired",
            Self::Wireless => "wireless",
            Self::Wwan => "wwan",
            Self::Vpn => "vpn",
        }
    }
}

impl fmt::Display for SwitchCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwitchCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wired" | "ethernet" => Ok(Self::Wired),
            "wireless" | "wifi" => Ok(Self::Wireless),
            "wwan" | "mobile" => Ok(Self::Wwan),
            "vpn" => Ok(Self::Vpn),
            other => Err(Error::UnknownCategory(other.to_string())),
        }
    }
}

impl SettingsDocument {
    fn stored_switch_mut(&mut self, category: SwitchCategory) -> Option<&mut bool> {
        match category {
            SwitchCategory::Wired => Some(&mut self.wired_enabled),
            SwitchCategory::Vpn => Some(&mut self.vpn_enabled),
            SwitchCategory::Wireless | SwitchCategory::Wwan => None,
        }
    }

    fn last_switch_mut(&mut self, category: SwitchCategory) -> &mut bool {
        match category {
            SwitchCategory::Wired => &mut self.last_wired_enabled,
            SwitchCategory::Wireless => &mut self.last_wireless_enabled,
            SwitchCategory::Wwan => &mut self.last_wwan_enabled,
            SwitchCategory::Vpn => &mut self.last_vpn_enabled,
        }
    }

    /// Current value of a switch stored in the document.
    ///
    /// `None` for radio switches, which are read from the network stack.
    pub fn stored_switch(&self, category: SwitchCategory) -> Option<bool> {
        match category {
            SwitchCategory::Wired => Some(self.wired_enabled),
            SwitchCategory::Vpn => Some(self.vpn_enabled),
            SwitchCategory::Wireless | SwitchCategory::Wwan => None,
        }
    }

    /// Remembered value of a switch.
    pub fn last_switch(&self, category: SwitchCategory) -> bool {
        match category {
            SwitchCategory::Wired => self.last_wired_enabled,
            SwitchCategory::Wireless => self.last_wireless_enabled,
            SwitchCategory::Wwan => self.last_wwan_enabled,
            SwitchCategory::Vpn => self.last_vpn_enabled,
        }
    }

    /// Record a switch moving from `previous` to `enabled`.
    ///
    /// `previous` lands in the "last" slot and stored switches take the new
    /// value. Returns false, touching nothing, when the value is unchanged.
    pub fn record_switch(&mut self, category: SwitchCategory, previous: bool, enabled: bool) -> bool {
        if previous == enabled {
            return false;
        }
        *self.last_switch_mut(category) = previous;
        if let Some(current) = self.stored_switch_mut(category) {
            *current = enabled;
        }
        true
    }

    /// Set a stored switch. Returns whether it changed.
    ///
    /// Radio switches have no stored value here; use [`Self::record_switch`]
    /// with the value read from the network stack.
    pub fn set_switch(&mut self, category: SwitchCategory, enabled: bool) -> bool {
        match self.stored_switch(category) {
            Some(previous) => self.record_switch(category, previous, enabled),
            None => false,
        }
    }

    /// Set a "last" value without recording a transition. Returns whether it changed.
    pub fn set_last_switch(&mut self, category: SwitchCategory, enabled: bool) -> bool {
        let last = self.last_switch_mut(category);
        if *last == enabled {
            return false;
        }
        *last = enabled;
        true
    }

    /// Set every "last" value at once.
    pub fn set_all_last_switches(&mut self, enabled: bool) {
        for category in SwitchCategory::ALL {
            *self.last_switch_mut(category) = enabled;
        }
    }
}
