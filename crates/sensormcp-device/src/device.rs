//! Device identity, uptime and battery.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Fixed identity of the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    /// Stable device identifier.
    pub device_id: String,
    /// Display name.
    pub name: String,
    /// Hardware model.
    pub model: String,
    /// Firmware version string.
    pub firmware_version: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            device_id: "envsensor-001".to_string(),
            name: "Environmental Sensor".to_string(),
            model: "CO2-NDIR-1".to_string(),
            firmware_version: "1.0.0".to_string(),
        }
    }
}

/// Point-in-time view of the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    /// Stable device identifier.
    pub device_id: String,
    /// Display name.
    pub name: String,
    /// Hardware model.
    pub model: String,
    /// Firmware version string.
    pub firmware_version: String,
    /// Whole seconds since the server started.
    pub uptime_seconds: u64,
    /// Battery level, 0 to 100.
    pub battery_level: u8,
    /// Whether a hardware link is attached.
    pub hardware_connected: bool,
}

/// The device component. Constructed once at startup.
#[derive(Debug)]
pub struct Device {
    identity: DeviceIdentity,
    started_at: Instant,
    battery: Mutex<u8>,
    hardware_connected: bool,
}

impl Device {
    /// Creates a device with a full battery.
    #[must_use]
    pub fn new(identity: DeviceIdentity, hardware_connected: bool) -> Self {
        Self {
            identity,
            started_at: Instant::now(),
            battery: Mutex::new(100),
            hardware_connected,
        }
    }

    /// The device identity.
    #[must_use]
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Current battery level.
    #[must_use]
    pub fn battery_level(&self) -> u8 {
        *self.battery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lowers the battery by `amount`, stopping at zero. Returns the new level.
    pub fn drain_battery(&self, amount: u8) -> u8 {
        let mut battery = self.battery.lock().unwrap_or_else(PoisonError::into_inner);
        *battery = battery.saturating_sub(amount);
        *battery
    }

    /// Builds a snapshot from the current fields.
    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            device_id: self.identity.device_id.clone(),
            name: self.identity.name.clone(),
            model: self.identity.model.clone(),
            firmware_version: self.identity.firmware_version.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            battery_level: self.battery_level(),
            hardware_connected: self.hardware_connected,
        }
    }
}
