//! Network status.
//!
//! WiFi and MQTT are not wired up on this device; the status is a fixed
//! shape reporting both as disconnected so clients can rely on the fields.

use serde::{Deserialize, Serialize};

/// WiFi link status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WifiStatus {
    /// Whether the device is associated.
    pub connected: bool,
    /// Network name.
    pub ssid: Option<String>,
    /// Signal strength in dBm.
    pub signal_strength: Option<i32>,
}

/// MQTT broker status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MqttStatus {
    /// Whether the broker session is up.
    pub connected: bool,
    /// Broker address.
    pub broker: Option<String>,
}

/// Combined network status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStatus {
    /// WiFi status.
    pub wifi: WifiStatus,
    /// MQTT status.
    pub mqtt: MqttStatus,
}

impl NetworkStatus {
    /// The fixed status reported by this device.
    #[must_use]
    pub fn current() -> Self {
        Self {
            wifi: WifiStatus {
                connected: false,
                ssid: None,
                signal_strength: None,
            },
            mqtt: MqttStatus {
                connected: false,
                broker: None,
            },
        }
    }
}
