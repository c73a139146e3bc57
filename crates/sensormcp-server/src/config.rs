//! Server configuration.
//!
//! Every field has a default, so an empty TOML document (or none at all)
//! yields a working simulated server.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sensormcp_device::{ActivityLog, DeviceIdentity, TickConfig};

/// Default hardware timeout in milliseconds.
pub const DEFAULT_SENSOR_TIMEOUT_MS: u64 = 5000;
/// Default delay between the shutdown response and termination.
pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 100;
/// Default background tick period.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 30_000;
/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Runtime configuration of the sensor server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Time to wait for a hardware reading before simulating one.
    pub sensor_timeout_ms: u64,
    /// Delay after answering `shutdown` before the server stops.
    pub shutdown_grace_ms: u64,
    /// Background tick period; 0 disables the tick.
    pub tick_interval_ms: u64,
    /// Battery percentage lost per tick.
    pub battery_drain_per_tick: u8,
    /// Serial device to open.
    pub serial_port: Option<String>,
    /// Open the first listed serial port when `serial_port` is unset.
    pub auto_detect: bool,
    /// Serial baud rate.
    pub baud_rate: u32,
    /// Bytes written to request a reading.
    pub read_command: String,
    /// Activity log path; an empty path disables the log.
    pub activity_log: PathBuf,
    /// Emit a `notifications/message` line when the server starts.
    pub announce_on_start: bool,
    /// Device id override.
    pub device_id: Option<String>,
    /// Device name override.
    pub device_name: Option<String>,
    /// Firmware version override.
    pub firmware_version: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            sensor_timeout_ms: DEFAULT_SENSOR_TIMEOUT_MS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            battery_drain_per_tick: 1,
            serial_port: None,
            auto_detect: false,
            baud_rate: DEFAULT_BAUD_RATE,
            read_command: "READ\n".to_string(),
            activity_log: PathBuf::from("sensormcp.log"),
            announce_on_start: true,
            device_id: None,
            device_name: None,
            firmware_version: None,
        }
    }
}

impl ServerConfig {
    /// Hardware timeout.
    #[must_use]
    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    /// Shutdown grace delay.
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Background tick settings, or `None` when the tick is disabled.
    #[must_use]
    pub fn tick(&self) -> Option<TickConfig> {
        (self.tick_interval_ms > 0).then(|| TickConfig {
            interval: Duration::from_millis(self.tick_interval_ms),
            battery_drain: self.battery_drain_per_tick,
        })
    }

    /// Device identity with overrides applied.
    #[must_use]
    pub fn identity(&self) -> DeviceIdentity {
        let mut identity = DeviceIdentity::default();
        if let Some(id) = &self.device_id {
            identity.device_id.clone_from(id);
        }
        if let Some(name) = &self.device_name {
            identity.name.clone_from(name);
        }
        if let Some(version) = &self.firmware_version {
            identity.firmware_version.clone_from(version);
        }
        identity
    }

    /// The activity log sink.
    #[must_use]
    pub fn activity_log(&self) -> ActivityLog {
        if self.activity_log.as_os_str().is_empty() {
            ActivityLog::disabled()
        } else {
            ActivityLog::new(&self.activity_log)
        }
    }

    /// Whether any hardware should be opened.
    #[must_use]
    pub fn wants_hardware(&self) -> bool {
        self.serial_port.is_some() || self.auto_detect
    }
}
