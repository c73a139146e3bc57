//! Device side of the sensor MCP server.
//!
//! This crate owns everything behind the protocol handlers:
//! - [`SensorEngine`]: acquires readings by racing hardware data against a
//!   timeout, resolving each call exactly once
//! - [`HardwareTransport`] / [`HardwareLink`]: the hardware collaborator and
//!   its shared line stream, with a [`SerialHardware`] implementation
//! - [`Device`]: identity, uptime and battery
//! - [`BackgroundTick`]: periodic battery drain and simulated refresh
//! - [`ActivityLog`]: append-only activity file
//!
//! # Concurrency
//!
//! Any number of acquisitions may be pending at once. Each holds its own
//! subscription to the hardware stream and its own timer; none can consume
//! or cancel another's.

#![forbid(unsafe_code)]

mod acquisition;
mod activity;
mod device;
mod hardware;
mod network;
mod reading;
mod tick;

pub use acquisition::{DEFAULT_SENSOR_TIMEOUT, SensorEngine};
pub use activity::ActivityLog;
pub use device::{Device, DeviceIdentity, DeviceSnapshot};
pub use hardware::{
    HardwareEndpoint, HardwareError, HardwareLink, HardwareTransport, PortDescriptor,
    SerialHardware,
};
pub use network::NetworkStatus;
pub use reading::{CO2_SIMULATED_RANGE, ReadingStatus, SensorReading, parse_reading_line};
pub use tick::{BackgroundTick, TickConfig};
