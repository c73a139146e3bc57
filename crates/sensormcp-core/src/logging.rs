//! Structured logging for sensormcp.
//!
//! All crates log through the standard [`log`] facade using the targets
//! below, so a single filter such as
//! `SENSORMCP_LOG=debug` or a target prefix match can select one layer.
//!
//! # Log Levels
//!
//! - **error**: transport failures, unrecoverable handler faults
//! - **warn**: hardware fallbacks, dropped or oversized input
//! - **info**: lifecycle events (start, shutdown, hardware attach)
//! - **debug**: request flow, acquisition outcomes
//! - **trace**: raw wire lines and hardware lines
//!
//! # Initialization
//!
//! This crate ships no logger. The `sensormcp` binary installs a stderr
//! logger; stdout is reserved for protocol traffic.

pub use log::{debug, error, info, trace, warn};
pub use log::{Level, LevelFilter};

/// Log targets used by sensormcp components.
pub mod targets {
    /// Root target for all sensormcp logs.
    pub const SENSORMCP: &str = "sensormcp";

    /// Server lifecycle and the run loop.
    pub const SERVER: &str = "sensormcp::server";

    /// Line framing and output writes.
    pub const TRANSPORT: &str = "sensormcp::transport";

    /// Method dispatch.
    pub const ROUTER: &str = "sensormcp::router";

    /// Resource and tool handlers.
    pub const HANDLER: &str = "sensormcp::handler";

    /// Session negotiation.
    pub const SESSION: &str = "sensormcp::session";

    /// Envelope parsing and classification.
    pub const CODEC: &str = "sensormcp::codec";

    /// Sensor acquisition and the hardware link.
    pub const SENSOR: &str = "sensormcp::sensor";

    /// Device identity, battery and the background tick.
    pub const DEVICE: &str = "sensormcp::device";
}

/// Returns whether logging is enabled at the given level for the given target.
#[inline]
#[must_use]
pub fn is_enabled(level: Level, target: &str) -> bool {
    log::log_enabled!(target: target, level)
}
