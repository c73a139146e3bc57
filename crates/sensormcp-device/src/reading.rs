//! Sensor readings and the hardware line format.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{SecondsFormat, Utc};
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Range of simulated CO2 values in ppm.
pub const CO2_SIMULATED_RANGE: Range<u32> = 400..1000;

static READING_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"CO2\s*\(ppm\)\s*:\s*(\d+)").unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// Where a reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    /// Parsed from a hardware line.
    DataReceived,
    /// Hardware is attached but did not answer in time.
    TimeoutSimulatedData,
    /// No hardware attached.
    SimulatedData,
}

/// The current sensor reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// CO2 concentration in ppm.
    pub co2_level: u32,
    /// RFC 3339 timestamp of when the value was taken.
    pub last_update: String,
    /// Provenance of the value.
    pub status: ReadingStatus,
}

impl SensorReading {
    /// A reading taken now.
    #[must_use]
    pub fn now(co2_level: u32, status: ReadingStatus) -> Self {
        Self {
            co2_level,
            last_update: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            status,
        }
    }

    /// A plausible simulated reading taken now.
    #[must_use]
    pub fn simulated(status: ReadingStatus) -> Self {
        let co2_level = rand::thread_rng().gen_range(CO2_SIMULATED_RANGE);
        Self::now(co2_level, status)
    }
}

/// Extracts a CO2 value from a hardware line such as `CO2 (ppm):812`.
///
/// Returns `None` for lines without a match and for non-positive values.
#[must_use]
pub fn parse_reading_line(line: &str) -> Option<u32> {
    let captures = READING_PATTERN.captures(line)?;
    let value: u32 = captures.get(1)?.as_str().parse().ok()?;
    (value > 0).then_some(value)
}
