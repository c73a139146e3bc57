//! Sensor acquisition engine.
//!
//! Each call to [`SensorEngine::acquire`] moves through an explicit state
//! machine:
//!
//! ```text
//! Idle -> AwaitingHardware -> Resolved
//! Idle -> AwaitingHardware -> TimedOut -> Resolved
//! ```
//!
//! The hardware subscription and the timer live in one
//! [`PendingAcquisition`], which is consumed by its race. Whichever side wins,
//! both handles are released when the pending value is dropped, so a call
//! can resolve only once and never leaves a listener or timer behind.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use sensormcp_core::logging::{debug, targets, trace, warn};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Instant, Sleep};

use crate::activity::ActivityLog;
use crate::hardware::HardwareLink;
use crate::reading::{ReadingStatus, SensorReading, parse_reading_line};

/// Default time to wait for hardware before falling back to simulation.
pub const DEFAULT_SENSOR_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default bytes written to ask the hardware for a reading.
const DEFAULT_READ_COMMAND: &[u8] = b"READ\n";

/// Per-call acquisition state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcquisitionState {
    Idle,
    AwaitingHardware,
    TimedOut,
    Resolved,
}

/// How a race ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RaceOutcome {
    Data(u32),
    TimedOut,
}

/// Subscription plus timer for one in-flight acquisition.
struct PendingAcquisition {
    subscription: Option<broadcast::Receiver<String>>,
    timer: std::pin::Pin<Box<Sleep>>,
    deadline: Instant,
    state: AcquisitionState,
}

impl PendingAcquisition {
    /// Subscribes to the hardware stream and arms the timer.
    fn start(link: &HardwareLink, timeout: Duration) -> Self {
        let mut pending = Self {
            subscription: None,
            timer: Box::pin(tokio::time::sleep(timeout)),
            deadline: Instant::now() + timeout,
            state: AcquisitionState::Idle,
        };
        pending.subscription = Some(link.subscribe());
        pending.state = AcquisitionState::AwaitingHardware;
        pending
    }

    /// Races the first valid hardware reading against the timer.
    ///
    /// Consumes the pending acquisition; the losing handle is dropped with it.
    async fn race(mut self) -> RaceOutcome {
        debug_assert_eq!(self.state, AcquisitionState::AwaitingHardware);
        let outcome = loop {
            tokio::select! {
                event = next_line(&mut self.subscription) => match event {
                    Ok(line) => match parse_reading_line(&line) {
                        Some(value) => break RaceOutcome::Data(value),
                        None => trace!(target: targets::SENSOR, "Ignoring hardware line: {}", line),
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(target: targets::SENSOR, "Acquisition skipped {} hardware lines", skipped);
                    }
                    Err(RecvError::Closed) => {
                        warn!(target: targets::SENSOR, "Hardware stream closed; waiting for timeout");
                        self.subscription = None;
                    }
                },
                () = self.timer.as_mut() => {
                    self.state = AcquisitionState::TimedOut;
                    break RaceOutcome::TimedOut;
                }
            }
        };
        self.release();
        outcome
    }

    fn release(&mut self) {
        self.subscription = None;
        self.state = AcquisitionState::Resolved;
    }
}

impl Drop for PendingAcquisition {
    fn drop(&mut self) {
        if self.state != AcquisitionState::Resolved {
            debug!(
                target: targets::SENSOR,
                "Acquisition abandoned in state {:?}",
                self.state
            );
        }
    }
}

/// Waits for the next hardware line, or forever once the stream is gone.
async fn next_line(
    subscription: &mut Option<broadcast::Receiver<String>>,
) -> Result<String, RecvError> {
    match subscription {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Owns the current sensor reading and every in-flight acquisition.
pub struct SensorEngine {
    link: Option<HardwareLink>,
    timeout: Duration,
    read_command: Vec<u8>,
    current: Mutex<SensorReading>,
    activity: ActivityLog,
}

impl SensorEngine {
    /// Creates an engine, attached to hardware when a link is given.
    #[must_use]
    pub fn new(link: Option<HardwareLink>) -> Self {
        Self {
            link,
            timeout: DEFAULT_SENSOR_TIMEOUT,
            read_command: DEFAULT_READ_COMMAND.to_vec(),
            current: Mutex::new(SensorReading::simulated(ReadingStatus::SimulatedData)),
            activity: ActivityLog::disabled(),
        }
    }

    /// Sets the hardware timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the bytes written to request a reading.
    #[must_use]
    pub fn with_read_command(mut self, command: impl Into<Vec<u8>>) -> Self {
        self.read_command = command.into();
        self
    }

    /// Records acquisition outcomes to the given activity log.
    #[must_use]
    pub fn with_activity_log(mut self, activity: ActivityLog) -> Self {
        self.activity = activity;
        self
    }

    /// Whether a hardware link is attached.
    #[must_use]
    pub fn has_hardware(&self) -> bool {
        self.link.is_some()
    }

    /// The configured hardware timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The hardware link, if attached.
    #[must_use]
    pub fn link(&self) -> Option<&HardwareLink> {
        self.link.as_ref()
    }

    /// Returns the most recently stored reading.
    #[must_use]
    pub fn current(&self) -> SensorReading {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Acquires a fresh reading.
    ///
    /// Without hardware this resolves immediately with a simulated value.
    /// With hardware it requests a reading and waits for the first valid
    /// line or the timeout, whichever comes first.
    pub async fn acquire(&self) -> SensorReading {
        let reading = match &self.link {
            Some(link) => self.acquire_from(link).await,
            None => SensorReading::simulated(ReadingStatus::SimulatedData),
        };
        self.activity.record(&format!(
            "sensor reading {} ppm ({})",
            reading.co2_level,
            status_label(reading.status)
        ));
        self.store(&reading);
        reading
    }

    async fn acquire_from(&self, link: &HardwareLink) -> SensorReading {
        let started = Instant::now();
        let pending = PendingAcquisition::start(link, self.timeout);

        // Best effort: a failed or stalled write still ends at the deadline.
        match tokio::time::timeout_at(pending.deadline, link.write(&self.read_command)).await {
            Ok(Ok(())) => trace!(target: targets::SENSOR, "Read request sent"),
            Ok(Err(e)) => warn!(target: targets::SENSOR, "Read request failed: {}", e),
            Err(_) => warn!(target: targets::SENSOR, "Read request did not flush before timeout"),
        }

        let reading = match pending.race().await {
            RaceOutcome::Data(value) => SensorReading::now(value, ReadingStatus::DataReceived),
            RaceOutcome::TimedOut => SensorReading::simulated(ReadingStatus::TimeoutSimulatedData),
        };
        debug!(
            target: targets::SENSOR,
            "Acquisition resolved after {:?}: {} ppm ({:?})",
            started.elapsed(),
            reading.co2_level,
            reading.status
        );
        reading
    }

    /// Replaces the stored reading with a fresh simulated one.
    ///
    /// Used by the background tick when no hardware is attached.
    pub fn refresh_simulated(&self) -> SensorReading {
        let reading = SensorReading::simulated(ReadingStatus::SimulatedData);
        self.store(&reading);
        reading
    }

    /// Closes the hardware link, if any.
    pub fn shutdown(&self) {
        if let Some(link) = &self.link {
            link.close();
        }
    }

    fn store(&self, reading: &SensorReading) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = reading.clone();
    }
}

fn status_label(status: ReadingStatus) -> &'static str {
    match status {
        ReadingStatus::DataReceived => "data_received",
        ReadingStatus::TimeoutSimulatedData => "timeout_simulated_data",
        ReadingStatus::SimulatedData => "simulated_data",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hardware::{HardwareEndpoint, PortDescriptor};
    use crate::reading::CO2_SIMULATED_RANGE;

    fn hardware_engine() -> (Arc<SensorEngine>, HardwareEndpoint) {
        let (link, endpoint) = HardwareLink::channel(PortDescriptor {
            path: "test".to_string(),
            description: "test".to_string(),
        });
        (Arc::new(SensorEngine::new(Some(link))), endpoint)
    }

    /// Asserts a paused-clock duration landed within 50ms after `expected`.
    fn assert_elapsed(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual <= expected + Duration::from_millis(50),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    fn emit_after(endpoint: &HardwareEndpoint, delay: Duration, line: &'static str) {
        let lines = endpoint.lines.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = lines.send(line.to_string());
        });
    }

    #[tokio::test(start_paused = true)]
    async fn without_hardware_resolves_immediately() {
        let engine = SensorEngine::new(None);
        let started = Instant::now();
        let reading = engine.acquire().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(reading.status, ReadingStatus::SimulatedData);
        assert!(CO2_SIMULATED_RANGE.contains(&reading.co2_level));
        assert_eq!(engine.current(), reading);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_hardware_times_out_at_deadline() {
        let (engine, _endpoint) = hardware_engine();
        let started = Instant::now();
        let reading = engine.acquire().await;
        let elapsed = started.elapsed();

        assert_elapsed(elapsed, Duration::from_millis(5000));
        assert_eq!(reading.status, ReadingStatus::TimeoutSimulatedData);
        assert!(CO2_SIMULATED_RANGE.contains(&reading.co2_level));
        assert_eq!(engine.link().unwrap().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hardware_reading_wins_and_timer_is_released() {
        let (engine, mut endpoint) = hardware_engine();
        emit_after(&endpoint, Duration::from_millis(100), "CO2 (ppm):812");

        let started = Instant::now();
        let reading = engine.acquire().await;
        assert_elapsed(started.elapsed(), Duration::from_millis(100));
        assert_eq!(reading.status, ReadingStatus::DataReceived);
        assert_eq!(reading.co2_level, 812);
        assert_eq!(endpoint.commands.recv().await.unwrap(), b"READ\n");
        assert_eq!(engine.link().unwrap().subscriber_count(), 0);

        // Nothing resolves late once the deadline passes.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let current = engine.current();
        assert_eq!(current.status, ReadingStatus::DataReceived);
        assert_eq!(current.co2_level, 812);
    }

    #[tokio::test(start_paused = true)]
    async fn garbled_lines_do_not_win() {
        let (engine, endpoint) = hardware_engine();
        emit_after(&endpoint, Duration::from_millis(10), "CO2 (ppm):0");
        emit_after(&endpoint, Duration::from_millis(20), "boot: sensor warming up");
        emit_after(&endpoint, Duration::from_millis(30), "CO2 (ppm):??");

        let reading = engine.acquire().await;
        assert_eq!(reading.status, ReadingStatus::TimeoutSimulatedData);
    }

    #[tokio::test(start_paused = true)]
    async fn garbled_then_valid_line_resolves_with_valid_value() {
        let (engine, endpoint) = hardware_engine();
        emit_after(&endpoint, Duration::from_millis(10), "CO2 (ppm):-1");
        emit_after(&endpoint, Duration::from_millis(20), "CO2 (ppm):640");

        let reading = engine.acquire().await;
        assert_eq!(reading.status, ReadingStatus::DataReceived);
        assert_eq!(reading.co2_level, 640);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_calls_resolve_independently() {
        let (engine, endpoint) = hardware_engine();
        let start = Instant::now();

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { (engine.acquire().await, Instant::now()) }
        });
        emit_after(&endpoint, Duration::from_millis(100), "CO2 (ppm):812");

        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { (engine.acquire().await, Instant::now()) }
        });

        let (first, first_at) = first.await.unwrap();
        let (second, second_at) = second.await.unwrap();

        assert_eq!(first.status, ReadingStatus::DataReceived);
        assert_eq!(first.co2_level, 812);
        assert_elapsed(first_at - start, Duration::from_millis(100));

        assert_eq!(second.status, ReadingStatus::TimeoutSimulatedData);
        assert_elapsed(second_at - start, Duration::from_millis(5200));
        assert_eq!(engine.link().unwrap().subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_share_one_reading() {
        let (engine, endpoint) = hardware_engine();
        let a = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.acquire().await }
        });
        let b = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.acquire().await }
        });
        emit_after(&endpoint, Duration::from_millis(50), "CO2 (ppm):900");

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert_eq!(a.co2_level, 900);
        assert_eq!(b.co2_level, 900);
        assert_eq!(a.status, ReadingStatus::DataReceived);
        assert_eq!(b.status, ReadingStatus::DataReceived);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_device_side_still_times_out() {
        let (engine, endpoint) = hardware_engine();
        drop(endpoint);
        let started = Instant::now();
        let reading = engine.acquire().await;
        assert_elapsed(started.elapsed(), Duration::from_millis(5000));
        assert_eq!(reading.status, ReadingStatus::TimeoutSimulatedData);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_timeout_is_honored() {
        let (link, _endpoint) = HardwareLink::channel(PortDescriptor {
            path: "test".to_string(),
            description: "test".to_string(),
        });
        let engine = SensorEngine::new(Some(link)).with_timeout(Duration::from_millis(250));
        let started = Instant::now();
        let reading = engine.acquire().await;
        assert_elapsed(started.elapsed(), Duration::from_millis(250));
        assert_eq!(reading.status, ReadingStatus::TimeoutSimulatedData);
    }

    #[tokio::test]
    async fn every_outcome_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.log");

        let engine = SensorEngine::new(None).with_activity_log(ActivityLog::new(&path));
        let reading = engine.acquire().await;

        let log = std::fs::read_to_string(&path).unwrap();
        let expected = format!("sensor reading {} ppm (simulated_data)", reading.co2_level);
        assert_eq!(log.lines().count(), 1, "{log}");
        assert!(log.trim_end().ends_with(&expected), "{log}");
    }

    #[tokio::test(start_paused = true)]
    async fn hardware_outcomes_are_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.log");
        let (link, endpoint) = HardwareLink::channel(PortDescriptor {
            path: "test".to_string(),
            description: "test".to_string(),
        });
        let engine = SensorEngine::new(Some(link)).with_activity_log(ActivityLog::new(&path));

        emit_after(&endpoint, Duration::from_millis(10), "CO2 (ppm):777");
        engine.acquire().await;
        engine.acquire().await;

        let log = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 2, "{log}");
        assert!(lines[0].ends_with("sensor reading 777 ppm (data_received)"));
        assert!(lines[1].ends_with("(timeout_simulated_data)"));
    }

    #[test]
    fn refresh_replaces_current_reading() {
        let engine = SensorEngine::new(None);
        let refreshed = engine.refresh_simulated();
        assert_eq!(engine.current(), refreshed);
    }
}
