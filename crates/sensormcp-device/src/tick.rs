//! Periodic background tick.
//!
//! Every interval the battery drains by a fixed amount (never below zero).
//! Without hardware the tick also refreshes the simulated reading, so
//! resources that read the current value see it move.

use std::sync::Arc;
use std::time::Duration;

use sensormcp_core::logging::{debug, targets};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::acquisition::SensorEngine;
use crate::device::Device;

/// Tick period and per-tick battery drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickConfig {
    /// Time between ticks.
    pub interval: Duration,
    /// Battery percentage lost per tick.
    pub battery_drain: u8,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            battery_drain: 1,
        }
    }
}

/// Handle to the running tick task. Dropping it stops the task.
#[derive(Debug)]
pub struct BackgroundTick {
    handle: JoinHandle<()>,
}

impl BackgroundTick {
    /// Spawns the tick on the current runtime. The first tick fires one full
    /// interval after spawning.
    #[must_use]
    pub fn spawn(device: Arc<Device>, engine: Arc<SensorEngine>, config: TickConfig) -> Self {
        let period = config.interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                tick_once(&device, &engine, config.battery_drain);
            }
        });
        Self { handle }
    }

    /// Stops the tick.
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for BackgroundTick {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// One tick's worth of work.
pub(crate) fn tick_once(device: &Device, engine: &SensorEngine, drain: u8) {
    let battery = device.drain_battery(drain);
    if engine.has_hardware() {
        debug!(target: targets::DEVICE, "Tick: battery {}%", battery);
    } else {
        let reading = engine.refresh_simulated();
        debug!(
            target: targets::DEVICE,
            "Tick: battery {}%, simulated {} ppm",
            battery,
            reading.co2_level
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceIdentity;
    use crate::hardware::{HardwareLink, PortDescriptor};
    use crate::reading::ReadingStatus;

    fn parts(engine: SensorEngine) -> (Arc<Device>, Arc<SensorEngine>) {
        let hardware = engine.has_hardware();
        (
            Arc::new(Device::new(DeviceIdentity::default(), hardware)),
            Arc::new(engine),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn drains_battery_once_per_interval() {
        let (device, engine) = parts(SensorEngine::new(None));
        let tick = BackgroundTick::spawn(Arc::clone(&device), engine, TickConfig::default());

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(device.battery_level(), 100);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(device.battery_level(), 99);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(device.battery_level(), 97);

        tick.stop();
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(device.battery_level(), 97);
    }

    #[tokio::test(start_paused = true)]
    async fn battery_stops_at_zero() {
        let (device, engine) = parts(SensorEngine::new(None));
        let config = TickConfig {
            interval: Duration::from_secs(1),
            battery_drain: 40,
        };
        let _tick = BackgroundTick::spawn(Arc::clone(&device), engine, config);

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert_eq!(device.battery_level(), 0);
    }

    #[test]
    fn tick_refreshes_simulation_only_without_hardware() {
        let (device, engine) = parts(SensorEngine::new(None));
        tick_once(&device, &engine, 1);
        assert_eq!(engine.current().status, ReadingStatus::SimulatedData);
        assert_eq!(device.battery_level(), 99);

        let (link, _endpoint) = HardwareLink::channel(PortDescriptor {
            path: "test".to_string(),
            description: "test".to_string(),
        });
        let (device, engine) = parts(SensorEngine::new(Some(link)));
        let before = engine.current();
        tick_once(&device, &engine, 1);
        assert_eq!(engine.current(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_handle_stops_ticks() {
        let (device, engine) = parts(SensorEngine::new(None));
        let tick = BackgroundTick::spawn(Arc::clone(&device), engine, TickConfig::default());
        drop(tick);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(device.battery_level(), 100);
    }
}
