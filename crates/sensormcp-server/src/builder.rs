//! Server builder.

use std::sync::Arc;
use std::time::Duration;

use sensormcp_device::{ActivityLog, Device, DeviceIdentity, SensorEngine, TickConfig};
use sensormcp_protocol::{
    LoggingCapability, ResourcesCapability, ServerCapabilities, ServerInfo, ToolsCapability,
};

use crate::config::{DEFAULT_SHUTDOWN_GRACE_MS, ServerConfig};
use crate::handler::DeviceContext;
use crate::{ResourceHandler, Router, Server, ToolHandler, catalog};

/// Builder for configuring the sensor server.
pub struct ServerBuilder {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    router: Router,
    instructions: Option<String>,
    identity: DeviceIdentity,
    device: Option<Arc<Device>>,
    engine: Option<Arc<SensorEngine>>,
    activity: ActivityLog,
    shutdown_grace: Duration,
    tick: Option<TickConfig>,
    announce: bool,
}

impl ServerBuilder {
    /// Creates a new server builder.
    #[must_use]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            capabilities: ServerCapabilities {
                logging: Some(LoggingCapability::default()),
                ..ServerCapabilities::default()
            },
            router: Router::new(),
            instructions: None,
            identity: DeviceIdentity::default(),
            device: None,
            engine: None,
            activity: ActivityLog::disabled(),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
            tick: None,
            announce: false,
        }
    }

    /// Applies the server-level settings of a configuration: identity,
    /// activity log, grace delay, tick and announcement.
    #[must_use]
    pub fn config(mut self, config: &ServerConfig) -> Self {
        self.identity = config.identity();
        self.activity = config.activity_log();
        self.shutdown_grace = config.shutdown_grace();
        self.tick = config.tick();
        self.announce = config.announce_on_start;
        self
    }

    /// Uses the given acquisition engine.
    #[must_use]
    pub fn engine(mut self, engine: Arc<SensorEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Uses the given device instead of building one at `build()`.
    #[must_use]
    pub fn device(mut self, device: Arc<Device>) -> Self {
        self.device = Some(device);
        self
    }

    /// Sets the activity log.
    #[must_use]
    pub fn activity_log(mut self, activity: ActivityLog) -> Self {
        self.activity = activity;
        self
    }

    /// Sets the delay between answering `shutdown` and stopping.
    #[must_use]
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Enables or disables the background tick.
    #[must_use]
    pub fn tick(mut self, tick: Option<TickConfig>) -> Self {
        self.tick = tick;
        self
    }

    /// Emit a ready notification when the run loop starts.
    #[must_use]
    pub fn announce(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    /// Registers a tool handler.
    #[must_use]
    pub fn tool<H: ToolHandler + 'static>(mut self, handler: H) -> Self {
        self.router.add_tool(handler);
        self.capabilities.tools = Some(ToolsCapability::default());
        self
    }

    /// Registers a resource handler.
    #[must_use]
    pub fn resource<H: ResourceHandler + 'static>(mut self, handler: H) -> Self {
        self.router.add_resource(handler);
        self.capabilities.resources = Some(ResourcesCapability::default());
        self
    }

    /// Registers the device's three resources and six tools.
    #[must_use]
    pub fn device_catalog(self) -> Self {
        catalog::register(self)
    }

    /// Sets custom server instructions.
    #[must_use]
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    /// Builds the server.
    ///
    /// Without an explicit engine the server runs simulated; without an
    /// explicit device one is built from the configured identity.
    #[must_use]
    pub fn build(self) -> Server {
        let engine = self.engine.unwrap_or_else(|| {
            Arc::new(SensorEngine::new(None).with_activity_log(self.activity.clone()))
        });
        let device = self.device.unwrap_or_else(|| {
            Arc::new(Device::new(self.identity, engine.has_hardware()))
        });
        Server {
            info: self.info,
            capabilities: self.capabilities,
            router: self.router,
            instructions: self.instructions,
            context: DeviceContext::new(device, engine, self.activity),
            shutdown_grace: self.shutdown_grace,
            tick: self.tick,
            announce: self.announce,
        }
    }
}
