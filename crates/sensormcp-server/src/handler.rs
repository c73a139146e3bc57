//! Handler traits for tools and resources.
//!
//! Handlers support both synchronous and asynchronous execution:
//!
//! - **Sync handlers**: implement `call()` or `read()` directly
//! - **Async handlers**: override `call_async()` or `read_async()`
//!
//! The router always calls the async variants, which by default delegate to
//! the sync versions.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use sensormcp_core::McpResult;
use sensormcp_device::{ActivityLog, Device, SensorEngine};
use sensormcp_protocol::{Content, Resource, ResourceContent, Tool};

/// A boxed future for async handler results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What every handler can reach: the device, the acquisition engine and the
/// activity log.
#[derive(Clone)]
pub struct DeviceContext {
    device: Arc<Device>,
    engine: Arc<SensorEngine>,
    activity: ActivityLog,
}

impl DeviceContext {
    /// Creates a handler context.
    #[must_use]
    pub fn new(device: Arc<Device>, engine: Arc<SensorEngine>, activity: ActivityLog) -> Self {
        Self {
            device,
            engine,
            activity,
        }
    }

    /// The device component.
    #[must_use]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// The acquisition engine.
    #[must_use]
    pub fn engine(&self) -> &Arc<SensorEngine> {
        &self.engine
    }

    /// The activity log.
    #[must_use]
    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }
}

impl std::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("device", &self.device.identity().device_id)
            .field("hardware", &self.engine.has_hardware())
            .finish_non_exhaustive()
    }
}

/// Handler for a tool.
pub trait ToolHandler: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> Tool;

    /// Calls the tool synchronously with the given arguments.
    fn call(&self, ctx: &DeviceContext, arguments: serde_json::Value) -> McpResult<Vec<Content>>;

    /// Calls the tool asynchronously.
    ///
    /// Override this for tools that wait on the hardware. The default
    /// delegates to [`call`](Self::call).
    fn call_async<'a>(
        &'a self,
        ctx: &'a DeviceContext,
        arguments: serde_json::Value,
    ) -> BoxFuture<'a, McpResult<Vec<Content>>> {
        Box::pin(async move { self.call(ctx, arguments) })
    }
}

/// Handler for a resource.
pub trait ResourceHandler: Send + Sync {
    /// Returns the resource definition.
    fn definition(&self) -> Resource;

    /// Reads the resource content synchronously.
    fn read(&self, ctx: &DeviceContext) -> McpResult<Vec<ResourceContent>>;

    /// Reads the resource content asynchronously.
    ///
    /// The default delegates to [`read`](Self::read).
    fn read_async<'a>(
        &'a self,
        ctx: &'a DeviceContext,
    ) -> BoxFuture<'a, McpResult<Vec<ResourceContent>>> {
        Box::pin(async move { self.read(ctx) })
    }
}

/// A boxed tool handler.
pub type BoxedToolHandler = Box<dyn ToolHandler>;

/// A boxed resource handler.
pub type BoxedResourceHandler = Box<dyn ResourceHandler>;
