//! Request router for the sensor server.
//!
//! Handlers are kept in registration order so that `tools/list` and
//! `resources/list` are stable across calls.

use sensormcp_core::logging::{debug, targets, trace};
use sensormcp_core::{McpError, McpResult};
use sensormcp_protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, ListResourcesResult,
    ListToolsResult, PROTOCOL_VERSION, ReadResourceParams, ReadResourceResult, Resource, Tool,
};

use crate::Session;
use crate::handler::{
    BoxedResourceHandler, BoxedToolHandler, DeviceContext, ResourceHandler, ToolHandler,
};

/// Routes MCP requests to the appropriate handlers.
#[derive(Default)]
pub struct Router {
    tools: Vec<(String, BoxedToolHandler)>,
    resources: Vec<(String, BoxedResourceHandler)>,
}

impl Router {
    /// Creates a new empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool handler. A tool with the same name is replaced in place.
    pub fn add_tool<H: ToolHandler + 'static>(&mut self, handler: H) {
        let name = handler.definition().name;
        let boxed: BoxedToolHandler = Box::new(handler);
        match self.tools.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = boxed,
            None => self.tools.push((name, boxed)),
        }
    }

    /// Adds a resource handler. A resource with the same URI is replaced in
    /// place.
    pub fn add_resource<H: ResourceHandler + 'static>(&mut self, handler: H) {
        let uri = handler.definition().uri;
        let boxed: BoxedResourceHandler = Box::new(handler);
        match self.resources.iter_mut().find(|(u, _)| *u == uri) {
            Some(slot) => slot.1 = boxed,
            None => self.resources.push((uri, boxed)),
        }
    }

    /// Returns all tool definitions.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.tools.iter().map(|(_, h)| h.definition()).collect()
    }

    /// Returns all resource definitions.
    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        self.resources.iter().map(|(_, h)| h.definition()).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn tools_count(&self) -> usize {
        self.tools.len()
    }

    /// Returns the number of registered resources.
    #[must_use]
    pub fn resources_count(&self) -> usize {
        self.resources.len()
    }

    /// Gets a tool handler by name.
    #[must_use]
    pub fn get_tool(&self, name: &str) -> Option<&BoxedToolHandler> {
        self.tools.iter().find(|(n, _)| n == name).map(|(_, h)| h)
    }

    /// Gets a resource handler by URI.
    #[must_use]
    pub fn get_resource(&self, uri: &str) -> Option<&BoxedResourceHandler> {
        self.resources.iter().find(|(u, _)| u == uri).map(|(_, h)| h)
    }

    // ========================================================================
    // Request Dispatch Methods
    // ========================================================================

    /// Handles the initialize request.
    pub fn handle_initialize(
        &self,
        session: &mut Session,
        params: InitializeParams,
        instructions: Option<&str>,
    ) -> McpResult<InitializeResult> {
        let protocol_version = params
            .protocol_version
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| PROTOCOL_VERSION.to_string());
        debug!(
            target: targets::SESSION,
            "Initializing session with client: {:?}, protocol {}",
            params.client_info.as_ref().map(|c| &c.name),
            protocol_version
        );

        session.initialize(
            params.client_info,
            params.capabilities,
            protocol_version.clone(),
        );

        Ok(InitializeResult {
            protocol_version,
            capabilities: session.server_capabilities().clone(),
            server_info: session.server_info().clone(),
            instructions: instructions.map(String::from),
        })
    }

    /// Handles the tools/list request.
    pub fn handle_tools_list(&self) -> McpResult<ListToolsResult> {
        Ok(ListToolsResult {
            tools: self.tools(),
        })
    }

    /// Handles the tools/call request.
    ///
    /// A missing name is `InvalidParams`; a name outside the catalog is
    /// `MethodNotFound`.
    pub async fn handle_tools_call(
        &self,
        ctx: &DeviceContext,
        params: CallToolParams,
    ) -> McpResult<CallToolResult> {
        let name = params
            .name
            .ok_or_else(|| McpError::invalid_params("Missing tool name"))?;
        debug!(target: targets::HANDLER, "Calling tool: {}", name);

        let handler = self
            .get_tool(&name)
            .ok_or_else(|| McpError::method_not_found(&name))?;

        let arguments = params.arguments.unwrap_or_else(|| serde_json::json!({}));
        let content = handler.call_async(ctx, arguments).await?;
        trace!(target: targets::HANDLER, "Tool {} returned {} items", name, content.len());

        Ok(CallToolResult {
            content,
            is_error: false,
        })
    }

    /// Handles the resources/list request.
    pub fn handle_resources_list(&self) -> McpResult<ListResourcesResult> {
        Ok(ListResourcesResult {
            resources: self.resources(),
        })
    }

    /// Handles the resources/read request.
    ///
    /// A missing or unknown URI is `InvalidParams`.
    pub async fn handle_resources_read(
        &self,
        ctx: &DeviceContext,
        params: ReadResourceParams,
    ) -> McpResult<ReadResourceResult> {
        let uri = params
            .uri
            .ok_or_else(|| McpError::invalid_params("Missing resource uri"))?;
        debug!(target: targets::HANDLER, "Reading resource: {}", uri);

        let handler = self
            .get_resource(&uri)
            .ok_or_else(|| McpError::invalid_params(format!("Unknown resource: {uri}")))?;

        let contents = handler.read_async(ctx).await?;
        Ok(ReadResourceResult { contents })
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("tools", &self.tools.iter().map(|(n, _)| n).collect::<Vec<_>>())
            .field(
                "resources",
                &self.resources.iter().map(|(u, _)| u).collect::<Vec<_>>(),
            )
            .finish()
    }
}
