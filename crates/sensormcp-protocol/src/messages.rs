//! MCP protocol messages.
//!
//! Params and results for the methods the server answers.

use serde::{Deserialize, Serialize};

use crate::types::{
    ClientCapabilities, ClientInfo, Content, LogLevel, Resource, ResourceContent,
    ServerCapabilities, ServerInfo, Tool,
};

// ============================================================================
// Initialize
// ============================================================================

/// Initialize request params. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Protocol version requested.
    #[serde(rename = "protocolVersion", default)]
    pub protocol_version: Option<String>,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Option<ClientCapabilities>,
    /// Client info.
    #[serde(rename = "clientInfo", default)]
    pub client_info: Option<ClientInfo>,
}

/// Initialize response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeResult {
    /// Protocol version accepted.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
    /// Server info.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Optional instructions for the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

// ============================================================================
// Tools
// ============================================================================

/// tools/list response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListToolsResult {
    /// List of available tools.
    pub tools: Vec<Tool>,
}

/// tools/call request params.
///
/// `name` is optional here so that its absence is reported as
/// `InvalidParams` by the handler rather than as a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name to call.
    #[serde(default)]
    pub name: Option<String>,
    /// Tool arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<serde_json::Value>,
}

/// tools/call response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolResult {
    /// Tool output content.
    pub content: Vec<Content>,
    /// Whether the tool call errored.
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

// ============================================================================
// Resources
// ============================================================================

/// resources/list response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResourcesResult {
    /// List of available resources.
    pub resources: Vec<Resource>,
}

/// resources/read request params.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadResourceParams {
    /// Resource URI to read.
    #[serde(default)]
    pub uri: Option<String>,
}

/// resources/read response result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadResourceResult {
    /// Resource contents.
    pub contents: Vec<ResourceContent>,
}

// ============================================================================
// Notifications
// ============================================================================

/// notifications/message params (server-initiated log line).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageParams {
    /// Severity.
    pub level: LogLevel,
    /// Logger name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Message payload.
    pub data: serde_json::Value,
}

/// notifications/cancelled params.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelledParams {
    /// The id of the request the peer gave up on.
    #[serde(rename = "requestId")]
    pub request_id: serde_json::Value,
    /// Optional reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
