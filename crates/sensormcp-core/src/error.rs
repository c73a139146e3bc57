//! Protocol-visible error types.
//!
//! Every failure that reaches the wire is an [`McpError`] carrying one of the
//! JSON-RPC 2.0 error codes below. Internal detail stays in the log; the
//! message is the only text the peer ever sees.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC error codes used by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum McpErrorCode {
    /// The line is not valid JSON.
    ParseError,
    /// The envelope is missing the version tag or the method.
    InvalidRequest,
    /// A tool name is not in the catalog.
    MethodNotFound,
    /// A required parameter is missing or names an unknown resource.
    InvalidParams,
    /// A handler failed unexpectedly.
    InternalError,
}

impl McpErrorCode {
    /// Returns the numeric JSON-RPC code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            McpErrorCode::ParseError => -32700,
            McpErrorCode::InvalidRequest => -32600,
            McpErrorCode::MethodNotFound => -32601,
            McpErrorCode::InvalidParams => -32602,
            McpErrorCode::InternalError => -32603,
        }
    }
}

impl From<McpErrorCode> for i32 {
    fn from(code: McpErrorCode) -> Self {
        code.code()
    }
}

impl TryFrom<i32> for McpErrorCode {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            -32700 => Ok(McpErrorCode::ParseError),
            -32600 => Ok(McpErrorCode::InvalidRequest),
            -32601 => Ok(McpErrorCode::MethodNotFound),
            -32602 => Ok(McpErrorCode::InvalidParams),
            -32603 => Ok(McpErrorCode::InternalError),
            other => Err(other),
        }
    }
}

/// An error that is reported to the peer as a JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message} ({code:?})")]
pub struct McpError {
    /// Error code.
    pub code: McpErrorCode,
    /// Human-readable message.
    pub message: String,
    /// Optional structured detail.
    pub data: Option<Value>,
}

impl McpError {
    /// Creates an error with the given code and message.
    #[must_use]
    pub fn new(code: McpErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attaches structured detail.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The line could not be parsed as JSON.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(McpErrorCode::ParseError, "Parse error")
    }

    /// The envelope is structurally invalid.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidRequest, message)
    }

    /// A named tool does not exist.
    #[must_use]
    pub fn method_not_found(name: &str) -> Self {
        Self::new(McpErrorCode::MethodNotFound, format!("Method not found: {name}"))
    }

    /// A parameter is missing or invalid.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InvalidParams, message)
    }

    /// A handler failed.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(McpErrorCode::InternalError, message)
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::internal_error(format!("Serialization failed: {err}"))
    }
}

/// Result alias for handler code.
pub type McpResult<T> = Result<T, McpError>;
