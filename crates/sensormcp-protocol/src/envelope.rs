//! Classification of inbound lines into validated envelopes.
//!
//! Downstream handlers only ever see a [`Envelope::Request`] or
//! [`Envelope::Notification`] with a non-empty method; shape checks happen
//! here, once.

use serde_json::{Map, Value};
use sensormcp_core::McpError;
use sensormcp_core::logging::{targets, trace};

use crate::jsonrpc::{JSONRPC_VERSION, RequestId};

/// One parsed protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// A message with an id; obligates exactly one response.
    Request {
        /// Caller-chosen id, echoed verbatim.
        id: RequestId,
        /// Method name (non-empty).
        method: String,
        /// Parameters, if any.
        params: Option<Value>,
    },
    /// A message without an id (or with a null id); never answered.
    Notification {
        /// Method name (non-empty).
        method: String,
        /// Parameters, if any.
        params: Option<Value>,
    },
    /// A line that failed parsing or validation.
    Malformed {
        /// The id, when it could be recovered.
        id: Option<RequestId>,
        /// The error to report.
        error: McpError,
    },
}

impl Envelope {
    /// Parses and classifies one line.
    #[must_use]
    pub fn classify(line: &str) -> Self {
        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                trace!(target: targets::CODEC, "Unparseable line: {}", e);
                return Envelope::Malformed {
                    id: None,
                    error: McpError::parse_error(),
                };
            }
        };

        let Value::Object(mut object) = value else {
            return malformed(None, "Request must be a JSON object");
        };

        let id = match object.get("id").map(RequestId::from_value) {
            None => None,
            Some(Ok(id)) => id,
            Some(Err(())) => return malformed(None, "Request id must be a number or string"),
        };

        if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return malformed(id, "Missing or unsupported jsonrpc version");
        }

        let method = match take_method(&mut object) {
            Some(method) => method,
            None => return malformed(id, "Missing method"),
        };

        let params = match object.remove("params") {
            None | Some(Value::Null) => None,
            Some(params) => Some(params),
        };

        match id {
            Some(id) => Envelope::Request { id, method, params },
            None => Envelope::Notification { method, params },
        }
    }

    /// Returns the method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Envelope::Request { method, .. } | Envelope::Notification { method, .. } => {
                Some(method)
            }
            Envelope::Malformed { .. } => None,
        }
    }
}

fn take_method(object: &mut Map<String, Value>) -> Option<String> {
    match object.remove("method") {
        Some(Value::String(method)) if !method.is_empty() => Some(method),
        _ => None,
    }
}

fn malformed(id: Option<RequestId>, message: &str) -> Envelope {
    Envelope::Malformed {
        id,
        error: McpError::invalid_request(message),
    }
}
