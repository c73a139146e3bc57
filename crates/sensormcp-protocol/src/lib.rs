//! MCP protocol types and JSON-RPC implementation.
//!
//! This crate provides:
//! - JSON-RPC 2.0 message types
//! - The validated [`Envelope`] union every inbound line is classified into
//! - MCP catalog types (tools, resources, content)
//! - Per-method params and results
//!
//! # Wire Format
//!
//! All messages are newline-delimited JSON (NDJSON): one message per line,
//! never split and never coalesced.

#![forbid(unsafe_code)]

mod envelope;
mod jsonrpc;
mod messages;
mod types;

pub use envelope::Envelope;
pub use jsonrpc::{JSONRPC_VERSION, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use messages::*;
pub use types::*;
