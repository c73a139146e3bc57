//! Core types shared by every sensormcp crate.
//!
//! This crate provides:
//! - [`McpError`] and [`McpErrorCode`], the protocol-visible error taxonomy
//! - The [`logging`] facade with hierarchical log targets
//!
//! Nothing here performs I/O; higher crates decide where errors and log
//! records end up.

#![forbid(unsafe_code)]

mod error;
pub mod logging;

pub use error::{McpError, McpErrorCode, McpResult};
