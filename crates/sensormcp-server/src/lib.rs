//! MCP server for the environmental sensor.
//!
//! This crate provides the server side of the protocol:
//! - Server builder and configuration
//! - The device's fixed resource and tool catalog
//! - Request routing and dispatching
//! - Session management
//! - The run loop: one task per request, responses in completion order
//!
//! # Example
//!
//! ```ignore
//! use sensormcp_server::{Server, ServerConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let reason = Server::new("sensormcp", "0.1.0")
//!         .config(&ServerConfig::default())
//!         .device_catalog()
//!         .build()
//!         .run_stdio()
//!         .await;
//!     eprintln!("stopped: {reason}");
//! }
//! ```

#![forbid(unsafe_code)]

mod builder;
mod catalog;
mod config;
mod handler;
mod router;
mod session;

#[cfg(test)]
mod tests;

pub use builder::ServerBuilder;
pub use catalog::{DEVICE_INFO_URI, NETWORK_STATUS_URI, SENSOR_DATA_URI};
pub use config::{
    DEFAULT_BAUD_RATE, DEFAULT_SENSOR_TIMEOUT_MS, DEFAULT_SHUTDOWN_GRACE_MS,
    DEFAULT_TICK_INTERVAL_MS, ServerConfig,
};
pub use handler::{BoxFuture, DeviceContext, ResourceHandler, ToolHandler};
pub use router::Router;
pub use session::Session;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::Level;
use sensormcp_core::logging::{debug, error, info, targets, warn};
use sensormcp_core::{McpError, McpResult};
use sensormcp_device::{BackgroundTick, TickConfig};
use sensormcp_protocol::{
    CallToolParams, CancelledParams, Envelope, InitializeParams, JsonRpcRequest, JsonRpcResponse,
    LogLevel, LogMessageParams, ReadResourceParams, RequestId, Resource, ServerCapabilities,
    ServerInfo, Tool,
};
use sensormcp_transport::{LineReader, ResponseEmitter};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle, JoinSet};

/// Logging configuration for the server.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level (default: INFO).
    pub level: Level,
    /// Show timestamps in logs (default: true).
    pub timestamps: bool,
    /// Show module targets in logs (default: true).
    pub targets: bool,
    /// Show file:line in logs (default: false).
    pub file_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            timestamps: true,
            targets: true,
            file_line: false,
        }
    }
}

impl LoggingConfig {
    /// Create logging config from environment variables.
    ///
    /// Respects:
    /// - `SENSORMCP_LOG`: Log level (error, warn, info, debug, trace)
    /// - `SENSORMCP_LOG_TIMESTAMPS`: Show timestamps (0/false to disable)
    /// - `SENSORMCP_LOG_TARGETS`: Show targets (0/false to disable)
    /// - `SENSORMCP_LOG_FILE_LINE`: Show file:line (1/true to enable)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup("SENSORMCP_LOG")
            .and_then(|s| parse_level(&s))
            .unwrap_or(Level::Info);

        let timestamps = lookup("SENSORMCP_LOG_TIMESTAMPS")
            .map(|s| !matches!(s.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        let targets = lookup("SENSORMCP_LOG_TARGETS")
            .map(|s| !matches!(s.to_lowercase().as_str(), "0" | "false" | "no"))
            .unwrap_or(true);

        let file_line = lookup("SENSORMCP_LOG_FILE_LINE")
            .map(|s| matches!(s.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            level,
            timestamps,
            targets,
            file_line,
        }
    }
}

/// Parses a level name as accepted by `SENSORMCP_LOG`.
#[must_use]
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_lowercase().as_str() {
        "error" => Some(Level::Error),
        "warn" | "warning" => Some(Level::Warn),
        "info" => Some(Level::Info),
        "debug" => Some(Level::Debug),
        "trace" => Some(Level::Trace),
        _ => None,
    }
}

/// Why the run loop stopped. Every reason maps to exit status 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The input stream ended.
    EndOfInput,
    /// A `shutdown` request was answered.
    Shutdown,
    /// An `exit` notification arrived.
    Exit,
    /// The process was interrupted.
    Interrupted,
    /// The input stream failed.
    TransportFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            StopReason::EndOfInput => "end of input",
            StopReason::Shutdown => "shutdown",
            StopReason::Exit => "exit",
            StopReason::Interrupted => "interrupted",
            StopReason::TransportFailed => "transport failed",
        };
        f.write_str(text)
    }
}

/// The sensor MCP server.
///
/// Built with [`ServerBuilder`]; consumed by one of the `run` methods.
pub struct Server {
    info: ServerInfo,
    capabilities: ServerCapabilities,
    router: Router,
    instructions: Option<String>,
    context: DeviceContext,
    shutdown_grace: Duration,
    tick: Option<TickConfig>,
    announce: bool,
}

impl Server {
    /// Creates a new server builder.
    #[must_use]
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> ServerBuilder {
        ServerBuilder::new(name, version)
    }

    /// Returns the server info.
    #[must_use]
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Returns the server capabilities.
    #[must_use]
    pub fn capabilities(&self) -> &ServerCapabilities {
        &self.capabilities
    }

    /// Lists registered tools.
    #[must_use]
    pub fn tools(&self) -> Vec<Tool> {
        self.router.tools()
    }

    /// Lists registered resources.
    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        self.router.resources()
    }

    /// The handler context shared by every request.
    #[must_use]
    pub fn context(&self) -> &DeviceContext {
        &self.context
    }

    /// Runs on stdin/stdout until end of input, `shutdown`, `exit` or Ctrl-C.
    pub async fn run_stdio(self) -> StopReason {
        let interrupt = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(target: targets::SERVER, "Cannot listen for interrupts: {}", e);
                std::future::pending::<()>().await;
            }
            info!(target: targets::SERVER, "Interrupt received");
        };
        self.run_transport(LineReader::stdin(), ResponseEmitter::stdout(), interrupt)
            .await
    }

    /// Runs over an arbitrary byte stream pair.
    pub async fn run<R, W>(self, reader: R, writer: W) -> StopReason
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.run_transport(
            LineReader::new(reader),
            ResponseEmitter::new(writer),
            std::future::pending(),
        )
        .await
    }

    /// Shared server loop.
    ///
    /// Each request runs as its own task so that a pending acquisition never
    /// blocks reading and classifying the next line. Notifications and
    /// malformed lines are handled inline.
    pub async fn run_transport<R, W, F>(
        self,
        mut reader: LineReader<R>,
        emitter: ResponseEmitter<W>,
        interrupt: F,
    ) -> StopReason
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
        F: Future<Output = ()>,
    {
        let state = Arc::new(ServerState {
            session: Mutex::new(Session::new(self.info.clone(), self.capabilities.clone())),
            router: self.router,
            instructions: self.instructions,
            context: self.context,
            shutdown_grace: self.shutdown_grace,
            stop: StopSignal::default(),
        });

        let ticker = self.tick.map(|config| {
            BackgroundTick::spawn(
                Arc::clone(state.context.device()),
                Arc::clone(state.context.engine()),
                config,
            )
        });

        info!(
            target: targets::SERVER,
            "{} v{} started ({})",
            self.info.name,
            self.info.version,
            if state.context.engine().has_hardware() { "hardware" } else { "simulated" }
        );
        state.context.activity().record(&format!(
            "server started: {} v{}",
            self.info.name, self.info.version
        ));
        if self.announce {
            announce_ready(&emitter, &self.info).await;
        }

        let mut tasks: JoinSet<()> = JoinSet::new();
        tokio::pin!(interrupt);

        let reason = loop {
            tokio::select! {
                biased;
                () = &mut interrupt => break StopReason::Interrupted,
                reason = state.stop.wait() => break reason,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
                line = reader.next_line() => match line {
                    Ok(Some(line)) => {
                        if let Some(reason) = handle_line(&state, &emitter, &mut tasks, &line).await {
                            break reason;
                        }
                    }
                    Ok(None) => break StopReason::EndOfInput,
                    Err(e) if e.is_recoverable() => {
                        warn!(target: targets::TRANSPORT, "Dropping input line: {}", e);
                        send(&emitter, JsonRpcResponse::error(None, McpError::parse_error())).await;
                    }
                    Err(e) => {
                        error!(target: targets::TRANSPORT, "Input stream failed: {}", e);
                        break StopReason::TransportFailed;
                    }
                },
            }
        };

        if reason == StopReason::EndOfInput {
            // Requests already read still get their responses.
            loop {
                tokio::select! {
                    () = &mut interrupt => {
                        tasks.abort_all();
                        break;
                    }
                    joined = tasks.join_next() => match joined {
                        Some(joined) => log_join(joined),
                        None => break,
                    },
                }
            }
        } else {
            tasks.abort_all();
        }
        while tasks.join_next().await.is_some() {}

        if let Some(ticker) = ticker {
            ticker.stop();
        }
        state.context.engine().shutdown();
        state
            .context
            .activity()
            .record(&format!("server stopped: {reason}"));
        if let Err(e) = emitter.flush().await {
            debug!(target: targets::TRANSPORT, "Final flush failed: {}", e);
        }
        info!(target: targets::SERVER, "Server stopped ({})", reason);
        reason
    }
}

/// State shared between the run loop and request tasks.
struct ServerState {
    session: Mutex<Session>,
    router: Router,
    instructions: Option<String>,
    context: DeviceContext,
    shutdown_grace: Duration,
    stop: StopSignal,
}

impl ServerState {
    /// Dispatches a request to the appropriate handler.
    async fn dispatch(&self, method: &str, params: Option<Value>) -> McpResult<Value> {
        match method {
            "initialize" => {
                let params: InitializeParams = parse_params_or_default(params)?;
                let result = {
                    let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
                    self.router.handle_initialize(
                        &mut session,
                        params,
                        self.instructions.as_deref(),
                    )?
                };
                Ok(serde_json::to_value(result)?)
            }
            "shutdown" => {
                info!(target: targets::SERVER, "Shutdown requested");
                Ok(serde_json::json!({}))
            }
            "resources/list" => Ok(serde_json::to_value(self.router.handle_resources_list()?)?),
            "resources/read" => {
                let params: ReadResourceParams = parse_params_or_default(params)?;
                let result = self
                    .router
                    .handle_resources_read(&self.context, params)
                    .await?;
                Ok(serde_json::to_value(result)?)
            }
            "tools/list" => Ok(serde_json::to_value(self.router.handle_tools_list()?)?),
            "tools/call" => {
                let params: CallToolParams = parse_params_or_default(params)?;
                let result = self.router.handle_tools_call(&self.context, params).await?;
                Ok(serde_json::to_value(result)?)
            }
            // Probes for optional methods get an empty success rather than
            // an error so callers never stall on them.
            _ => {
                debug!(
                    target: targets::ROUTER,
                    "Unknown method '{}', answering with empty result",
                    method
                );
                Ok(serde_json::json!({}))
            }
        }
    }

    /// Handles a notification. Returns a stop reason for `exit`.
    fn handle_notification(&self, method: &str, params: Option<Value>) -> Option<StopReason> {
        match method {
            "notifications/initialized" | "initialized" => {
                self.session
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .mark_client_ready();
                info!(target: targets::SESSION, "Client initialized");
                None
            }
            "notifications/cancelled" => {
                match params.and_then(|p| serde_json::from_value::<CancelledParams>(p).ok()) {
                    Some(params) => info!(
                        target: targets::SESSION,
                        "Peer cancelled requestId={} (reason: {}); requests always run to completion",
                        params.request_id,
                        params.reason.as_deref().unwrap_or("unspecified")
                    ),
                    None => debug!(target: targets::SESSION, "Ignoring malformed cancellation"),
                }
                None
            }
            "exit" => {
                info!(target: targets::SERVER, "Exit notification received");
                Some(StopReason::Exit)
            }
            other => {
                debug!(target: targets::ROUTER, "Ignoring notification '{}'", other);
                None
            }
        }
    }
}

/// Set once by whichever path decides the server should stop.
#[derive(Default)]
struct StopSignal {
    reason: Mutex<Option<StopReason>>,
    notify: Notify,
}

impl StopSignal {
    fn request(&self, reason: StopReason) {
        let mut slot = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(reason);
        }
        drop(slot);
        self.notify.notify_one();
    }

    fn requested(&self) -> Option<StopReason> {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn wait(&self) -> StopReason {
        loop {
            if let Some(reason) = self.requested() {
                return reason;
            }
            self.notify.notified().await;
        }
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Classifies one line and routes it. Returns a stop reason for `exit`.
async fn handle_line<W>(
    state: &Arc<ServerState>,
    emitter: &ResponseEmitter<W>,
    tasks: &mut JoinSet<()>,
    line: &str,
) -> Option<StopReason>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    match Envelope::classify(line) {
        Envelope::Request { id, method, params } => {
            tasks.spawn(serve_request(
                Arc::clone(state),
                emitter.clone(),
                id,
                method,
                params,
            ));
            None
        }
        Envelope::Notification { method, params } => state.handle_notification(&method, params),
        Envelope::Malformed { id, error } => {
            debug!(target: targets::SERVER, "Rejecting line: {}", error);
            send(emitter, JsonRpcResponse::error(id, error)).await;
            None
        }
    }
}

/// Runs one request to completion and emits exactly one response.
///
/// The handler runs in its own task so a panic becomes an `InternalError`
/// for this id instead of taking the loop down.
async fn serve_request<W>(
    state: Arc<ServerState>,
    emitter: ResponseEmitter<W>,
    id: RequestId,
    method: String,
    params: Option<Value>,
) where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let is_shutdown = method == "shutdown";
    let mut handler = AbortOnDrop(tokio::spawn({
        let state = Arc::clone(&state);
        let method = method.clone();
        async move { state.dispatch(&method, params).await }
    }));

    let result = match (&mut handler.0).await {
        Ok(result) => result,
        Err(e) => Err(join_failure(&method, &e)),
    };
    let response = match result {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => {
            debug!(target: targets::HANDLER, "Request '{}' failed: {}", method, e);
            JsonRpcResponse::error(Some(id), e)
        }
    };
    send(&emitter, response).await;

    if is_shutdown {
        tokio::time::sleep(state.shutdown_grace).await;
        state.stop.request(StopReason::Shutdown);
    }
}

fn join_failure(method: &str, e: &JoinError) -> McpError {
    if e.is_panic() {
        error!(target: targets::HANDLER, "Handler for '{}' panicked", method);
    } else {
        error!(target: targets::HANDLER, "Handler for '{}' was cancelled", method);
    }
    McpError::internal_error("Internal error")
}

async fn send<W>(emitter: &ResponseEmitter<W>, response: JsonRpcResponse)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    if let Err(e) = emitter.send_response(&response).await {
        error!(target: targets::TRANSPORT, "Failed to send response: {}", e);
    }
}

async fn announce_ready<W>(emitter: &ResponseEmitter<W>, info: &ServerInfo)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let params = LogMessageParams {
        level: LogLevel::Info,
        logger: Some("sensormcp".to_string()),
        data: Value::String(format!("{} v{} ready", info.name, info.version)),
    };
    let notification =
        JsonRpcRequest::notification("notifications/message", serde_json::to_value(params).ok());
    if let Err(e) = emitter.send_notification(&notification).await {
        warn!(target: targets::TRANSPORT, "Failed to announce startup: {}", e);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if matches!(&joined, Err(e) if e.is_panic()) {
        error!(target: targets::SERVER, "Request task panicked");
    }
}

/// Parses optional parameters from JSON, using default if not provided.
fn parse_params_or_default<T: serde::de::DeserializeOwned + Default>(
    params: Option<Value>,
) -> Result<T, McpError> {
    match params {
        Some(value) => {
            serde_json::from_value(value).map_err(|e| McpError::invalid_params(e.to_string()))
        }
        None => Ok(T::default()),
    }
}
