//! MCP session state.

use sensormcp_protocol::{ClientCapabilities, ClientInfo, ServerCapabilities, ServerInfo};

/// The one session between the peer and this server.
///
/// Records what the client declared during `initialize`. Requests are never
/// gated on it: a peer that skips the handshake is still served.
#[derive(Debug)]
pub struct Session {
    /// Whether `initialize` has been answered.
    initialized: bool,
    /// Whether the client sent its `initialized` notification.
    client_ready: bool,
    /// Client info from initialization.
    client_info: Option<ClientInfo>,
    /// Client capabilities from initialization.
    client_capabilities: Option<ClientCapabilities>,
    /// Server info.
    server_info: ServerInfo,
    /// Server capabilities.
    server_capabilities: ServerCapabilities,
    /// Negotiated protocol version.
    protocol_version: Option<String>,
}

impl Session {
    /// Creates a new uninitialized session.
    #[must_use]
    pub fn new(server_info: ServerInfo, server_capabilities: ServerCapabilities) -> Self {
        Self {
            initialized: false,
            client_ready: false,
            client_info: None,
            client_capabilities: None,
            server_info,
            server_capabilities,
            protocol_version: None,
        }
    }

    /// Returns whether the session has been initialized.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Returns whether the client acknowledged initialization.
    #[must_use]
    pub fn is_client_ready(&self) -> bool {
        self.client_ready
    }

    /// Initializes the session with client info.
    ///
    /// A second `initialize` replaces what the first recorded.
    pub fn initialize(
        &mut self,
        client_info: Option<ClientInfo>,
        client_capabilities: Option<ClientCapabilities>,
        protocol_version: String,
    ) {
        self.client_info = client_info;
        self.client_capabilities = client_capabilities;
        self.protocol_version = Some(protocol_version);
        self.initialized = true;
    }

    /// Marks the client as ready.
    pub fn mark_client_ready(&mut self) {
        self.client_ready = true;
    }

    /// Returns the client info if the client sent any.
    #[must_use]
    pub fn client_info(&self) -> Option<&ClientInfo> {
        self.client_info.as_ref()
    }

    /// Returns the client capabilities if the client sent any.
    #[must_use]
    pub fn client_capabilities(&self) -> Option<&ClientCapabilities> {
        self.client_capabilities.as_ref()
    }

    /// Returns the server info.
    #[must_use]
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    /// Returns the server capabilities.
    #[must_use]
    pub fn server_capabilities(&self) -> &ServerCapabilities {
        &self.server_capabilities
    }

    /// Returns the negotiated protocol version.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }
}
