//! The broker's outer MCP server.
//!
//! This module implements the outer server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: Graceful connection termination
//!
//! # Lifecycle Flow
//!
//! ```text
//! Client                     Broker                       Agent
//!   │                          │                            │
//!   ├─── initialize ──────────▶│                            │
//!   │◀── initialize result ────┤                            │
//!   ├─── initialized ─────────▶│                            │
//!   │                          │                            │
//!   ├─── tools/list ──────────▶│── ensure + list_tools ───▶│
//!   │◀── translated tools ─────┤◀───────────────────────────┤
//!   │                          │                            │
//!   ├─── tools/call ──────────▶│── ensure + invoke_tool ──▶│
//!   │◀── call result ──────────┤◀───────────────────────────┤
//!   │                          │                            │
//!   ├─── (close stdin) ───────▶│ close agent connection     │
//!   │                          │ exit                       │
//! ```
//!
//! Tool definitions are not hard-coded: they come from the host's
//! catalog through the [`ToolSurface`], so the advertised surface
//! follows whatever the host currently exposes.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::broker::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId, MCP_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::broker::reconnect::ReconnectController;
use crate::broker::surface::{ToolCallResult, ToolSurface};
use crate::broker::transport::StdioTransport;

/// Server state in the outer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session. True here:
    /// the surface grows when the host reloads with new tools.
    #[serde(rename = "listChanged")]
    pub list_changed: bool,
}

impl Default for ToolCapabilities {
    fn default() -> Self {
        Self { list_changed: true }
    }
}

/// Server information for the initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// The outer MCP server.
pub struct BrokerServer {
    /// Current server state.
    state: ServerState,
    /// The stdio transport.
    transport: StdioTransport,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// The connection state machine towards the agent.
    controller: ReconnectController,
    /// The dynamic tool surface.
    surface: ToolSurface,
}

impl BrokerServer {
    /// Creates a broker server.
    #[must_use]
    pub fn new(controller: ReconnectController, surface: ToolSurface) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport: StdioTransport::new(),
            protocol_version: None,
            controller,
            surface,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Runs the outer server main loop until the client closes stdin.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        loop {
            let Some(line) = self.transport.read_line().await? else {
                self.state = ServerState::ShuttingDown;
                break;
            };

            if line.trim().is_empty() {
                continue;
            }

            self.handle_line(&line).await?;

            if self.state == ServerState::ShuttingDown {
                break;
            }
        }

        // Cancels every pending waiter with a connection-closed error.
        self.controller.disconnect().await;
        Ok(())
    }

    /// Handles a single line of input.
    async fn handle_line(&mut self, line: &str) -> std::io::Result<()> {
        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => self.transport.write_error(&error).await,
        }
    }

    /// Handles a parsed incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) -> std::io::Result<()> {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                Ok(())
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req).await,
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => self.transport.write_response(&resp).await,
            Err(error) => self.transport.write_error(&error).await,
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            self.state = ServerState::Running;
        }
        // All other notifications (including unknown ones) are ignored.
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let _params: InitializeParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid initialize params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing initialize params")
            })?;

        // One supported version; a client that cannot speak it will
        // disconnect.
        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();
        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    ///
    /// An unreachable host yields an empty list rather than an error,
    /// so the outer session can start before the host does; the
    /// `listChanged` capability covers the later appearance.
    async fn handle_tools_list(
        &mut self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        match self.controller.ensure_connection(false).await {
            Ok(connection) => {
                let _ = self.controller.take_needs_sync();
                if let Err(e) = self.surface.sync(&connection).await {
                    warn!(error = %e, "Tool catalog fetch failed");
                }
            }
            Err(e) => {
                warn!(error = %e, "Host unreachable; advertising cached tools");
            }
        }

        let result = json!({
            "tools": self.surface.definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &mut self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = req
            .params
            .as_ref()
            .map(|p| serde_json::from_value(p.clone()))
            .transpose()
            .map_err(|e| {
                JsonRpcError::invalid_params(
                    req.id.clone(),
                    format!("Invalid tool call params: {e}"),
                )
            })?
            .ok_or_else(|| {
                JsonRpcError::invalid_params(req.id.clone(), "Missing tool call params")
            })?;

        let arguments = if params.arguments.is_null() {
            json!({})
        } else {
            params.arguments
        };

        // A name we have not registered can still be valid: the host
        // may have grown tools since our last sync. The agent is the
        // authority; its unknown-tool error comes back as a result.
        debug!(tool = %params.name, "Proxying tool call to agent");
        let result = self
            .surface
            .invoke(&mut self.controller, &params.name, &arguments)
            .await;

        Self::respond_with_result(&req.id, &result)
    }

    /// Handles the ping request. Allowed in any state.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }

    fn respond_with_result(
        id: &RequestId,
        result: &ToolCallResult,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let value = serde_json::to_value(result)
            .map_err(|e| JsonRpcError::internal_error(id.clone(), e.to_string()))?;
        Ok(JsonRpcResponse::success(id.clone(), value))
    }
}
