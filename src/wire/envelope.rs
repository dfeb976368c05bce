//! Request and response envelope types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of commands the agent understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Liveness probe; never touches the host main loop.
    Ping,
    /// Fetch the versioned tool catalog.
    ListTools,
    /// Invoke a named tool with a JSON-string argument payload.
    InvokeTool,
}

impl Command {
    /// Parses a wire command name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ping" => Some(Self::Ping),
            "list_tools" => Some(Self::ListTools),
            "invoke_tool" => Some(Self::InvokeTool),
            _ => None,
        }
    }

    /// Returns the wire name of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::ListTools => "list_tools",
            Self::InvokeTool => "invoke_tool",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request envelope.
///
/// `id` is an opaque string, unique per in-flight request on one
/// connection. `params` is either empty or a JSON string that the
/// target re-parses against its own schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Opaque request identifier, echoed back in the response.
    pub id: String,

    /// Command name (`ping`, `list_tools`, `invoke_tool`).
    pub cmd: String,

    /// Double-encoded parameter payload, empty when absent.
    #[serde(default)]
    pub params: String,
}

impl RequestEnvelope {
    /// Creates a request envelope.
    #[must_use]
    pub fn new(id: impl Into<String>, cmd: Command, params: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cmd: cmd.as_str().to_string(),
            params: params.into(),
        }
    }

    /// Returns the parsed command, if the name is known.
    #[must_use]
    pub fn command(&self) -> Option<Command> {
        Command::parse(&self.cmd)
    }
}

/// A response envelope.
///
/// Exactly one of `data` / `error` is meaningful, consistent with `ok`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// The echoed request identifier.
    pub id: String,

    /// Outcome flag.
    pub ok: bool,

    /// Double-encoded result payload (populated when `ok` is true).
    #[serde(default)]
    pub data: String,

    /// Human-readable error message (populated when `ok` is false).
    #[serde(default)]
    pub error: String,
}

impl ResponseEnvelope {
    /// Creates a success response carrying a JSON-string payload.
    #[must_use]
    pub fn success(id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            data: data.into(),
            error: String::new(),
        }
    }

    /// Creates a failure response carrying an error message.
    #[must_use]
    pub fn failure(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            data: String::new(),
            error: error.into(),
        }
    }
}
