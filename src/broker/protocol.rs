//! JSON-RPC 2.0 message types for the outer framework transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP protocol version this broker targets.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name advertised during initialisation.
pub const SERVER_NAME: &str = "editor-bridge-mcp";

/// JSON-RPC error codes used by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received (-32700).
    ParseError,
    /// The JSON is not a valid request object (-32600).
    InvalidRequest,
    /// The method does not exist (-32601).
    MethodNotFound,
    /// Invalid method parameters (-32602).
    InvalidParams,
    /// Internal JSON-RPC error (-32603).
    InternalError,
}

impl ErrorCode {
    /// The numeric wire code.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// A JSON-RPC request id: number or string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric id.
    Number(i64),
    /// String id.
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// An incoming JSON-RPC request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Request id, echoed in the response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Method parameters, if any.
    #[serde(default)]
    pub params: Option<Value>,
}

/// An incoming JSON-RPC notification (no id, no response).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcNotification {
    /// Method name.
    pub method: String,
    /// Notification parameters, if any.
    #[serde(default)]
    pub params: Option<Value>,
}

/// A parsed incoming message.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A fire-and-forget notification.
    Notification(JsonRpcNotification),
}

/// A successful JSON-RPC response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// The echoed request id.
    pub id: RequestId,
    /// The result payload.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Creates a success response.
    #[must_use]
    pub const fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// The error member of an error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable message.
    pub message: String,
}

impl JsonRpcErrorData {
    /// Creates error data with a custom message.
    #[must_use]
    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }
}

/// A JSON-RPC error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// The request id, when one could be decoded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// The error payload.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Creates an error response.
    #[must_use]
    pub const fn new(id: Option<RequestId>, error: JsonRpcErrorData) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error,
        }
    }

    /// Invalid JSON (-32700).
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(
            None,
            JsonRpcErrorData::with_message(ErrorCode::ParseError, "Parse error"),
        )
    }

    /// Structurally invalid request (-32600).
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(
            id,
            JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Invalid request"),
        )
    }

    /// Unknown method (-32601).
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(
                ErrorCode::MethodNotFound,
                format!("Method not found: {method}"),
            ),
        )
    }

    /// Bad parameters (-32602).
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InvalidParams, message),
        )
    }

    /// Internal failure (-32603).
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(
            Some(id),
            JsonRpcErrorData::with_message(ErrorCode::InternalError, message),
        )
    }
}

/// Parses one line into a request or notification.
///
/// # Errors
///
/// Returns a ready-to-send [`JsonRpcError`] when the line is not valid
/// JSON, does not carry `"jsonrpc": "2.0"`, or is structurally wrong.
pub fn parse_message(line: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(line).map_err(|_| JsonRpcError::parse_error())?;

    let id = value
        .get("id")
        .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

    if value.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        return Err(JsonRpcError::invalid_request(id));
    }

    if value.get("id").is_some_and(|id| !id.is_null()) {
        let request: JsonRpcRequest =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(id))?;
        Ok(IncomingMessage::Request(request))
    } else {
        let notification: JsonRpcNotification =
            serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;
        Ok(IncomingMessage::Notification(notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_request_with_number_id() {
        let msg = parse_message(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        let IncomingMessage::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.id, RequestId::Number(1));
        assert_eq!(req.method, "tools/list");
    }

    #[test]
    fn parse_request_with_string_id() {
        let msg =
            parse_message(r#"{"jsonrpc":"2.0","id":"request-123","method":"ping"}"#).unwrap();
        let IncomingMessage::Request(req) = msg else {
            panic!("expected request");
        };
        assert_eq!(req.id, RequestId::String("request-123".to_string()));
    }

    #[test]
    fn parse_notification() {
        let msg =
            parse_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#).unwrap();
        assert!(matches!(msg, IncomingMessage::Notification(n) if n.method == "notifications/initialized"));
    }

    #[test]
    fn parse_invalid_json_is_parse_error() {
        let err = parse_message("not valid json").unwrap_err();
        assert_eq!(err.error.code, ErrorCode::ParseError.code());
    }

    #[test]
    fn missing_jsonrpc_version_is_invalid_request() {
        let err = parse_message(r#"{"id":1,"method":"test"}"#).unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
        assert_eq!(err.id, Some(RequestId::Number(1)));
    }

    #[test]
    fn wrong_jsonrpc_version_is_invalid_request() {
        let err = parse_message(r#"{"jsonrpc":"1.0","id":1,"method":"test"}"#).unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn error_codes_match_the_spec() {
        assert_eq!(JsonRpcError::parse_error().error.code, -32700);
        assert_eq!(JsonRpcError::invalid_request(None).error.code, -32600);
        assert_eq!(
            JsonRpcError::method_not_found(RequestId::Number(1), "m").error.code,
            -32601
        );
        assert_eq!(
            JsonRpcError::invalid_params(RequestId::Number(1), "m").error.code,
            -32602
        );
        assert_eq!(
            JsonRpcError::internal_error(RequestId::Number(1), "m").error.code,
            -32603
        );
    }

    #[test]
    fn success_response_serialises() {
        let resp =
            JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({"status":"ok"}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"result\""));
    }

    #[test]
    fn request_id_display() {
        assert_eq!(RequestId::Number(42).to_string(), "42");
        assert_eq!(RequestId::String("abc".to_string()).to_string(), "abc");
    }
}
