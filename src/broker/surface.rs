//! The dynamic tool surface: whatever the host exposes, re-advertised.
//!
//! On each fresh connection the broker fetches the agent's tool
//! catalog, translates every descriptor's parameter schema into the
//! outer framework's representation (preserving types, constraints,
//! defaults, optionality and descriptions) and registers an outer tool
//! whose handler proxies back to the inner `invoke_tool`. A cached
//! catalog version short-circuits resync after reloads that did not
//! change the tools. Registrations are never removed mid-session.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::broker::connection::{AgentConnection, ConnectionError};
use crate::broker::reconnect::ReconnectController;
use crate::schema::ToolDescriptor;

/// Settle delay before probing the host after a reload-triggering
/// call.
const RELOAD_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// A tool definition in the outer framework's shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,

    /// Structured form of the result, when the payload parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,

    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            structured_content: None,
            is_error: false,
        }
    }

    /// Creates a successful result from an inner `data` payload:
    /// structured content when it parses as JSON, verbatim text
    /// otherwise.
    #[must_use]
    pub fn from_payload(data: &str) -> Self {
        match serde_json::from_str::<Value>(data) {
            Ok(value) => Self {
                content: vec![ToolContent::Text {
                    text: value.to_string(),
                }],
                structured_content: Some(value),
                is_error: false,
            },
            Err(_) => Self::text(data),
        }
    }

    /// Creates an error text result.
    ///
    /// Tool errors are reported in the result, not as protocol errors.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            structured_content: None,
            is_error: true,
        }
    }

    /// Appends an advisory line to the result's content.
    pub fn add_advisory(&mut self, text: impl Into<String>) {
        self.content.push(ToolContent::Text { text: text.into() });
    }
}

/// The broker-side registry of outer tools.
pub struct ToolSurface {
    /// Last catalog version synced from the agent.
    cached_version: Option<u64>,

    /// Registered tools by name.
    tools: BTreeMap<String, ToolDefinition>,

    /// Patterns naming reload-triggering tools or menu paths.
    reload_triggers: Vec<glob::Pattern>,

    /// Per-request timeout for proxied invocations.
    request_timeout: Duration,
}

impl ToolSurface {
    /// Creates an empty surface.
    #[must_use]
    pub fn new(reload_triggers: Vec<glob::Pattern>, request_timeout: Duration) -> Self {
        Self {
            cached_version: None,
            tools: BTreeMap::new(),
            reload_triggers,
            request_timeout,
        }
    }

    /// Fetches the catalog and registers whatever is not yet
    /// registered. A no-op when the version is unchanged and at least
    /// one tool is already registered.
    ///
    /// Returns the number of newly registered tools.
    ///
    /// # Errors
    ///
    /// Returns an error if `list_tools` fails on the wire.
    pub async fn sync(&mut self, connection: &AgentConnection) -> Result<usize, ConnectionError> {
        let catalog = connection.list_tools(self.request_timeout).await?;

        if self.cached_version == Some(catalog.version) && !self.tools.is_empty() {
            debug!(version = catalog.version, "Tool catalog unchanged; skipping resync");
            return Ok(0);
        }

        let mut registered = 0;
        for descriptor in catalog.tools {
            if self.tools.contains_key(&descriptor.name) {
                continue;
            }
            match Self::translate(&descriptor) {
                Ok(definition) => {
                    self.tools.insert(descriptor.name.clone(), definition);
                    registered += 1;
                }
                Err(e) => {
                    warn!(tool = %descriptor.name, error = %e, "Skipping tool with bad schema");
                }
            }
        }

        self.cached_version = Some(catalog.version);
        if registered > 0 {
            info!(
                version = catalog.version,
                registered, "Registered tools from host catalog"
            );
        }
        Ok(registered)
    }

    /// Translates an inner descriptor into the outer representation.
    ///
    /// The schema survives as-is: the inner model is a draft-07 subset
    /// and the outer framework takes draft-07, so re-rendering the
    /// parsed schema preserves types, bounds, enums, defaults,
    /// required-set and descriptions.
    fn translate(
        descriptor: &ToolDescriptor,
    ) -> Result<ToolDefinition, crate::schema::SchemaError> {
        let schema = descriptor.parse_schema()?;
        Ok(ToolDefinition {
            name: descriptor.name.clone(),
            description: (!descriptor.description.is_empty())
                .then(|| descriptor.description.clone()),
            input_schema: schema.to_json_value(),
        })
    }

    /// The currently registered outer tool definitions.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().cloned().collect()
    }

    /// Whether a tool name is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Whether this invocation is expected to trigger a host reload:
    /// the tool name, or its `path` argument (menu items), matches a
    /// trigger pattern.
    #[must_use]
    pub fn is_reload_trigger(&self, name: &str, arguments: &Value) -> bool {
        let path = arguments.get("path").and_then(Value::as_str);
        self.reload_triggers.iter().any(|pattern| {
            pattern.matches(name) || path.is_some_and(|p| pattern.matches(p))
        })
    }

    /// Proxies one outer tool call to the agent.
    ///
    /// Ensures a connection first, unwraps the inner response, and for
    /// reload-triggering calls waits out the settle delay, re-runs the
    /// controller with `expecting_reload`, and appends an advisory
    /// describing whether the host came back.
    pub async fn invoke(
        &mut self,
        controller: &mut ReconnectController,
        name: &str,
        arguments: &Value,
    ) -> ToolCallResult {
        let connection = match controller.ensure_connection(false).await {
            Ok(connection) => connection,
            Err(e) => return ToolCallResult::error(e.to_string()),
        };
        if controller.take_needs_sync() {
            if let Err(e) = self.sync(&connection).await {
                warn!(error = %e, "Tool resync after reconnect failed");
            }
        }

        let triggers_reload = self.is_reload_trigger(name, arguments);

        let result = match connection
            .invoke_tool(name, &arguments.to_string(), self.request_timeout)
            .await
        {
            Ok(response) if response.ok => ToolCallResult::from_payload(&response.data),
            Ok(response) => ToolCallResult::error(response.error),
            Err(e) => ToolCallResult::error(format!("tool call failed: {e}")),
        };

        if !triggers_reload {
            return result;
        }

        let mut result = result;
        tokio::time::sleep(RELOAD_SETTLE_DELAY).await;
        match controller.ensure_connection(true).await {
            Ok(fresh) => {
                if controller.take_needs_sync() {
                    if let Err(e) = self.sync(&fresh).await {
                        warn!(error = %e, "Tool resync after reload failed");
                    }
                }
                result.add_advisory("Host reloaded and ready.");
            }
            Err(e) => {
                result.add_advisory(format!("Host may still be reloading: {e}"));
            }
        }
        result
    }
}

impl std::fmt::Debug for ToolSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSurface")
            .field("cached_version", &self.cached_version)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::schema::ParameterSpec;

    fn surface() -> ToolSurface {
        let triggers = vec![
            glob::Pattern::new("Assets/Refresh*").unwrap(),
            glob::Pattern::new("refresh_assets").unwrap(),
        ];
        ToolSurface::new(triggers, Duration::from_secs(30))
    }

    #[test]
    fn reload_trigger_matches_menu_path_argument() {
        let surface = surface();
        assert!(surface.is_reload_trigger(
            "execute_menu_item",
            &json!({"path": "Assets/Refresh"})
        ));
        assert!(surface.is_reload_trigger(
            "execute_menu_item",
            &json!({"path": "Assets/RefreshAll"})
        ));
        assert!(!surface.is_reload_trigger(
            "execute_menu_item",
            &json!({"path": "Window/Console"})
        ));
    }

    #[test]
    fn reload_trigger_matches_tool_name() {
        let surface = surface();
        assert!(surface.is_reload_trigger("refresh_assets", &json!({})));
        assert!(!surface.is_reload_trigger("project_info", &json!({})));
    }

    #[test]
    fn translate_preserves_schema_constraints() {
        let schema = ParameterSpec::object()
            .property(
                "count",
                ParameterSpec::integer()
                    .describe("How many")
                    .minimum(1.0)
                    .maximum(500.0)
                    .default_value(json!(50)),
                false,
            )
            .property(
                "severity",
                ParameterSpec::string().one_of([json!("info"), json!("error")]),
                true,
            );
        let descriptor = ToolDescriptor {
            name: "capture_logs".to_string(),
            description: "logs".to_string(),
            requires_main_thread: false,
            parameter_schema: schema.to_json_string(),
        };

        let definition = ToolSurface::translate(&descriptor).unwrap();
        let rendered = &definition.input_schema;
        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["properties"]["count"]["minimum"], 1.0);
        assert_eq!(rendered["properties"]["count"]["maximum"], 500.0);
        assert_eq!(rendered["properties"]["count"]["default"], 50);
        assert_eq!(
            rendered["properties"]["count"]["description"],
            "How many"
        );
        assert_eq!(rendered["properties"]["severity"]["enum"][0], "info");
        assert_eq!(rendered["required"][0], "severity");
    }

    #[test]
    fn payload_passthrough_structured_and_verbatim() {
        let structured = ToolCallResult::from_payload(r#"{"executed":"Assets/Refresh"}"#);
        assert!(!structured.is_error);
        assert_eq!(
            structured.structured_content.as_ref().unwrap()["executed"],
            "Assets/Refresh"
        );

        let verbatim = ToolCallResult::from_payload("plain text");
        assert!(verbatim.structured_content.is_none());
        match &verbatim.content[0] {
            ToolContent::Text { text } => assert_eq!(text, "plain text"),
        }
    }

    #[test]
    fn result_serialisation_skips_empty_flags() {
        let ok = ToolCallResult::text("fine");
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("isError").is_none());

        let err = ToolCallResult::error("boom");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["isError"], true);
    }
}
