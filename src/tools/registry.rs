//! The tool registry: discovery, versioned catalog, invocation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::host::HostState;
use crate::schema::{ToolCatalog, ToolDescriptor};
use crate::tools::{builtin, Tool, ToolError};
use crate::wire::ResponseEnvelope;

/// Process-wide catalog version counter.
///
/// Bumped on every discovery pass so the version keeps increasing
/// across agent reloads within one host process, which is what lets
/// the broker short-circuit resync. The only process-global state in
/// the agent.
static CATALOG_VERSION: AtomicU64 = AtomicU64::new(0);

/// The registry of tools one agent incarnation serves.
///
/// Built once at agent init, never mutated mid-session.
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, Box<dyn Tool>>,
    version: u64,
}

impl ToolRegistry {
    /// Runs a discovery pass: instantiates every builtin tool against
    /// the given host state and bumps the catalog version.
    #[must_use]
    pub fn discover(host: &Arc<HostState>) -> Self {
        let mut registry = Self {
            tools: BTreeMap::new(),
            version: CATALOG_VERSION.fetch_add(1, Ordering::SeqCst) + 1,
        };
        for tool in builtin::instantiate(host) {
            registry.register(tool);
        }
        debug!(
            version = registry.version,
            tools = registry.tools.len(),
            "Tool discovery complete"
        );
        registry
    }

    /// Creates an empty registry at the next catalog version. Used by
    /// tests that register their own tools.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tools: BTreeMap::new(),
            version: CATALOG_VERSION.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }

    /// Registers a tool. Empty or duplicate names are rejected with a
    /// warning, not an error; a failed registration never takes the
    /// agent down.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name();
        if name.is_empty() {
            warn!("Rejected tool registration with empty name");
            return;
        }
        if self.tools.contains_key(name) {
            warn!(tool = name, "Rejected duplicate tool registration");
            return;
        }
        self.tools.insert(name, tool);
    }

    /// The catalog version assigned to this registry.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    /// Serialises the versioned catalog served by `list_tools`.
    #[must_use]
    pub fn catalog(&self) -> ToolCatalog {
        ToolCatalog {
            version: self.version,
            tools: self
                .tools
                .values()
                .map(|tool| ToolDescriptor {
                    name: tool.name().to_string(),
                    description: tool.description().to_string(),
                    requires_main_thread: tool.requires_main_thread(),
                    parameter_schema: tool.schema().to_json_string(),
                })
                .collect(),
        }
    }

    /// Invokes a tool and wraps the outcome in a response envelope.
    ///
    /// `arguments_json` is the double-encoded argument payload from the
    /// request. Parse failures, schema violations, unknown tools and
    /// tool-raised errors all become `ok=false` responses; nothing
    /// here can take the agent down.
    #[must_use]
    pub fn invoke(&self, name: &str, request_id: &str, arguments_json: &str) -> ResponseEnvelope {
        let Some(tool) = self.get(name) else {
            return ResponseEnvelope::failure(request_id, format!("unknown tool: {name}"));
        };

        let arguments: serde_json::Value = if arguments_json.trim().is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(arguments_json) {
                Ok(value) => value,
                Err(e) => {
                    return ResponseEnvelope::failure(
                        request_id,
                        format!("invalid arguments for '{name}': not valid JSON: {e}"),
                    );
                }
            }
        };

        if let Err(violation) = tool.schema().validate(&arguments) {
            return ResponseEnvelope::failure(
                request_id,
                format!("invalid arguments for '{name}': {violation}"),
            );
        }

        match tool.invoke(&arguments) {
            Ok(result) => ResponseEnvelope::success(request_id, result.to_string()),
            Err(ToolError::InvalidArguments { message }) => ResponseEnvelope::failure(
                request_id,
                format!("invalid arguments for '{name}': {message}"),
            ),
            Err(ToolError::Failed { message }) => {
                warn!(tool = name, error = %message, "Tool invocation failed");
                ResponseEnvelope::failure(request_id, format!("tool '{name}' failed: {message}"))
            }
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("version", &self.version)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{json, Value};

    use crate::schema::ParameterSpec;

    struct EchoTool;

    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes its text argument"
        }

        fn schema(&self) -> ParameterSpec {
            ParameterSpec::object().property("text", ParameterSpec::string(), true)
        }

        fn invoke(&self, arguments: &Value) -> Result<Value, ToolError> {
            Ok(json!({"echo": arguments["text"]}))
        }
    }

    struct FailingTool;

    impl Tool for FailingTool {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        fn description(&self) -> &str {
            "Raises on every invocation"
        }

        fn schema(&self) -> ParameterSpec {
            ParameterSpec::object()
        }

        fn invoke(&self, _arguments: &Value) -> Result<Value, ToolError> {
            Err(ToolError::Failed {
                message: "deliberate".to_string(),
            })
        }
    }

    struct EmptyNameTool;

    impl Tool for EmptyNameTool {
        fn name(&self) -> &'static str {
            ""
        }

        fn description(&self) -> &str {
            ""
        }

        fn schema(&self) -> ParameterSpec {
            ParameterSpec::object()
        }

        fn invoke(&self, _arguments: &Value) -> Result<Value, ToolError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn version_strictly_increases_across_discovery_passes() {
        let r1 = ToolRegistry::empty();
        let r2 = ToolRegistry::empty();
        assert!(r2.version() > r1.version());
    }

    #[test]
    fn duplicate_and_empty_names_are_rejected() {
        let mut registry = ToolRegistry::empty();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(EmptyNameTool));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invoke_unknown_tool_names_it() {
        let registry = ToolRegistry::empty();
        let resp = registry.invoke("nope", "c", "{}");
        assert!(!resp.ok);
        assert!(resp.error.contains("nope"));
    }

    #[test]
    fn invoke_missing_required_field_names_it() {
        let mut registry = ToolRegistry::empty();
        registry.register(Box::new(EchoTool));
        let resp = registry.invoke("echo", "d", "{}");
        assert!(!resp.ok);
        assert!(resp.error.contains("text"));
    }

    #[test]
    fn invoke_unparseable_arguments() {
        let mut registry = ToolRegistry::empty();
        registry.register(Box::new(EchoTool));
        let resp = registry.invoke("echo", "d", "{not json");
        assert!(!resp.ok);
        assert!(resp.error.contains("not valid JSON"));
    }

    #[test]
    fn invoke_success_double_encodes_result() {
        let mut registry = ToolRegistry::empty();
        registry.register(Box::new(EchoTool));
        let resp = registry.invoke("echo", "e", r#"{"text":"hi"}"#);
        assert!(resp.ok);
        let payload: Value = serde_json::from_str(&resp.data).unwrap();
        assert_eq!(payload["echo"], "hi");
    }

    #[test]
    fn tool_failure_surfaces_message_only() {
        let mut registry = ToolRegistry::empty();
        registry.register(Box::new(FailingTool));
        let resp = registry.invoke("always_fails", "f", "{}");
        assert!(!resp.ok);
        assert!(resp.error.contains("deliberate"));
    }

    #[test]
    fn catalog_lists_descriptors_with_parseable_schemas() {
        let mut registry = ToolRegistry::empty();
        registry.register(Box::new(EchoTool));
        let catalog = registry.catalog();
        assert_eq!(catalog.version, registry.version());
        let descriptor = catalog.get("echo").unwrap();
        assert!(descriptor.parse_schema().is_ok());
    }
}
