//! Tool parameter schemas and the versioned tool catalog.
//!
//! Tools describe their parameters with a JSON-Schema draft-07 subset:
//! types `object | string | integer | number | boolean | array`, plus
//! `description`, `default`, `minimum`, `maximum`, `enum` and the
//! object-level `required` list. The agent serialises a schema as a
//! JSON string inside each [`ToolDescriptor`]; the broker re-hydrates
//! it and translates it into the outer framework's representation,
//! preserving every constraint.

mod spec;

pub use spec::{ParameterSpec, ParameterType, SchemaError, SchemaViolation};

use serde::{Deserialize, Serialize};

/// A self-describing tool entry in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    /// Unique snake_case tool name.
    pub name: String,

    /// Human-readable description.
    pub description: String,

    /// Whether invocations must run on the host main thread.
    pub requires_main_thread: bool,

    /// The tool's parameter schema, serialised as a JSON string.
    pub parameter_schema: String,
}

impl ToolDescriptor {
    /// Re-hydrates the embedded parameter schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded string is not a valid schema.
    pub fn parse_schema(&self) -> Result<ParameterSpec, SchemaError> {
        ParameterSpec::from_json_str(&self.parameter_schema)
    }
}

/// The versioned list of tool descriptors served by `list_tools`.
///
/// The version is a monotonically increasing integer, bumped whenever
/// the host rediscovers tools (on startup and after each reload).
/// Callers key tools by name; ordering is not significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCatalog {
    /// Catalog version.
    pub version: u64,

    /// The registered tools.
    pub tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Looks up a descriptor by tool name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}
