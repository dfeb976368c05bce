//! The typed parameter-schema model and argument validation.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use thiserror::Error;

/// The draft-07 subset of types a parameter may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    /// A JSON object with named properties.
    Object,
    /// A string, optionally constrained by `enum`.
    String,
    /// An integer, optionally constrained by `minimum`/`maximum`.
    Integer,
    /// A floating-point number.
    Number,
    /// A boolean.
    Boolean,
    /// An array with a single item schema.
    Array,
}

impl ParameterType {
    /// Parses a JSON-Schema `type` keyword.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "object" => Some(Self::Object),
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "array" => Some(Self::Array),
            _ => None,
        }
    }

    /// Returns the JSON-Schema `type` keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Array => "array",
        }
    }

    /// Checks whether a JSON value inhabits this type.
    #[must_use]
    pub fn admits(self, value: &Value) -> bool {
        match self {
            Self::Object => value.is_object(),
            Self::String => value.is_string(),
            // JSON has one number type; an integer is a number whose
            // value is integral.
            Self::Integer => value.as_i64().is_some() || value.as_u64().is_some(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
        }
    }
}

/// Errors raised while (de)hydrating a schema.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// The schema string is not valid JSON.
    #[error("schema is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The schema JSON is structurally wrong.
    #[error("malformed schema: {message}")]
    Malformed {
        /// What is wrong.
        message: String,
    },

    /// The `type` keyword names a type outside the supported subset.
    #[error("unsupported schema type '{type_name}'")]
    UnsupportedType {
        /// The unsupported type keyword.
        type_name: String,
    },
}

/// A violation found while validating arguments against a schema.
#[derive(Error, Debug)]
pub enum SchemaViolation {
    /// The argument payload is not a JSON object.
    #[error("arguments must be a JSON object")]
    NotAnObject,

    /// A required field is absent.
    #[error("missing required field '{field}'")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A field has the wrong type.
    #[error("field '{field}' must be of type {expected}")]
    WrongType {
        /// Name of the offending field.
        field: String,
        /// The declared type.
        expected: &'static str,
    },

    /// A numeric field is outside its declared bounds.
    #[error("field '{field}' must be between {minimum} and {maximum}")]
    OutOfRange {
        /// Name of the offending field.
        field: String,
        /// Declared lower bound (negative infinity when absent).
        minimum: f64,
        /// Declared upper bound (positive infinity when absent).
        maximum: f64,
    },

    /// A value is not one of the declared enum members.
    #[error("field '{field}' must be one of {allowed}")]
    NotInEnum {
        /// Name of the offending field.
        field: String,
        /// Comma-separated allowed values.
        allowed: String,
    },
}

/// A parameter schema node.
///
/// Built either programmatically by tools (builder methods) or by
/// re-hydrating the JSON form the agent serialised into a descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    kind: ParameterType,
    description: Option<String>,
    default: Option<Value>,
    minimum: Option<f64>,
    maximum: Option<f64>,
    enum_values: Option<Vec<Value>>,
    items: Option<Box<ParameterSpec>>,
    properties: BTreeMap<String, ParameterSpec>,
    required: Vec<String>,
}

impl ParameterSpec {
    fn new(kind: ParameterType) -> Self {
        Self {
            kind,
            description: None,
            default: None,
            minimum: None,
            maximum: None,
            enum_values: None,
            items: None,
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }

    /// An object schema with no properties yet.
    #[must_use]
    pub fn object() -> Self {
        Self::new(ParameterType::Object)
    }

    /// A string schema.
    #[must_use]
    pub fn string() -> Self {
        Self::new(ParameterType::String)
    }

    /// An integer schema.
    #[must_use]
    pub fn integer() -> Self {
        Self::new(ParameterType::Integer)
    }

    /// A number schema.
    #[must_use]
    pub fn number() -> Self {
        Self::new(ParameterType::Number)
    }

    /// A boolean schema.
    #[must_use]
    pub fn boolean() -> Self {
        Self::new(ParameterType::Boolean)
    }

    /// An array schema with the given item schema.
    #[must_use]
    pub fn array(items: Self) -> Self {
        let mut spec = Self::new(ParameterType::Array);
        spec.items = Some(Box::new(items));
        spec
    }

    /// Sets the description.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets the inclusive lower bound.
    #[must_use]
    pub fn minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    /// Sets the inclusive upper bound.
    #[must_use]
    pub fn maximum(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    /// Restricts the value to the given enum members.
    #[must_use]
    pub fn one_of(mut self, values: impl IntoIterator<Item = Value>) -> Self {
        self.enum_values = Some(values.into_iter().collect());
        self
    }

    /// Adds a property to an object schema.
    ///
    /// `required` marks the property as mandatory at the object level.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, spec: Self, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, spec);
        self
    }

    /// The declared type of this node.
    #[must_use]
    pub const fn kind(&self) -> ParameterType {
        self.kind
    }

    /// The description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The default value, if any.
    #[must_use]
    pub const fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    /// The inclusive lower bound, if any.
    #[must_use]
    pub const fn min(&self) -> Option<f64> {
        self.minimum
    }

    /// The inclusive upper bound, if any.
    #[must_use]
    pub const fn max(&self) -> Option<f64> {
        self.maximum
    }

    /// The declared enum members, if any.
    #[must_use]
    pub fn enum_values(&self) -> Option<&[Value]> {
        self.enum_values.as_deref()
    }

    /// The item schema of an array node, if any.
    #[must_use]
    pub fn items(&self) -> Option<&Self> {
        self.items.as_deref()
    }

    /// The properties of an object node.
    #[must_use]
    pub const fn properties(&self) -> &BTreeMap<String, Self> {
        &self.properties
    }

    /// The object-level required property names.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Renders the node as a JSON-Schema value.
    #[must_use]
    pub fn to_json_value(&self) -> Value {
        let mut out = Map::new();
        out.insert("type".to_string(), json!(self.kind.as_str()));
        if let Some(description) = &self.description {
            out.insert("description".to_string(), json!(description));
        }
        if let Some(default) = &self.default {
            out.insert("default".to_string(), default.clone());
        }
        if let Some(minimum) = self.minimum {
            out.insert("minimum".to_string(), json!(minimum));
        }
        if let Some(maximum) = self.maximum {
            out.insert("maximum".to_string(), json!(maximum));
        }
        if let Some(values) = &self.enum_values {
            out.insert("enum".to_string(), Value::Array(values.clone()));
        }
        if let Some(items) = &self.items {
            out.insert("items".to_string(), items.to_json_value());
        }
        if self.kind == ParameterType::Object {
            let props: Map<String, Value> = self
                .properties
                .iter()
                .map(|(name, spec)| (name.clone(), spec.to_json_value()))
                .collect();
            out.insert("properties".to_string(), Value::Object(props));
            if !self.required.is_empty() {
                out.insert("required".to_string(), json!(self.required));
            }
        }
        Value::Object(out)
    }

    /// Renders the node as a compact JSON string, the form embedded in
    /// a tool descriptor.
    #[must_use]
    pub fn to_json_string(&self) -> String {
        self.to_json_value().to_string()
    }

    /// Re-hydrates a node from its JSON value form.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is structurally malformed or uses
    /// a type outside the supported subset.
    pub fn from_json_value(value: &Value) -> Result<Self, SchemaError> {
        let obj = value.as_object().ok_or_else(|| SchemaError::Malformed {
            message: "schema node must be a JSON object".to_string(),
        })?;

        let type_name = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SchemaError::Malformed {
                message: "schema node is missing 'type'".to_string(),
            })?;
        let kind = ParameterType::parse(type_name).ok_or_else(|| SchemaError::UnsupportedType {
            type_name: type_name.to_string(),
        })?;

        let mut spec = Self::new(kind);
        spec.description = obj
            .get("description")
            .and_then(Value::as_str)
            .map(ToString::to_string);
        spec.default = obj.get("default").cloned();
        spec.minimum = obj.get("minimum").and_then(Value::as_f64);
        spec.maximum = obj.get("maximum").and_then(Value::as_f64);
        spec.enum_values = obj
            .get("enum")
            .and_then(Value::as_array)
            .map(Clone::clone);

        if let Some(items) = obj.get("items") {
            spec.items = Some(Box::new(Self::from_json_value(items)?));
        }

        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            for (name, node) in props {
                spec.properties
                    .insert(name.clone(), Self::from_json_value(node)?);
            }
        }
        if let Some(required) = obj.get("required").and_then(Value::as_array) {
            spec.required = required
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect();
        }

        Ok(spec)
    }

    /// Re-hydrates a node from the JSON string embedded in a descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid JSON or is malformed.
    pub fn from_json_str(schema: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(schema)?;
        Self::from_json_value(&value)
    }

    /// Validates an argument object against this (object) schema.
    ///
    /// Checks required fields, per-field types, numeric bounds and
    /// enum membership. Unknown fields are ignored.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self, arguments: &Value) -> Result<(), SchemaViolation> {
        let obj = arguments.as_object().ok_or(SchemaViolation::NotAnObject)?;

        for field in &self.required {
            if !obj.contains_key(field) {
                return Err(SchemaViolation::MissingField {
                    field: field.clone(),
                });
            }
        }

        for (field, spec) in &self.properties {
            let Some(value) = obj.get(field) else {
                continue;
            };
            spec.validate_value(field, value)?;
        }

        Ok(())
    }

    fn validate_value(&self, field: &str, value: &Value) -> Result<(), SchemaViolation> {
        if !self.kind.admits(value) {
            return Err(SchemaViolation::WrongType {
                field: field.to_string(),
                expected: self.kind.as_str(),
            });
        }

        if let Some(values) = &self.enum_values {
            if !values.contains(value) {
                let allowed = values
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(SchemaViolation::NotInEnum {
                    field: field.to_string(),
                    allowed,
                });
            }
        }

        if self.minimum.is_some() || self.maximum.is_some() {
            if let Some(number) = value.as_f64() {
                let minimum = self.minimum.unwrap_or(f64::NEG_INFINITY);
                let maximum = self.maximum.unwrap_or(f64::INFINITY);
                if number < minimum || number > maximum {
                    return Err(SchemaViolation::OutOfRange {
                        field: field.to_string(),
                        minimum,
                        maximum,
                    });
                }
            }
        }

        if let (ParameterType::Object, true) = (self.kind, !self.properties.is_empty()) {
            self.validate(value)?;
        }

        if let (Some(items), Some(elements)) = (&self.items, value.as_array()) {
            for element in elements {
                items.validate_value(field, element)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_schema() -> ParameterSpec {
        ParameterSpec::object()
            .property(
                "count",
                ParameterSpec::integer()
                    .describe("Number of entries")
                    .minimum(1.0)
                    .maximum(500.0)
                    .default_value(json!(50)),
                false,
            )
            .property(
                "severity",
                ParameterSpec::string()
                    .one_of([json!("info"), json!("warning"), json!("error")])
                    .default_value(json!("info")),
                false,
            )
            .property("path", ParameterSpec::string(), true)
    }

    #[test]
    fn json_round_trip_preserves_constraints() {
        let original = log_schema();
        let rendered = original.to_json_string();
        let back = ParameterSpec::from_json_str(&rendered).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn rendered_schema_is_draft07_shaped() {
        let value = log_schema().to_json_value();
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["count"]["minimum"], 1.0);
        assert_eq!(value["properties"]["severity"]["enum"][1], "warning");
        assert_eq!(value["required"][0], "path");
    }

    #[test]
    fn validate_accepts_conforming_arguments() {
        let schema = log_schema();
        let args = json!({"path": "Assets/Refresh", "count": 10, "severity": "error"});
        assert!(schema.validate(&args).is_ok());
    }

    #[test]
    fn validate_names_missing_required_field() {
        let schema = log_schema();
        let err = schema.validate(&json!({"count": 10})).unwrap_err();
        assert!(err.to_string().contains("path"), "got: {err}");
    }

    #[test]
    fn validate_rejects_wrong_type() {
        let schema = log_schema();
        let err = schema
            .validate(&json!({"path": "x", "count": "ten"}))
            .unwrap_err();
        assert!(matches!(err, SchemaViolation::WrongType { .. }));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        let schema = log_schema();
        let err = schema
            .validate(&json!({"path": "x", "count": 0}))
            .unwrap_err();
        assert!(matches!(err, SchemaViolation::OutOfRange { .. }));
    }

    #[test]
    fn validate_rejects_enum_outsider() {
        let schema = log_schema();
        let err = schema
            .validate(&json!({"path": "x", "severity": "fatal"}))
            .unwrap_err();
        assert!(err.to_string().contains("severity"));
    }

    #[test]
    fn validate_rejects_non_object_arguments() {
        let schema = log_schema();
        assert!(matches!(
            schema.validate(&json!([1, 2])).unwrap_err(),
            SchemaViolation::NotAnObject
        ));
    }

    #[test]
    fn unsupported_type_is_rejected() {
        let err = ParameterSpec::from_json_str(r#"{"type":"null"}"#).unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedType { .. }));
    }

    #[test]
    fn array_items_round_trip() {
        let schema = ParameterSpec::array(ParameterSpec::string().describe("a tag"));
        let back = ParameterSpec::from_json_str(&schema.to_json_string()).unwrap();
        assert_eq!(back.items().unwrap().kind(), ParameterType::String);
    }
}
