//! Service catalog types returned by the Tool Gateway's `GET /api/services` endpoint.
//!
//! A catalog groups one or more providers, each exposing named services, each
//! exposing named functions with a declared input/output schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Root catalog document fetched from `GET {base}/api/services`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Catalog {
    /// Top-level provider namespaces (the gateway currently exposes exactly one,
    /// `workspace`, but the wire shape allows for more).
    #[serde(default)]
    pub providers: HashMap<String, Provider>,
}

/// A single provider namespace grouping related services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Provider {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub services: HashMap<String, ServiceDefinition>,
}

/// A named service within a provider, exposing one or more callable functions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ServiceDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub functions: HashMap<String, FunctionSchema>,
}

/// A single callable function (action) within a service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FunctionSchema {
    #[serde(default)]
    pub name: String,
    /// Ordered list of input field names a caller must supply.
    #[serde(default)]
    pub required_fields: Vec<String>,
    /// Sample arguments, kept free-form since the gateway does not constrain its shape.
    #[serde(default)]
    pub example_payload: Map<String, Value>,
    /// Declared response shape. When absent, response validation is skipped.
    #[serde(default)]
    pub output_schema: Option<SchemaProperty>,
    /// Declared error response shape, informational only.
    #[serde(default)]
    pub error_schema: Option<SchemaProperty>,
}

/// JSON-schema-like description of a value's shape, used for both function output
/// schemas and step-output-reference validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SchemaProperty {
    /// JSON type reported by the catalog (`object`, `array`, `string`, and so on).
    pub r#type: String,
    /// Human-readable description. Empty when the catalog omits one.
    #[serde(default)]
    pub description: String,
    /// Nested fields when `r#type == "object"`.
    #[serde(default)]
    pub properties: Option<HashMap<String, Box<SchemaProperty>>>,
    /// Names of properties that must be present on a conforming value.
    #[serde(default)]
    pub required: Vec<String>,
    /// Schema for array elements when `r#type == "array"`.
    #[serde(default)]
    pub items: Option<Box<SchemaProperty>>,
    /// Enumerated literal values allowed for this property.
    #[serde(rename = "enum", default)]
    pub enum_values: Vec<String>,
    /// Optional format hint (for example, `uuid`, `date-time`).
    #[serde(default)]
    pub format: Option<String>,
}

impl Catalog {
    /// Looks up a function schema by service and action name across all providers.
    pub fn find_function(&self, service: &str, action: &str) -> Option<&FunctionSchema> {
        self.providers
            .values()
            .find_map(|provider| provider.services.get(service).and_then(|svc| svc.functions.get(action)))
    }

    /// Returns true when any provider exposes a service with this name.
    pub fn has_service(&self, service: &str) -> bool {
        self.providers.values().any(|provider| provider.services.contains_key(service))
    }

    /// Returns the names of top-level properties declared on a schema, or an empty
    /// list when the schema has none. Used to build "available fields" diagnostics.
    pub fn available_output_fields(schema: &SchemaProperty) -> Vec<String> {
        schema
            .properties
            .as_ref()
            .map(|properties| {
                let mut names: Vec<String> = properties.keys().cloned().collect();
                names.sort();
                names
            })
            .unwrap_or_default()
    }
}
