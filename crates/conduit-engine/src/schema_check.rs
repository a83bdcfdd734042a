//! Checks a tool response against its function's declared `output_schema`.
//! Policy (strict vs. lenient) is applied by the caller.

use conduit_types::catalog::SchemaProperty;
use serde_json::Value;

/// Missing required fields and unexpected fields observed in a response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCheckResult {
    pub missing: Vec<String>,
    pub unexpected: Vec<String>,
}

impl SchemaCheckResult {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Computes `missing = required - response.keys` and `unexpected = response.keys -
/// properties.keys`. Absent schema yields an empty result.
pub fn check(output_schema: Option<&SchemaProperty>, response: &Value) -> SchemaCheckResult {
    let Some(schema) = output_schema else {
        return SchemaCheckResult::default();
    };

    let response_keys: Vec<String> = match response {
        Value::Object(map) => map.keys().cloned().collect(),
        _ => Vec::new(),
    };

    let mut missing: Vec<String> = schema.required.iter().filter(|required_field| !response_keys.iter().any(|key| key == *required_field)).cloned().collect();
    missing.sort();

    let declared_properties = schema.properties.as_ref();
    let mut unexpected: Vec<String> = response_keys.into_iter().filter(|key| declared_properties.is_none_or(|properties| !properties.contains_key(key))).collect();
    unexpected.sort();

    SchemaCheckResult { missing, unexpected }
}
