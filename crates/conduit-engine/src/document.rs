//! Parses a workflow document (YAML) into an in-memory [`Workflow`].
//!
//! Mirrors the teacher's tolerant document handling: authored blobs sometimes
//! arrive wrapped in fenced-code markers or with smart-quote backticks from an
//! upstream LLM, so the raw text is sanitized before `serde_yaml` ever sees it.

use std::collections::HashMap;

use conduit_types::error::ParseError;
use conduit_types::workflow::{StepSpec, Workflow};
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

/// Parses a workflow document's raw text into a [`Workflow`].
pub fn parse_workflow(raw: &str) -> Result<Workflow, ParseError> {
    let sanitized = sanitize(raw);
    let document: RawDocument = serde_yaml::from_str(&sanitized).map_err(|error| ParseError::Malformed(error.to_string()))?;

    if document.workflow.trim().is_empty() {
        return Err(ParseError::MissingWorkflowField);
    }
    let name = document.name.ok_or_else(|| ParseError::MissingField("name".into()))?;
    let description = document.description.ok_or_else(|| ParseError::MissingField("description".into()))?;

    if document.steps.is_empty() {
        return Err(ParseError::MissingField("steps".into()));
    }

    let mut steps = Vec::with_capacity(document.steps.len());
    for (index, raw_step) in document.steps.into_iter().enumerate() {
        steps.push(convert_step(index, raw_step)?);
    }

    Ok(Workflow { name, description, steps })
}

/// Strips fenced-code wrappers (` ```yaml `/` ``` `) and normalizes backtick and
/// smart-quote characters to straight quotes.
fn sanitize(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_fence = trimmed
        .strip_prefix("```yaml")
        .or_else(|| trimmed.strip_prefix("```yml"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .strip_suffix("```")
        .unwrap_or(trimmed)
        .trim();

    without_fence.replace(['`', '’', '‘'], "\"")
}

fn convert_step(index: usize, raw: RawStep) -> Result<StepSpec, ParseError> {
    if raw.id.trim().is_empty() {
        return Err(ParseError::InvalidStep { index, reason: "missing 'id'".into() });
    }

    let (service, action) = match (raw.service, raw.action) {
        (Some(_), Some(action)) if action.contains('.') => {
            return Err(ParseError::InvalidStep { index, reason: format!("step '{}' has both 'service' and a dotted 'action'", raw.id) });
        }
        (Some(service), Some(action)) => (service, action),
        (None, Some(action)) => match action.split_once('.') {
            Some((service, action)) => (service.to_string(), action.to_string()),
            None => return Err(ParseError::InvalidStep { index, reason: format!("step '{}' action '{}' must be 'service.action' or paired with 'service'", raw.id, action) }),
        },
        (Some(_), None) | (None, None) => return Err(ParseError::InvalidStep { index, reason: format!("step '{}' is missing 'action'", raw.id) }),
    };

    if service.trim().is_empty() {
        return Err(ParseError::InvalidStep { index, reason: format!("step '{}' has an empty 'service'", raw.id) });
    }
    if action.trim().is_empty() {
        return Err(ParseError::InvalidStep { index, reason: format!("step '{}' has an empty 'action'", raw.id) });
    }

    let inputs = raw.parameters.or(raw.inputs).unwrap_or_default();

    Ok(StepSpec {
        id: raw.id,
        service,
        action,
        inputs,
        outputs: raw.outputs,
        depends_on: raw.depends_on,
    })
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default)]
    workflow: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    steps: Vec<RawStep>,
    /// Consumed upstream; the parser does not interpret it.
    #[serde(default)]
    #[allow(dead_code)]
    version: Option<Value>,
    /// Consumed upstream; the parser does not interpret it.
    #[serde(default)]
    #[allow(dead_code)]
    user_parameters: Option<HashMap<String, Value>>,
    /// Consumed upstream; the parser does not interpret it.
    #[serde(default)]
    #[allow(dead_code)]
    service_bindings: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    #[serde(default)]
    #[allow(dead_code)]
    name: Option<String>,
    #[serde(default)]
    service: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    parameters: Option<IndexMap<String, Value>>,
    #[serde(default)]
    inputs: Option<IndexMap<String, Value>>,
    #[serde(default)]
    outputs: Option<IndexMap<String, Value>>,
    #[serde(default)]
    depends_on: Vec<String>,
}
