//! Validates a parsed [`Workflow`] against a fetched [`Catalog`] before a plan is built.

use conduit_types::catalog::Catalog;
use conduit_types::error::ValidationError;
use conduit_types::workflow::Workflow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static STEP_OUTPUT_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{steps\.([A-Za-z0-9_\-]+)\.outputs\.([A-Za-z0-9_\-]+)\}").expect("valid regex"));

/// Validates every step's `(service, action)` against the catalog, then every
/// `${steps.X.outputs.F}` reference against the producing function's declared
/// output schema. Returns the first failure encountered; nothing is accumulated.
pub fn validate(workflow: &Workflow, catalog: &Catalog) -> Result<(), ValidationError> {
    for step in &workflow.steps {
        let function = match catalog.find_function(&step.service, &step.action) {
            Some(function) => function,
            None => {
                if !catalog.has_service(&step.service) {
                    return Err(ValidationError::UnknownService { step_id: step.id.clone(), service: step.service.clone() });
                }
                return Err(ValidationError::UnknownAction { step_id: step.id.clone(), service: step.service.clone(), action: step.action.clone() });
            }
        };
        let _ = function;
    }

    for step in &workflow.steps {
        for value in step.inputs.values() {
            validate_value(step.id.as_str(), value, workflow, catalog)?;
        }
    }

    Ok(())
}

fn validate_value(step_id: &str, value: &Value, workflow: &Workflow, catalog: &Catalog) -> Result<(), ValidationError> {
    match value {
        Value::String(text) => validate_references_in_string(step_id, text, workflow, catalog),
        Value::Array(items) => items.iter().try_for_each(|item| validate_value(step_id, item, workflow, catalog)),
        Value::Object(map) => map.values().try_for_each(|item| validate_value(step_id, item, workflow, catalog)),
        _ => Ok(()),
    }
}

fn validate_references_in_string(step_id: &str, text: &str, workflow: &Workflow, catalog: &Catalog) -> Result<(), ValidationError> {
    for capture in STEP_OUTPUT_REFERENCE.captures_iter(text) {
        let referenced_step_id = &capture[1];
        let field = &capture[2];

        let referenced_step = workflow.step(referenced_step_id).ok_or_else(|| ValidationError::UnknownStepReference { step_id: step_id.to_string(), referenced_step_id: referenced_step_id.to_string() })?;

        let Some(function) = catalog.find_function(&referenced_step.service, &referenced_step.action) else {
            continue;
        };
        let Some(output_schema) = function.output_schema.as_ref() else {
            // No declared output schema: accepted for backward compatibility.
            continue;
        };
        let available = Catalog::available_output_fields(output_schema);
        if !available.iter().any(|name| name == field) {
            return Err(ValidationError::UnknownOutputField {
                step_id: step_id.to_string(),
                referenced_step_id: referenced_step_id.to_string(),
                field: field.to_string(),
                available,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_types::workflow::StepSpec;
    use indexmap::IndexMap;
    use serde_json::json;

    fn catalog() -> Catalog {
        serde_json::from_value(json!({
            "providers": {
                "workspace": {
                    "description": "",
                    "display_name": "",
                    "services": {
                        "docs": {
                            "description": "",
                            "display_name": "",
                            "functions": {
                                "create_document": {
                                    "name": "create_document",
                                    "required_fields": ["title"],
                                    "example_payload": {},
                                    "output_schema": {
                                        "type": "object",
                                        "properties": {"document_id": {"type": "string"}, "url": {"type": "string"}},
                                        "required": ["document_id", "url"]
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }))
        .expect("catalog deserializes")
    }

    fn workflow_with_step(step: StepSpec) -> Workflow {
        Workflow { name: "w".into(), description: "d".into(), steps: vec![step] }
    }

    #[test]
    fn unknown_service_is_rejected() {
        let step = StepSpec { id: "s".into(), service: "missing".into(), action: "create_document".into(), inputs: IndexMap::new(), outputs: None, depends_on: vec![] };
        let error = validate(&workflow_with_step(step), &catalog()).unwrap_err();
        assert!(matches!(error, ValidationError::UnknownService { .. }));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let step = StepSpec { id: "s".into(), service: "docs".into(), action: "missing".into(), inputs: IndexMap::new(), outputs: None, depends_on: vec![] };
        let error = validate(&workflow_with_step(step), &catalog()).unwrap_err();
        assert!(matches!(error, ValidationError::UnknownAction { .. }));
    }

    #[test]
    fn output_field_mismatch_lists_available_fields() {
        let mut first = StepSpec { id: "s".into(), service: "docs".into(), action: "create_document".into(), inputs: IndexMap::new(), outputs: None, depends_on: vec![] };
        let mut second = first.clone();
        second.id = "t".into();
        second.inputs.insert("title".into(), json!("${steps.s.outputs.title}"));
        first.id = "s".into();

        let workflow = Workflow { name: "w".into(), description: "d".into(), steps: vec![first, second] };
        let error = validate(&workflow, &catalog()).unwrap_err();
        match error {
            ValidationError::UnknownOutputField { available, field, .. } => {
                assert_eq!(field, "title");
                assert_eq!(available, vec!["document_id".to_string(), "url".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn valid_output_reference_passes() {
        let mut first = StepSpec { id: "s".into(), service: "docs".into(), action: "create_document".into(), inputs: IndexMap::new(), outputs: None, depends_on: vec![] };
        let mut second = first.clone();
        second.id = "t".into();
        second.inputs.insert("doc".into(), json!("${steps.s.outputs.document_id}"));
        first.id = "s".into();

        let workflow = Workflow { name: "w".into(), description: "d".into(), steps: vec![first, second] };
        assert!(validate(&workflow, &catalog()).is_ok());
    }
}
