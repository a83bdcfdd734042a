//! The parameter expression sub-language: a single tokenizer yielding
//! `Literal | UserRef | StepRef | SystemRef | DateCall` segments, folded over the
//! Parameter Context. One tokenizer, one fold — no ad-hoc nested substitution passes.

use chrono::Local;
use conduit_types::context::{system_keys, ParameterContext};
use conduit_types::error::ResolutionError;
use serde_json::{Map, Value};

/// Recursively resolves every expression embedded in `value` against `context`.
pub fn resolve_value(value: &Value, context: &ParameterContext) -> Result<Value, ResolutionError> {
    match value {
        Value::String(text) => resolve_string(text, context),
        Value::Array(items) => items.iter().map(|item| resolve_value(item, context)).collect::<Result<Vec<_>, _>>().map(Value::Array),
        Value::Object(map) => map.iter().map(|(key, item)| resolve_value(item, context).map(|resolved| (key.clone(), resolved))).collect::<Result<Map<_, _>, _>>().map(Value::Object),
        other => Ok(other.clone()),
    }
}

/// Resolves every input in a step's `inputs` map in declared order.
pub fn resolve_inputs(inputs: &indexmap::IndexMap<String, Value>, context: &ParameterContext) -> Result<indexmap::IndexMap<String, Value>, ResolutionError> {
    inputs.iter().map(|(key, value)| resolve_value(value, context).map(|resolved| (key.clone(), resolved))).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ExprKind {
    UserRef(String),
    StepRef { step: String, field: String },
    SystemRef(String),
    BareRef(String),
    DateCall(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Brace { raw: &'a str, expr: ExprKind },
    Paren { raw: &'a str, expr: ExprKind },
}

fn resolve_string(text: &str, context: &ParameterContext) -> Result<Value, ResolutionError> {
    let segments = tokenize(text);

    if let [Segment::Paren { raw, expr }] = segments.as_slice() {
        return resolve_single_paren(raw, expr, context);
    }

    let mut output = String::new();
    for segment in &segments {
        match segment {
            Segment::Literal(literal) => output.push_str(literal),
            Segment::Brace { raw, expr } | Segment::Paren { raw, expr } => match resolve_expr_to_string(expr, context)? {
                Some(resolved) => output.push_str(&resolved),
                None => output.push_str(raw),
            },
        }
    }

    Ok(Value::String(apply_timezone_normalization(output, context)?))
}

/// Handles the case where the entire string is one `$(...)` reference: the
/// referenced value's native type is preserved rather than coerced to a string.
fn resolve_single_paren(raw: &str, expr: &ExprKind, context: &ParameterContext) -> Result<Value, ResolutionError> {
    match expr {
        ExprKind::StepRef { step, field } => {
            if !context.is_execution_phase() {
                return Ok(Value::String(raw.to_string()));
            }
            lookup_step_output(step, field, context)
        }
        ExprKind::DateCall(format) => Ok(Value::String(apply_timezone_normalization(format_date(format), context)?)),
        // The tokenizer only ever classifies a `$(...)` form as one of the two kinds above.
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn resolve_expr_to_string(expr: &ExprKind, context: &ParameterContext) -> Result<Option<String>, ResolutionError> {
    match expr {
        ExprKind::UserRef(name) => context
            .user_parameters
            .get(name)
            .map(|value| Some(display(value)))
            .ok_or_else(|| ResolutionError::MissingUserParameter(name.clone())),
        ExprKind::StepRef { step, field } => {
            if !context.is_execution_phase() {
                return Ok(None);
            }
            match context.step_outputs.get(step).and_then(|outputs| outputs.get(field)) {
                Some(value) => Ok(Some(display(value))),
                None => Err(ResolutionError::MissingStepOutput { step_id: step.clone(), field: field.clone() }),
            }
        }
        ExprKind::SystemRef(name) => context
            .system_parameters
            .get(name)
            .map(|value| Some(display(value)))
            .ok_or_else(|| ResolutionError::MissingSystemParameter(name.clone())),
        ExprKind::BareRef(name) => Ok(context.system_parameters.get(name).map(display)),
        ExprKind::DateCall(format) => Ok(Some(format_date(format))),
    }
}

fn lookup_step_output(step: &str, field: &str, context: &ParameterContext) -> Result<Value, ResolutionError> {
    context
        .step_outputs
        .get(step)
        .and_then(|outputs| outputs.get(field))
        .cloned()
        .ok_or_else(|| ResolutionError::MissingStepOutput { step_id: step.to_string(), field: field.to_string() })
}

fn display(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn format_date(format: &str) -> String {
    Local::now().format(format).to_string()
}

/// After a string is fully resolved, reinterprets a zone-less ISO-8601 wall-clock
/// as local to `system_parameters.user_timezone`, if set.
fn apply_timezone_normalization(text: String, context: &ParameterContext) -> Result<String, ResolutionError> {
    let Some(timezone_name) = context.system_parameters.get(system_keys::USER_TIMEZONE).and_then(Value::as_str) else {
        return Ok(text);
    };
    match conduit_util::normalize_timezone(&text, timezone_name) {
        Ok(Some(normalized)) => Ok(normalized),
        Ok(None) => Ok(text),
        Err(_) => Err(ResolutionError::InvalidTimeZone(timezone_name.to_string())),
    }
}

fn tokenize(text: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let mut cursor = 0usize;

    while cursor < text.len() {
        let remainder = &text[cursor..];
        let brace_at = remainder.find("${");
        let paren_at = remainder.find("$(");

        let next = match (brace_at, paren_at) {
            (None, None) => None,
            (Some(brace), None) => Some((brace, true)),
            (None, Some(paren)) => Some((paren, false)),
            (Some(brace), Some(paren)) => Some(if brace <= paren { (brace, true) } else { (paren, false) }),
        };

        let Some((offset, is_brace)) = next else {
            segments.push(Segment::Literal(remainder));
            break;
        };

        if offset > 0 {
            segments.push(Segment::Literal(&remainder[..offset]));
        }

        let close_char = if is_brace { '}' } else { ')' };
        let after_open = &remainder[offset + 2..];

        let Some(close_at) = after_open.find(close_char) else {
            segments.push(Segment::Literal(&remainder[offset..]));
            break;
        };

        let content = &after_open[..close_at];
        let raw = &remainder[offset..offset + 2 + close_at + 1];

        if is_brace {
            segments.push(Segment::Brace { raw, expr: classify_brace(content) });
        } else {
            match classify_paren(content) {
                Some(expr) => segments.push(Segment::Paren { raw, expr }),
                None => segments.push(Segment::Literal(raw)),
            }
        }

        cursor += offset + 2 + close_at + 1;
    }

    segments
}

fn classify_brace(content: &str) -> ExprKind {
    let trimmed = content.trim();
    if let Some(name) = trimmed.strip_prefix("user.") {
        return ExprKind::UserRef(name.to_string());
    }
    if let Some(rest) = trimmed.strip_prefix("steps.") {
        if let Some((step, field)) = split_step_and_outputs_field(rest) {
            return ExprKind::StepRef { step, field };
        }
    }
    if let Some(name) = trimmed.strip_prefix("SYSTEM:") {
        return ExprKind::SystemRef(name.to_string());
    }
    ExprKind::BareRef(trimmed.to_string())
}

fn classify_paren(content: &str) -> Option<ExprKind> {
    let trimmed = content.trim();
    if let Some(rest) = trimmed.strip_prefix("date ") {
        let quoted = rest.trim();
        let format = quoted
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| quoted.strip_prefix('"').and_then(|s| s.strip_suffix('"')))?;
        return Some(ExprKind::DateCall(format.to_string()));
    }
    let (step, field) = split_step_and_outputs_field(trimmed)?;
    Some(ExprKind::StepRef { step, field })
}

fn split_step_and_outputs_field(content: &str) -> Option<(String, String)> {
    let (step, rest) = content.split_once('.')?;
    let field = rest.strip_prefix("outputs.")?;
    if step.is_empty() || field.is_empty() {
        return None;
    }
    Some((step.to_string(), field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ParameterContext {
        ParameterContext::default()
    }

    #[test]
    fn resolves_user_parameter() {
        let mut ctx = context();
        ctx.user_parameters.insert("recipient".into(), json!("ops@example.com"));
        let resolved = resolve_value(&json!("${user.recipient}"), &ctx).expect("resolves");
        assert_eq!(resolved, json!("ops@example.com"));
    }

    #[test]
    fn missing_user_parameter_is_a_hard_error() {
        let ctx = context();
        let error = resolve_value(&json!("${user.recipient}"), &ctx).unwrap_err();
        assert_eq!(error, ResolutionError::MissingUserParameter("recipient".into()));
    }

    #[test]
    fn step_reference_is_literal_before_execution_phase() {
        let ctx = context();
        let resolved = resolve_value(&json!("${steps.a.outputs.document_id}"), &ctx).expect("resolves");
        assert_eq!(resolved, json!("${steps.a.outputs.document_id}"));
    }

    #[test]
    fn step_reference_is_a_hard_error_during_execution_when_missing() {
        let mut ctx = context();
        ctx.record_step_output("a", serde_json::Map::new());
        let error = resolve_value(&json!("${steps.a.outputs.document_id}"), &ctx).unwrap_err();
        assert_eq!(error, ResolutionError::MissingStepOutput { step_id: "a".into(), field: "document_id".into() });
    }

    #[test]
    fn paren_form_preserves_native_type() {
        let mut ctx = context();
        let mut outputs = serde_json::Map::new();
        outputs.insert("count".into(), json!(3));
        ctx.record_step_output("a", outputs);
        let resolved = resolve_value(&json!("$(a.outputs.count)"), &ctx).expect("resolves");
        assert_eq!(resolved, json!(3));
    }

    #[test]
    fn system_ref_strict_form_errors_when_missing() {
        let ctx = context();
        let error = resolve_value(&json!("${SYSTEM:user_email}"), &ctx).unwrap_err();
        assert_eq!(error, ResolutionError::MissingSystemParameter("user_email".into()));
    }

    #[test]
    fn bare_system_ref_silently_passes_through_on_miss() {
        let ctx = context();
        let resolved = resolve_value(&json!("${totally_unknown}"), &ctx).expect("resolves");
        assert_eq!(resolved, json!("${totally_unknown}"));
    }

    #[test]
    fn mixed_content_with_user_and_system_parameters() {
        let mut ctx = context();
        ctx.user_parameters.insert("name".into(), json!("Ana"));
        ctx.system_parameters.insert("current_date".into(), json!("2025-09-01"));
        let resolved = resolve_value(&json!("Hello ${user.name}, today is ${current_date}"), &ctx).expect("resolves");
        assert_eq!(resolved, json!("Hello Ana, today is 2025-09-01"));
    }

    #[test]
    fn timezone_normalization_applies_to_resolved_naive_datetime() {
        let mut ctx = context();
        ctx.system_parameters.insert(system_keys::USER_TIMEZONE.into(), json!("Europe/Sofia"));
        ctx.user_parameters.insert("when".into(), json!("2025-08-18T10:00:00"));
        let resolved = resolve_value(&json!("${user.when}"), &ctx).expect("resolves");
        assert_eq!(resolved, json!("2025-08-18T10:00:00+03:00"));
    }

    #[test]
    fn timezone_normalization_leaves_zoned_values_unchanged() {
        let mut ctx = context();
        ctx.system_parameters.insert(system_keys::USER_TIMEZONE.into(), json!("Europe/Sofia"));
        ctx.user_parameters.insert("when".into(), json!("2025-08-18T10:00:00Z"));
        let resolved = resolve_value(&json!("${user.when}"), &ctx).expect("resolves");
        assert_eq!(resolved, json!("2025-08-18T10:00:00Z"));
    }

    #[test]
    fn resolution_of_an_already_literal_string_is_idempotent() {
        let ctx = context();
        let resolved = resolve_value(&json!("just plain text"), &ctx).expect("resolves");
        assert_eq!(resolved, json!("just plain text"));
    }

    #[test]
    fn resolving_a_fully_resolved_input_map_is_idempotent() {
        let mut ctx = context();
        ctx.user_parameters.insert("name".into(), json!("Ana"));
        let mut inputs = indexmap::IndexMap::new();
        inputs.insert("greeting".to_string(), json!("Hello ${user.name}"));
        let resolved_once = resolve_inputs(&inputs, &ctx).expect("resolves");
        let mut resolved_map = indexmap::IndexMap::new();
        for (key, value) in &resolved_once {
            resolved_map.insert(key.clone(), value.clone());
        }
        let resolved_twice = resolve_inputs(&resolved_map, &ctx).expect("resolves");
        assert_eq!(resolved_once, resolved_twice);
    }

    #[test]
    fn recursive_resolution_traverses_maps_and_lists() {
        let mut ctx = context();
        ctx.user_parameters.insert("name".into(), json!("Ana"));
        let value = json!({"greeting": ["Hello ${user.name}", {"nested": "${user.name}"}]});
        let resolved = resolve_value(&value, &ctx).expect("resolves");
        assert_eq!(resolved, json!({"greeting": ["Hello Ana", {"nested": "Ana"}]}));
    }
}
