//! Error taxonomy. Each component boundary returns one of these kinds; the
//! Execution Engine wraps a step's failure as `ExecutionError`.

use thiserror::Error;

/// The workflow document was malformed. Fatal; no `Workflow` is produced.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("top-level 'workflow' field is missing")]
    MissingWorkflowField,
    #[error("required field '{0}' is missing")]
    MissingField(String),
    #[error("step {index} is invalid: {reason}")]
    InvalidStep { index: usize, reason: String },
    #[error("document could not be parsed: {0}")]
    Malformed(String),
}

/// Transport failure or malformed catalog response from the Tool Gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("catalog response was malformed: {reason}")]
    Malformed { reason: String },
}

/// A step's `(service, action)` is unknown, or a step-output reference names a field
/// absent from the producing function's declared output schema.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("step '{step_id}' references unknown service '{service}'")]
    UnknownService { step_id: String, service: String },
    #[error("step '{step_id}' references unknown action '{action}' on service '{service}'")]
    UnknownAction { step_id: String, service: String, action: String },
    #[error("step '{step_id}' references unknown step '{referenced_step_id}'")]
    UnknownStepReference { step_id: String, referenced_step_id: String },
    #[error("step '{step_id}' references field '{field}' not in output schema of step '{referenced_step_id}'; available fields: {available:?}")]
    UnknownOutputField {
        step_id: String,
        referenced_step_id: String,
        field: String,
        available: Vec<String>,
    },
}

/// Unknown predecessor, self-reference, or a dependency cycle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("step '{step_id}' depends on unknown step '{depends_on}'")]
    UnknownDependency { step_id: String, depends_on: String },
    #[error("step '{step_id}' references its own outputs")]
    SelfReference { step_id: String },
    #[error("dependency cycle detected involving step '{step_id}'")]
    Cycle { step_id: String },
}

/// Missing user/system parameter, unresolved step output during execution, or an
/// invalid timezone name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("missing user parameter '{0}'")]
    MissingUserParameter(String),
    #[error("missing step output '{step_id}.{field}'")]
    MissingStepOutput { step_id: String, field: String },
    #[error("missing system parameter '{0}'")]
    MissingSystemParameter(String),
    #[error("invalid timezone '{0}'")]
    InvalidTimeZone(String),
}

/// Transport non-2xx or `isError=true` from the Tool Gateway.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvocationError {
    #[error("tool gateway transport error (status {status:?}): {message}")]
    Transport { status: Option<u16>, message: String },
    #[error("tool reported an error: {message}")]
    Tool { message: String },
}

/// Umbrella over every error kind that can terminate a single step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StepFailure {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    #[error("required token is missing or empty")]
    MissingToken,
    #[error("dependencies not met: {pending_on:?}")]
    DependenciesNotMet { pending_on: Vec<String> },
    #[error("execution was cancelled")]
    Cancelled,
}

/// The error surfaced by the Execution Engine: which step failed, and why.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("step '{step_id}' failed: {cause}")]
pub struct ExecutionError {
    pub step_id: String,
    pub cause: StepFailure,
}
