//! Workflow compilation and execution engine: parses a typed workflow document,
//! validates it against a live Tool Gateway catalog, resolves parameter
//! expressions, schedules steps by dependency, and drives execution.

pub mod catalog_client;
pub mod document;
pub mod engine;
pub mod resolve;
pub mod schedule;
pub mod schema_check;
pub mod validate;

pub use catalog_client::{CatalogClient, ToolGateway};
pub use conduit_types::context::{system_keys, CancellationHandle, ExecutionPlan, ParameterContext};
pub use conduit_types::error::{CatalogError, DependencyError, ExecutionError, InvocationError, ParseError, ResolutionError, StepFailure, ValidationError};
pub use conduit_types::workflow::{StepSpec, StepStatus, Workflow};
pub use document::parse_workflow;
pub use engine::{execute, execute_cancellable};
pub use schedule::schedule;
pub use validate::validate;

use conduit_types::catalog::Catalog;

/// Errors that can prevent an [`ExecutionPlan`] from being built at all.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

/// Parses, validates, and schedules a workflow document into an [`ExecutionPlan`],
/// then runs the Expression Resolver once more over every step's inputs in
/// validation phase (`context.step_outputs` is empty at this point, so
/// `${steps.*.outputs.*}` references resolve as literals per the phase
/// distinction) to surface resolvable-now problems — chiefly missing
/// `${user.*}`/`${SYSTEM:*}` parameters — before any Tool Gateway call is made.
/// Anything this pass finds is recorded in `ExecutionPlan.validation_errors`
/// rather than failing plan construction outright; `execution()` refuses to run
/// while that list is non-empty.
pub fn build_plan(document: &str, catalog: &Catalog, context: ParameterContext) -> Result<ExecutionPlan, PlanError> {
    let workflow = parse_workflow(document)?;
    validate(&workflow, catalog)?;
    let ordered_step_ids = schedule(&workflow)?;

    let validation_errors = collect_validation_errors(&workflow, &context);

    Ok(ExecutionPlan::new(workflow, ordered_step_ids, context).with_validation_errors(validation_errors))
}

/// Resolves every step's inputs in validation phase (pre-execution), collecting
/// any `ResolutionError` encountered rather than aborting at the first one — the
/// errors are advisory at plan time, surfaced so a caller can fix the workflow
/// document or its inputs before attempting to execute it.
fn collect_validation_errors(workflow: &Workflow, context: &ParameterContext) -> Vec<String> {
    debug_assert!(!context.is_execution_phase(), "validation-phase resolution requires empty step_outputs");

    workflow
        .steps
        .iter()
        .filter_map(|step| match resolve::resolve_inputs(&step.inputs, context) {
            Ok(_) => None,
            Err(error) => Some(format!("step '{}': {error}", step.id)),
        })
        .collect()
}
