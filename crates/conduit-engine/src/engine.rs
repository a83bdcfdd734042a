//! Drives an [`ExecutionPlan`] to completion against the Tool Gateway: the
//! eight-step per-step loop.

use conduit_types::context::{system_keys, CancellationHandle, ExecutionPlan};
use conduit_types::error::{ExecutionError, StepFailure};
use conduit_types::workflow::StepStatus;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::catalog_client::ToolGateway;
use crate::resolve;
use crate::schema_check;

/// Drives every step of `plan` in scheduler order, without any cancellation handle.
/// Equivalent to [`execute_cancellable`] with a handle that is never cancelled.
pub async fn execute(plan: &mut ExecutionPlan, catalog_client: &dyn ToolGateway, run_id: &str) -> Result<(), ExecutionError> {
    execute_cancellable(plan, catalog_client, run_id, &CancellationHandle::new()).await
}

/// Drives every step of `plan` in scheduler order. Stops and returns on the first
/// failing step; no retry, no rollback of previously completed steps. Checked at
/// each step boundary: cancellation takes effect before the next step starts, and
/// aborts an in-flight Tool Gateway call rather than waiting for it to finish.
pub async fn execute_cancellable(plan: &mut ExecutionPlan, catalog_client: &dyn ToolGateway, run_id: &str, cancellation: &CancellationHandle) -> Result<(), ExecutionError> {
    let step_ids = plan.ordered_step_ids.clone();

    for step_id in step_ids {
        if cancellation.is_cancelled() {
            warn!(run_id = %run_id, step_id = %step_id, status = "cancelled", "execution cancelled before step boundary");
            plan.step_statuses.insert(step_id.clone(), StepStatus::Failed);
            return Err(ExecutionError { step_id, cause: StepFailure::Cancelled });
        }

        if let Err(cause) = execute_step(plan, catalog_client, run_id, &step_id, cancellation).await {
            plan.step_statuses.insert(step_id.clone(), StepStatus::Failed);
            warn!(run_id = %run_id, step_id = %step_id, status = "failed", "step execution failed");
            return Err(ExecutionError { step_id, cause });
        }
    }

    Ok(())
}

async fn execute_step(plan: &mut ExecutionPlan, catalog_client: &dyn ToolGateway, run_id: &str, step_id: &str, cancellation: &CancellationHandle) -> Result<(), StepFailure> {
    // 1. Precondition: every predecessor completed.
    if !plan.dependencies_met(step_id) {
        return Err(StepFailure::DependenciesNotMet { pending_on: plan.unmet_dependencies(step_id) });
    }

    // 2. pending -> running
    plan.step_statuses.insert(step_id.to_string(), StepStatus::Running);
    debug!(run_id = %run_id, step_id = %step_id, status = "running", "step started");

    let step = plan.workflow.step(step_id).expect("scheduler only orders known steps").clone();

    // 3. Re-resolve inputs in execution phase.
    let resolved_inputs = resolve::resolve_inputs(&step.inputs, &plan.context)?;

    // 4. Require a non-empty bearer token.
    let oauth_token = plan
        .context
        .system_parameters
        .get(system_keys::OAUTH_TOKEN)
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .ok_or(StepFailure::MissingToken)?
        .to_string();

    let arguments = match serde_json::to_value(&resolved_inputs).expect("resolved inputs serialize") {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    // 5. Invoke the Tool Gateway, aborting early if cancellation is requested
    // mid-flight rather than waiting for the call to finish.
    let response = run_cancellable(catalog_client.invoke_tool(&step.service, &step.action, arguments, &oauth_token), cancellation).await?;

    // 6. Schema-check the response. Lenient policy: log and continue.
    let function_schema = catalog_client.fetch_catalog().await.ok().and_then(|catalog| catalog.find_function(&step.service, &step.action).cloned());
    let check = schema_check::check(function_schema.as_ref().and_then(|schema| schema.output_schema.as_ref()), &response);
    if !check.missing.is_empty() {
        warn!(run_id = %run_id, step_id = %step_id, missing = ?check.missing, "response is missing declared required fields");
    }
    if !check.unexpected.is_empty() {
        warn!(run_id = %run_id, step_id = %step_id, unexpected = ?check.unexpected, "response has undeclared fields");
    }

    // 7. Publish outputs.
    let output_map = match response {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    plan.context.record_step_output(step_id, output_map);

    // 8. running -> completed
    plan.step_statuses.insert(step_id.to_string(), StepStatus::Completed);
    info!(run_id = %run_id, step_id = %step_id, status = "completed", "step finished");

    Ok(())
}

/// Races `future` against the cancellation handle, polling it on a short interval.
/// A cancellation observed while the call is in flight aborts the wait (the
/// underlying `reqwest` future, and with it the HTTP request, is dropped).
async fn run_cancellable<F, T, E>(future: F, cancellation: &CancellationHandle) -> Result<T, StepFailure>
where
    F: std::future::Future<Output = Result<T, E>>,
    StepFailure: From<E>,
{
    tokio::pin!(future);
    let mut poll_interval = tokio::time::interval(std::time::Duration::from_millis(50));
    loop {
        tokio::select! {
            result = &mut future => return result.map_err(StepFailure::from),
            _ = poll_interval.tick() => {
                if cancellation.is_cancelled() {
                    return Err(StepFailure::Cancelled);
                }
            }
        }
    }
}
