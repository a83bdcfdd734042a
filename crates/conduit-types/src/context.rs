//! The Parameter Context: the four-scope mapping the Expression Resolver reads from
//! and the Execution Engine writes step outputs into, plus the Execution Plan that
//! owns it for the lifetime of one execution.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::workflow::{StepStatus, Workflow};

/// A cooperative cancellation signal checked at each step boundary, mirroring the
/// teacher's `cancel_requested` flag on its workflow run control state. Cloning
/// shares the same underlying flag, so a caller holding one handle can cancel an
/// in-progress execution driven from another task.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle(Arc<AtomicBool>);

impl CancellationHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Requests cancellation. Takes effect at the next step boundary.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Well-known keys populated into `system_parameters` at plan creation.
pub mod system_keys {
    pub const CURRENT_DATE: &str = "current_date";
    pub const CURRENT_DATETIME: &str = "current_datetime";
    pub const USER_EMAIL: &str = "user_email";
    pub const USER_ID: &str = "user_id";
    pub const OAUTH_TOKEN: &str = "oauth_token";
    pub const USER_TIMEZONE: &str = "user_timezone";
}

/// The four-scope mapping used to resolve expressions in step inputs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParameterContext {
    /// Resolved once from intent analysis plus the user's profile.
    #[serde(default)]
    pub user_parameters: HashMap<String, Value>,
    /// Fixed at plan creation: `current_date`, `current_datetime`, `user_email`,
    /// `user_id`, `oauth_token`, `user_timezone`.
    #[serde(default)]
    pub system_parameters: HashMap<String, Value>,
    /// Reserved for future use; always empty in this revision.
    #[serde(default)]
    pub runtime_parameters: HashMap<String, Value>,
    /// Populated incrementally during execution: step id → its output fields.
    #[serde(default)]
    pub step_outputs: HashMap<String, Map<String, Value>>,
}

impl ParameterContext {
    /// True once at least one step's outputs have been recorded. This is the
    /// validation-phase/execution-phase discriminator used by the Expression
    /// Resolver.
    pub fn is_execution_phase(&self) -> bool {
        !self.step_outputs.is_empty()
    }

    /// Records a completed step's outputs, making them visible to subsequent steps.
    pub fn record_step_output(&mut self, step_id: &str, output: Map<String, Value>) {
        self.step_outputs.insert(step_id.to_string(), output);
    }
}

/// The immutable workflow plus the mutable state tracked across one execution.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub workflow: Workflow,
    /// Step ids in scheduler-computed execution order.
    pub ordered_step_ids: Vec<String>,
    pub context: ParameterContext,
    /// Per-step lifecycle status, keyed by step id.
    pub step_statuses: HashMap<String, StepStatus>,
    /// Non-fatal issues surfaced during pre-execution (validation-phase) parameter
    /// resolution. Execution is refused while this is non-empty.
    pub validation_errors: Vec<String>,
}

impl ExecutionPlan {
    /// Builds a fresh plan with every step `Pending` and no recorded outputs.
    pub fn new(workflow: Workflow, ordered_step_ids: Vec<String>, context: ParameterContext) -> Self {
        let step_statuses = workflow.steps.iter().map(|step| (step.id.clone(), StepStatus::Pending)).collect();
        Self {
            workflow,
            ordered_step_ids,
            context,
            step_statuses,
            validation_errors: Vec::new(),
        }
    }

    /// Attaches pre-execution validation errors collected by the caller (e.g. the
    /// Expression Resolver run in validation phase over every step's inputs).
    pub fn with_validation_errors(mut self, validation_errors: Vec<String>) -> Self {
        self.validation_errors = validation_errors;
        self
    }

    /// Returns true when every predecessor of `step_id` has completed.
    pub fn dependencies_met(&self, step_id: &str) -> bool {
        let Some(step) = self.workflow.step(step_id) else {
            return false;
        };
        step.depends_on
            .iter()
            .all(|predecessor| self.step_statuses.get(predecessor) == Some(&StepStatus::Completed))
    }

    /// Returns the subset of `step_id`'s predecessors that have not yet completed.
    pub fn unmet_dependencies(&self, step_id: &str) -> Vec<String> {
        let Some(step) = self.workflow.step(step_id) else {
            return Vec::new();
        };
        step.depends_on
            .iter()
            .filter(|predecessor| self.step_statuses.get(*predecessor) != Some(&StepStatus::Completed))
            .cloned()
            .collect()
    }

    /// True once execution can proceed: no outstanding pre-execution validation errors.
    pub fn is_executable(&self) -> bool {
        self.validation_errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepSpec;
    use indexmap::IndexMap;

    fn workflow_with_dependency() -> Workflow {
        Workflow {
            name: "demo".into(),
            description: "".into(),
            steps: vec![
                StepSpec {
                    id: "a".into(),
                    service: "docs".into(),
                    action: "create_document".into(),
                    inputs: IndexMap::new(),
                    outputs: None,
                    depends_on: vec![],
                },
                StepSpec {
                    id: "b".into(),
                    service: "docs".into(),
                    action: "share_document".into(),
                    inputs: IndexMap::new(),
                    outputs: None,
                    depends_on: vec!["a".into()],
                },
            ],
        }
    }

    #[test]
    fn execution_phase_flips_once_outputs_recorded() {
        let mut context = ParameterContext::default();
        assert!(!context.is_execution_phase());
        context.record_step_output("a", Map::new());
        assert!(context.is_execution_phase());
    }

    #[test]
    fn dependencies_met_tracks_predecessor_status() {
        let workflow = workflow_with_dependency();
        let plan = ExecutionPlan::new(workflow, vec!["a".into(), "b".into()], ParameterContext::default());
        assert!(plan.dependencies_met("a"));
        assert!(!plan.dependencies_met("b"));
        assert_eq!(plan.unmet_dependencies("b"), vec!["a".to_string()]);
    }

    #[test]
    fn cancellation_handle_shares_state_across_clones() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_cancelled());
        clone.cancel();
        assert!(handle.is_cancelled());
    }
}
