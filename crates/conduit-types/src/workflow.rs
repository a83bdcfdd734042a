//! The in-memory Workflow value produced by the Document Parser.
//!
//! A `Workflow` is immutable once parsed; step status and step outputs live in the
//! mutable `ExecutionPlan`/`ParameterContext` instead, not here.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A parsed workflow document: metadata plus an ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workflow {
    pub name: String,
    pub description: String,
    /// Steps in declared order. Execution order is computed separately by the scheduler.
    pub steps: Vec<StepSpec>,
}

impl Workflow {
    /// Looks up a step by id.
    pub fn step(&self, id: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|step| step.id == id)
    }

    /// Returns true when every step id referenced by `id` exists in this workflow.
    pub fn has_step(&self, id: &str) -> bool {
        self.steps.iter().any(|step| step.id == id)
    }
}

/// A single step: which tool to call, what to pass it, and what it depends on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSpec {
    /// Unique identifier within the workflow.
    pub id: String,
    /// Service namespace, e.g. `docs`.
    pub service: String,
    /// Action (function) name within the service, e.g. `create_document`.
    pub action: String,
    /// Arguments passed to the tool, keyed by parameter name. Values may embed
    /// expressions resolved by the Expression Resolver.
    #[serde(default)]
    pub inputs: IndexMap<String, Value>,
    /// Declared output shape, informational; the authoritative shape lives on the
    /// catalog's function schema.
    #[serde(default)]
    pub outputs: Option<IndexMap<String, Value>>,
    /// Step ids that must complete before this step may run.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl StepSpec {
    /// Tool identity as sent to the Tool Gateway: `"{service}.{action}"`.
    pub fn tool_identity(&self) -> String {
        format!("{}.{}", self.service, self.action)
    }
}

/// Lifecycle status of a step within one execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    /// Returns true once a step has reached a status from which it cannot return to
    /// `Pending`/`Running`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}
