//! Builds the dependency graph from explicit `depends_on` and implicit
//! `${steps.X.outputs.*}` edges, detects cycles, and produces a topological order.

use std::collections::{HashMap, HashSet};

use conduit_types::error::DependencyError;
use conduit_types::workflow::Workflow;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static STEP_OUTPUT_REFERENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{steps\.([A-Za-z0-9_\-]+)\.outputs\.[A-Za-z0-9_\-]+\}").expect("valid regex"));

/// Returns the step ids in an order that respects every explicit and implicit
/// dependency edge, or the id of a step discovered on a cycle's back-edge.
pub fn schedule(workflow: &Workflow) -> Result<Vec<String>, DependencyError> {
    let predecessors = build_predecessor_map(workflow)?;

    detect_cycles(workflow, &predecessors)?;

    Ok(topological_order(workflow, &predecessors))
}

fn build_predecessor_map(workflow: &Workflow) -> Result<HashMap<String, Vec<String>>, DependencyError> {
    let mut predecessors: HashMap<String, Vec<String>> = HashMap::new();

    for step in &workflow.steps {
        let mut edges: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for dependency in &step.depends_on {
            if dependency == &step.id {
                return Err(DependencyError::SelfReference { step_id: step.id.clone() });
            }
            if !workflow.has_step(dependency) {
                return Err(DependencyError::UnknownDependency { step_id: step.id.clone(), depends_on: dependency.clone() });
            }
            if seen.insert(dependency.clone()) {
                edges.push(dependency.clone());
            }
        }

        for value in step.inputs.values() {
            for referenced in implicit_predecessors(value) {
                if referenced == step.id {
                    return Err(DependencyError::SelfReference { step_id: step.id.clone() });
                }
                if !workflow.has_step(&referenced) {
                    return Err(DependencyError::UnknownDependency { step_id: step.id.clone(), depends_on: referenced });
                }
                if seen.insert(referenced.clone()) {
                    edges.push(referenced);
                }
            }
        }

        predecessors.insert(step.id.clone(), edges);
    }

    Ok(predecessors)
}

fn implicit_predecessors(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect_implicit_predecessors(value, &mut found);
    found
}

fn collect_implicit_predecessors(value: &Value, found: &mut Vec<String>) {
    match value {
        Value::String(text) => {
            for capture in STEP_OUTPUT_REFERENCE.captures_iter(text) {
                found.push(capture[1].to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_implicit_predecessors(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect_implicit_predecessors(item, found)),
        _ => {}
    }
}

/// Depth-first cycle detection with a recursion-stack marker. Returns the step
/// currently on the stack when the first back-edge is found.
fn detect_cycles(workflow: &Workflow, predecessors: &HashMap<String, Vec<String>>) -> Result<(), DependencyError> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut on_stack: HashSet<String> = HashSet::new();

    for step in &workflow.steps {
        if !visited.contains(&step.id) {
            visit(&step.id, predecessors, &mut visited, &mut on_stack)?;
        }
    }
    Ok(())
}

fn visit(step_id: &str, predecessors: &HashMap<String, Vec<String>>, visited: &mut HashSet<String>, on_stack: &mut HashSet<String>) -> Result<(), DependencyError> {
    visited.insert(step_id.to_string());
    on_stack.insert(step_id.to_string());

    if let Some(edges) = predecessors.get(step_id) {
        for predecessor in edges {
            if on_stack.contains(predecessor) {
                return Err(DependencyError::Cycle { step_id: step_id.to_string() });
            }
            if !visited.contains(predecessor) {
                visit(predecessor, predecessors, visited, on_stack)?;
            }
        }
    }

    on_stack.remove(step_id);
    Ok(())
}

/// Kahn's algorithm: repeatedly drain zero-in-degree nodes, breaking ties by the
/// workflow's declared step order.
fn topological_order(workflow: &Workflow, predecessors: &HashMap<String, Vec<String>>) -> Vec<String> {
    let declared_order: Vec<String> = workflow.steps.iter().map(|step| step.id.clone()).collect();

    let mut remaining_predecessors: HashMap<String, HashSet<String>> = predecessors.iter().map(|(id, edges)| (id.clone(), edges.iter().cloned().collect())).collect();

    let mut ordered = Vec::with_capacity(declared_order.len());
    let mut placed: HashSet<String> = HashSet::new();

    while placed.len() < declared_order.len() {
        let ready = declared_order.iter().find(|id| !placed.contains(*id) && remaining_predecessors.get(*id).is_none_or(HashSet::is_empty));

        let Some(ready_id) = ready else {
            // Unreachable when `detect_cycles` has already run, but fail safe rather
            // than looping forever.
            break;
        };

        placed.insert(ready_id.clone());
        ordered.push(ready_id.clone());
        for edges in remaining_predecessors.values_mut() {
            edges.remove(ready_id);
        }
    }

    ordered
}
