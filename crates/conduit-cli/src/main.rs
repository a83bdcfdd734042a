use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conduit_engine::{build_plan, CancellationHandle, CatalogClient, ParameterContext, ToolGateway};
use conduit_types::context::system_keys;
use tracing::Level;

#[derive(Parser)]
#[command(name = "conduit", about = "Compile and run declarative workflows against a Tool Gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse, validate, and schedule a workflow document without invoking the Tool Gateway.
    Plan {
        /// Path to the workflow YAML document.
        workflow_file: String,
    },
    /// Parse, validate, schedule, and execute a workflow document.
    Run {
        /// Path to the workflow YAML document.
        workflow_file: String,
        /// `key=value` pairs placed into `user_parameters`. Repeatable.
        #[arg(long = "input", value_name = "KEY=VALUE")]
        inputs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Plan { workflow_file } => run_plan(&workflow_file).await,
        Command::Run { workflow_file, inputs } => run_workflow(&workflow_file, inputs).await,
    }
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_max_level(Level::INFO).try_init();
}

fn gateway_base_url() -> String {
    std::env::var("TOOL_GATEWAY_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
}

/// Reads `TOOL_GATEWAY_TIMEOUT` (whole seconds); falls back to
/// `conduit_util::DEFAULT_GATEWAY_TIMEOUT` on absence or a malformed value.
fn gateway_timeout() -> Duration {
    std::env::var("TOOL_GATEWAY_TIMEOUT")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(conduit_util::DEFAULT_GATEWAY_TIMEOUT)
}

fn build_gateway() -> Result<CatalogClient> {
    CatalogClient::with_timeout(gateway_base_url(), gateway_timeout())
}

fn bootstrap_system_parameters() -> ParameterContext {
    let now = chrono::Local::now();
    let mut context = ParameterContext::default();
    context.system_parameters.insert(system_keys::CURRENT_DATE.into(), serde_json::json!(now.format("%Y-%m-%d").to_string()));
    context.system_parameters.insert(system_keys::CURRENT_DATETIME.into(), serde_json::json!(now.format("%Y-%m-%dT%H:%M:%S").to_string()));
    if let Ok(email) = std::env::var("ORCHESTRATOR_USER_EMAIL") {
        context.system_parameters.insert(system_keys::USER_EMAIL.into(), serde_json::json!(email));
    }
    if let Ok(user_id) = std::env::var("ORCHESTRATOR_USER_ID") {
        context.system_parameters.insert(system_keys::USER_ID.into(), serde_json::json!(user_id));
    }
    if let Ok(timezone) = std::env::var("ORCHESTRATOR_USER_TIMEZONE") {
        context.system_parameters.insert(system_keys::USER_TIMEZONE.into(), serde_json::json!(timezone));
    }
    if let Ok(token) = std::env::var("TOOL_GATEWAY_TOKEN") {
        context.system_parameters.insert(system_keys::OAUTH_TOKEN.into(), serde_json::json!(token));
    }
    context
}

fn parse_inputs(inputs: Vec<String>) -> Result<HashMap<String, serde_json::Value>> {
    let mut parsed = HashMap::new();
    for entry in inputs {
        let (key, value) = entry.split_once('=').with_context(|| format!("--input '{entry}' is not of the form key=value"))?;
        parsed.insert(key.to_string(), serde_json::Value::String(value.to_string()));
    }
    Ok(parsed)
}

async fn run_plan(workflow_file: &str) -> Result<()> {
    let client = build_gateway()?;
    run_plan_with_gateway(workflow_file, &client).await
}

/// Compiles `workflow_file` against `gateway`'s catalog and prints the execution
/// order. Never calls `gateway.invoke_tool` — the `plan` subcommand only compiles,
/// it does not execute — which is exactly what `plan_never_invokes_the_tool_gateway`
/// below proves with a gateway double that panics if `invoke_tool` is reached.
async fn run_plan_with_gateway(workflow_file: &str, gateway: &dyn ToolGateway) -> Result<()> {
    let document = std::fs::read_to_string(workflow_file).with_context(|| format!("reading workflow file '{workflow_file}'"))?;
    let catalog = gateway.fetch_catalog().await.context("fetching tool gateway catalog")?;

    let plan = build_plan(&document, &catalog, bootstrap_system_parameters()).context("building execution plan")?;

    println!("workflow: {}", plan.workflow.name);
    println!("execution order:");
    for step_id in &plan.ordered_step_ids {
        let step = plan.workflow.step(step_id).expect("scheduler only orders known steps");
        println!("  {step_id} -> {}", step.tool_identity());
    }
    if !plan.validation_errors.is_empty() {
        println!("validation errors (execution would be refused until these are resolved):");
        for error in &plan.validation_errors {
            println!("  - {error}");
        }
    }
    Ok(())
}

async fn run_workflow(workflow_file: &str, raw_inputs: Vec<String>) -> Result<()> {
    let document = std::fs::read_to_string(workflow_file).with_context(|| format!("reading workflow file '{workflow_file}'"))?;
    let client = build_gateway()?;
    let catalog = client.fetch_catalog().await.context("fetching tool gateway catalog")?;

    let mut context = bootstrap_system_parameters();
    for (key, value) in parse_inputs(raw_inputs)? {
        context.user_parameters.insert(key, value);
    }

    let mut plan = build_plan(&document, &catalog, context).context("building execution plan")?;
    if !plan.is_executable() {
        anyhow::bail!("plan has unresolved validation errors: {:?}", plan.validation_errors);
    }

    let run_id = uuid_like_run_id();
    let cancellation = CancellationHandle::new();
    let ctrl_c_cancellation = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_cancellation.cancel();
        }
    });
    conduit_engine::execute_cancellable(&mut plan, &client, &run_id, &cancellation).await.map_err(|error| anyhow::anyhow!(error))?;

    for step_id in &plan.ordered_step_ids {
        println!("{step_id}: {:?}", plan.step_statuses.get(step_id));
    }
    println!("{}", serde_json::to_string_pretty(&plan.context.step_outputs)?);
    Ok(())
}

/// A short, dependency-free stand-in for a UUID: good enough to correlate log lines
/// for one process's run without pulling in another crate for it.
fn uuid_like_run_id() -> String {
    format!("run-{}", std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conduit_types::catalog::Catalog;
    use conduit_types::error::{CatalogError, InvocationError};
    use serde_json::{json, Map, Value};
    use std::io::Write;

    /// A gateway double that serves a fixed catalog but panics if `invoke_tool` is
    /// ever called, proving a code path never executes a tool.
    struct PanicGateway;

    #[async_trait::async_trait]
    impl ToolGateway for PanicGateway {
        async fn fetch_catalog(&self) -> Result<Catalog, CatalogError> {
            let catalog: Catalog = serde_json::from_value(json!({
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
                                        "example_payload": {}
                                    }
                                }
                            }
                        }
                    }
                }
            }))
            .expect("catalog deserializes");
            Ok(catalog)
        }

        async fn invoke_tool(&self, _service: &str, _action: &str, _arguments: Map<String, Value>, _bearer_token: &str) -> Result<Value, InvocationError> {
            panic!("plan compilation must never invoke the tool gateway");
        }
    }

    #[tokio::test]
    async fn plan_never_invokes_the_tool_gateway() {
        let mut file = tempfile::NamedTempFile::new().expect("creates temp file");
        write!(
            file,
            r#"
workflow: w
name: w
description: d
steps:
  - id: a
    action: docs.create_document
    parameters:
      title: "Report"
"#
        )
        .expect("writes workflow document");

        run_plan_with_gateway(file.path().to_str().expect("utf8 path"), &PanicGateway)
            .await
            .expect("plan compiles without touching invoke_tool");
    }
}
