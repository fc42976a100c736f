//! `workflow-core` CLI entry-point.
//!
//! A thin harness over the core: it loads a JSON IR document from disk,
//! normalises it, runs the six-layer validator, and — for `run` — compiles
//! and executes it. The file-format parser, display/JSON-output
//! formatting, and the planner/repair subsystem are out of scope
//! (`spec.md` §1); this binary stands in for them just enough to exercise
//! the core end to end.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ir::Workflow;
use nodes::Registry;
use serde_json::Value;
use tracing::info;

#[derive(Parser)]
#[command(name = "workflow-core", about = "Declarative workflow engine execution core", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Normalise and validate a workflow IR file; report errors and
    /// unknown-param warnings without executing anything.
    Validate {
        /// Path to the workflow IR JSON file.
        path: PathBuf,
    },
    /// Normalise, validate, compile, and run a workflow IR file.
    Run {
        /// Path to the workflow IR JSON file.
        path: PathBuf,
        /// Workflow input as `name=value`; `value` is parsed as JSON if
        /// possible, else kept as a string. Repeatable.
        #[arg(long = "input", value_parser = parse_input)]
        inputs: Vec<(String, Value)>,
    },
}

fn parse_input(s: &str) -> Result<(String, Value), String> {
    let (name, raw) = s.split_once('=').ok_or_else(|| format!("expected name=value, got '{s}'"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((name.to_string(), value))
}

/// Read, normalise, deserialise, and statically validate a workflow file.
/// Shared by `validate` and `run`.
fn load_and_validate(path: &PathBuf, registry: &Registry) -> anyhow::Result<(Workflow, ir::ValidationOutcome)> {
    let content = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("cannot read {}: {e}", path.display()))?;
    let mut raw: Value = serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("invalid JSON: {e}"))?;

    ir::normalize(&mut raw);
    let workflow: Workflow = serde_json::from_value(raw).map_err(|e| anyhow::anyhow!("malformed IR: {e}"))?;

    let outcome = ir::validate(&workflow, registry)?;
    Ok((workflow, outcome))
}

fn report_warnings(outcome: &ir::ValidationOutcome) {
    for warning in &outcome.warnings {
        tracing::warn!("{warning}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    let registry = Registry::with_builtins();

    match cli.command {
        Command::Validate { path } => match load_and_validate(&path, &registry) {
            Ok((workflow, outcome)) => {
                report_warnings(&outcome);
                println!("workflow is valid: {} node(s), {} warning(s)", workflow.nodes.len(), outcome.warnings.len());
            }
            Err(e) => {
                eprintln!("validation failed: {e}");
                std::process::exit(1);
            }
        },
        Command::Run { path, inputs } => {
            let (workflow, outcome) = load_and_validate(&path, &registry)?;
            report_warnings(&outcome);

            let flow = engine::compile(&workflow, &registry, &engine::ExecutorConfig::default())?;

            let run_id = uuid::Uuid::new_v4();
            let params = materialize_inputs(&workflow, inputs);
            let mut store = store::SharedStore::with_inputs(params);

            info!(%run_id, "starting workflow execution");
            match engine::Executor::new().run(&flow, &workflow, &mut store).await {
                Ok(outputs) => {
                    println!("{}", serde_json::to_string_pretty(&Value::Object(outputs))?);
                }
                Err(e) => {
                    eprintln!("execution failed: {e}");
                    if let Some(record) = store.get("__execution__") {
                        eprintln!("{}", serde_json::to_string_pretty(&record)?);
                    }
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Seeds the root store with CLI-supplied inputs, falling back to each
/// declared input's `default` when the caller didn't supply one.
fn materialize_inputs(workflow: &Workflow, supplied: Vec<(String, Value)>) -> serde_json::Map<String, Value> {
    let mut params: HashMap<String, Value> = supplied.into_iter().collect();

    for (name, decl) in &workflow.inputs {
        if !params.contains_key(name) {
            if let Some(default) = &decl.default {
                params.insert(name.clone(), default.clone());
            }
        }
    }

    params.into_iter().collect()
}
