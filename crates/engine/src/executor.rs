//! The executor (`spec.md` §4.8): drives a [`CompiledFlow`]'s successor
//! chain, carries the shared store, and on success projects the
//! workflow's declared `outputs`. On failure it augments the
//! `__execution__` reserved-key record (already updated per-node by
//! [`crate::wrapper::InstrumentedWrapper`]) with the nodes that never got
//! a chance to run.

use ir::Workflow;
use serde_json::{json, Map, Value};
use store::{resolve_value, ResolutionMode, SharedStore};
use tracing::{error, info, instrument};

use crate::compiler::CompiledFlow;
use crate::error::EngineError;

fn resolution_mode(mode: ir::TemplateResolutionMode) -> ResolutionMode {
    match mode {
        ir::TemplateResolutionMode::Strict => ResolutionMode::Strict,
        ir::TemplateResolutionMode::Lenient => ResolutionMode::Lenient,
    }
}

/// Stateless driver over a [`CompiledFlow`]. One instance can run any
/// number of flows; all per-run state lives in the caller-owned
/// [`SharedStore`].
#[derive(Debug, Default, Clone, Copy)]
pub struct Executor;

impl Executor {
    pub fn new() -> Self {
        Self
    }

    /// Run `flow` to completion (or first failure) against `store`,
    /// starting from `flow.start`. `store` is mutated in place — on
    /// failure the caller retains whatever partial state, including
    /// `__execution__`, the run accumulated. On success, returns the
    /// workflow's declared `outputs` projected against the final store.
    #[instrument(skip(self, flow, workflow, store), fields(nodes = flow.nodes.len()))]
    pub async fn run(
        &self,
        flow: &CompiledFlow,
        workflow: &Workflow,
        store: &mut SharedStore,
    ) -> Result<Map<String, Value>, EngineError> {
        let mut current = flow.start.clone();

        while let Some(node_id) = current {
            let Some(compiled) = flow.nodes.get(&node_id) else {
                return Err(EngineError::UnknownNodeType {
                    node_id: node_id.clone(),
                    node_type: "<successor points to undeclared node>".to_string(),
                });
            };

            match compiled.step.run(store).await {
                Ok(action) => {
                    current = compiled.successors.get(&action).cloned();
                }
                Err(err) => {
                    error!(node_id = %node_id, error = %err, "workflow execution halted");
                    record_not_started(store, workflow, &node_id);
                    return Err(err);
                }
            }
        }

        info!("workflow execution completed");
        project_outputs(workflow, store)
    }
}

/// Adds `not_started_nodes` to `__execution__`: every declared node that is
/// neither the failing node nor already recorded as completed.
fn record_not_started(store: &mut SharedStore, workflow: &Workflow, failed_node: &str) {
    let mut record = store.get("__execution__").unwrap_or_else(|| {
        json!({
            "completed_nodes": [],
            "failed_node": Value::Null,
            "node_actions": {},
            "node_hashes": {},
            "steps": [],
        })
    });

    let completed: Vec<String> = record
        .get("completed_nodes")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let not_started: Vec<Value> = workflow
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| *id != failed_node && !completed.iter().any(|c| c == id))
        .map(|id| Value::String(id.to_string()))
        .collect();

    if let Some(obj) = record.as_object_mut() {
        obj.insert("failed_node".to_string(), Value::String(failed_node.to_string()));
        obj.insert("not_started_nodes".to_string(), Value::Array(not_started));
    }

    store.set("__execution__", record);
}

/// Resolves each declared output's `source` template against the final
/// store (`spec.md` §4.8; §6's batch-output contract applies here too,
/// since a `source` may point at e.g. `${node.results}`).
fn project_outputs(workflow: &Workflow, store: &SharedStore) -> Result<Map<String, Value>, EngineError> {
    let mode = resolution_mode(workflow.template_resolution_mode);
    let mut outputs = Map::with_capacity(workflow.outputs.len());

    for (name, decl) in &workflow.outputs {
        let resolved = resolve_value(&Value::String(decl.source.clone()), store, mode).map_err(|source| {
            EngineError::Template {
                node_id: "<workflow-outputs>".to_string(),
                param: name.clone(),
                source,
            }
        })?;
        outputs.insert(name.clone(), resolved);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile;
    use crate::config::ExecutorConfig;
    use ir::{CURRENT_IR_VERSION, Node as IrNode, OutputDecl, TemplateResolutionMode};
    use nodes::Registry;
    use serde_json::json;
    use std::collections::HashMap;

    fn node(id: &str, node_type: &str, params: Map<String, Value>) -> IrNode {
        IrNode { id: id.to_string(), node_type: node_type.to_string(), purpose: None, params, batch: None }
    }

    fn workflow(nodes: Vec<IrNode>, outputs: HashMap<String, OutputDecl>) -> Workflow {
        Workflow {
            ir_version: CURRENT_IR_VERSION.to_string(),
            nodes,
            edges: vec![],
            inputs: HashMap::new(),
            outputs,
            start_node: None,
            enable_namespacing: true,
            template_resolution_mode: TemplateResolutionMode::Strict,
        }
    }

    #[tokio::test]
    async fn s1_linear_flow_preserves_native_type_and_projects_outputs() {
        let mut outputs = HashMap::new();
        outputs.insert(
            "final".to_string(),
            OutputDecl { description: None, scalar_type: None, source: "${B.x}".to_string() },
        );
        let wf = workflow(
            vec![
                node("A", "literal", Map::from_iter([("value".to_string(), json!(42))])),
                node("B", "passthrough", Map::from_iter([("x".to_string(), json!("${A.value}"))])),
            ],
            outputs,
        );

        let registry = Registry::with_builtins();
        let flow = compile(&wf, &registry, &ExecutorConfig::default()).unwrap();
        let mut store = SharedStore::new();

        let result = Executor::new().run(&flow, &wf, &mut store).await.unwrap();
        assert_eq!(result.get("final"), Some(&json!(42)));
        assert_eq!(store.get("A"), Some(json!({"value": 42})));
    }

    #[tokio::test]
    async fn unknown_node_type_fails_before_any_execution() {
        let wf = workflow(
            vec![
                node("A", "literal", Map::from_iter([("value".to_string(), json!(1))])),
                node("B", "does-not-exist", Map::new()),
            ],
            HashMap::new(),
        );

        let registry = Registry::with_builtins();
        let err = compile(&wf, &registry, &ExecutorConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::UnknownNodeType { node_id, .. } if node_id == "B"));
    }

    #[tokio::test]
    async fn mid_chain_node_failure_halts_and_marks_remaining_not_started() {
        use async_trait::async_trait;
        use nodes::{Node, NodeError};
        use std::sync::Arc;
        use store::StoreView;

        struct Boom;
        #[async_trait]
        impl Node for Boom {
            async fn prep(&self, _s: &dyn StoreView, _p: &Map<String, Value>) -> Result<Value, NodeError> {
                Ok(Value::Null)
            }
            async fn exec(&self, _p: &Value) -> Result<Value, NodeError> {
                Err(NodeError::Fatal("boom".to_string()))
            }
            async fn post(&self, _s: &mut dyn StoreView, _p: Value, _e: Value) -> Result<String, NodeError> {
                unreachable!()
            }
        }

        let mut registry = Registry::with_builtins();
        registry.register(nodes::NodeSpec {
            name: "boom".to_string(),
            params: vec![],
            outputs: vec![],
            construct: || Arc::new(Boom),
        });

        let wf = workflow(
            vec![
                node("A", "literal", Map::from_iter([("value".to_string(), json!(1))])),
                node("B", "boom", Map::new()),
                node("C", "literal", Map::from_iter([("value".to_string(), json!(2))])),
            ],
            HashMap::new(),
        );

        let flow = compile(&wf, &registry, &ExecutorConfig::default()).unwrap();
        let mut store = SharedStore::new();
        let err = Executor::new().run(&flow, &wf, &mut store).await.unwrap_err();
        assert_eq!(err.node_id(), Some("B"));

        let record = store.get("__execution__").unwrap();
        assert_eq!(record["completed_nodes"], json!(["A"]));
        assert_eq!(record["failed_node"], json!("B"));
        assert_eq!(record["not_started_nodes"], json!(["C"]));
    }
}
