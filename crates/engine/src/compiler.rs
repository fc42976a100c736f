//! The compiler (`spec.md` §4.7): walks the normalised, validated IR,
//! instantiates each declared node, applies the wrapper chain, and links
//! successors in declaration order into a [`CompiledFlow`].

use std::collections::HashMap;
use std::sync::Arc;

use ir::{TemplateResolutionMode, Workflow};
use nodes::Registry;
use store::ResolutionMode;
use tracing::{debug, info};

use crate::batch::{compile_batch_wrapper, retry_override};
use crate::config::ExecutorConfig;
use crate::error::EngineError;
use crate::wrapper::{
    DirectWrapper, ExecutableStep, InstrumentedWrapper, NamespacedWrapper, ResultCheckedWrapper, TemplatedNode,
};

/// One compiled node: its wrapper-chain entry point plus the `action ->
/// next node id` map the executor follows. MVP graphs only ever populate
/// `"default"`.
pub struct CompiledNode {
    pub step: Arc<dyn ExecutableStep>,
    pub successors: HashMap<String, String>,
}

/// The output of compilation: a linear successor chain rooted at `start`.
/// `run` (on [`crate::executor::Executor`]) drives it by following
/// `nodes[current].successors[action]` until `None`.
pub struct CompiledFlow {
    pub nodes: HashMap<String, CompiledNode>,
    pub start: Option<String>,
}

fn resolution_mode(mode: TemplateResolutionMode) -> ResolutionMode {
    match mode {
        TemplateResolutionMode::Strict => ResolutionMode::Strict,
        TemplateResolutionMode::Lenient => ResolutionMode::Lenient,
    }
}

/// Compile a normalised, already-validated [`Workflow`] into a
/// [`CompiledFlow`] against the given node-type registry.
///
/// Per node, outermost first: `Instrumented -> [Batch] -> Namespaced |
/// Direct -> Templated -> Concrete` (`spec.md` §4.4). Batch sits outside
/// the namespace boundary so its per-item alias write lands at root where
/// the templated wrapper finds it, and inside instrumentation so the whole
/// batch reads as a single observation.
pub fn compile(workflow: &Workflow, registry: &Registry, config: &ExecutorConfig) -> Result<CompiledFlow, EngineError> {
    let mode = resolution_mode(workflow.template_resolution_mode);
    let mut nodes = HashMap::with_capacity(workflow.nodes.len());

    for (position, node) in workflow.nodes.iter().enumerate() {
        let concrete = registry.construct(&node.node_type).ok_or_else(|| EngineError::UnknownNodeType {
            node_id: node.id.clone(),
            node_type: node.node_type.clone(),
        })?;
        debug!(node_id = %node.id, node_type = %node.node_type, "compiling node");

        // A `batch` config overrides the inner node's retry policy; absent
        // that, ordinary nodes fall back to the executor's default policy
        // (`spec.md` §9/§11 — the IR has no per-node retry knob of its own).
        let retry_override = Some(
            node.batch
                .as_ref()
                .map(retry_override)
                .unwrap_or((config.default_max_retries, config.retry_base_delay.as_secs_f64())),
        );
        let templated = Arc::new(TemplatedNode {
            node_id: node.id.clone(),
            params: node.params.clone(),
            resolution_mode: mode,
            inner: concrete,
            retry_override,
        });

        let namespaced: Arc<dyn ExecutableStep> = if workflow.enable_namespacing {
            Arc::new(NamespacedWrapper { node_id: node.id.clone(), inner: templated })
        } else {
            Arc::new(DirectWrapper { node_id: node.id.clone(), inner: templated })
        };

        let (inner, is_batch) = match &node.batch {
            Some(batch) => {
                let wrapped: Arc<dyn ExecutableStep> =
                    Arc::new(compile_batch_wrapper(node.id.clone(), batch.clone(), namespaced));
                (wrapped, true)
            }
            // Batch nodes detect `result_error` themselves, per item, inside
            // `compile_batch_wrapper`'s inner step — only the ordinary path
            // needs this extra layer (`spec.md` §7: "detected by caller or
            // batch engine").
            None if workflow.enable_namespacing => {
                let checked: Arc<dyn ExecutableStep> =
                    Arc::new(ResultCheckedWrapper { node_id: node.id.clone(), inner: namespaced });
                (checked, false)
            }
            None => (namespaced, false),
        };

        let step: Arc<dyn ExecutableStep> =
            Arc::new(InstrumentedWrapper { node_id: node.id.clone(), is_batch, inner });

        let mut successors = HashMap::new();
        if let Some(next) = workflow.nodes.get(position + 1) {
            successors.insert(nodes::DEFAULT_ACTION.to_string(), next.id.clone());
        }

        nodes.insert(node.id.clone(), CompiledNode { step, successors });
    }

    let start = workflow.effective_start_node().map(str::to_string);
    info!(node_count = nodes.len(), start = ?start, "workflow compiled");
    Ok(CompiledFlow { nodes, start })
}
