//! The node wrapper chain (`spec.md` §4.4): `Instrumented -> [Batch] ->
//! Namespaced -> Templated -> Concrete`.
//!
//! `Concrete` is any [`nodes::Node`]; `Templated` and the namespace
//! boundary are implemented here as [`TemplatedNode`] plus two thin
//! adapters (`NamespacedWrapper`, `DirectWrapper`) depending on whether
//! `enable_namespacing` applies. `Batch` lives in [`crate::batch`].
//! `Instrumented` is [`InstrumentedWrapper`], always outermost.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use nodes::Node;
use store::{NamespacedStore, ResolutionMode, SharedStore, StoreView};
use tracing::{error, info};

use crate::error::EngineError;
use crate::result::result_error_message;
use crate::retry::exec_with_retry;

/// The common interface every layer of the wrapper chain presents to its
/// caller — ultimately the compiler's successor chain and the executor.
#[async_trait]
pub trait ExecutableStep: Send + Sync {
    fn node_id(&self) -> &str;
    async fn run(&self, store: &mut SharedStore) -> Result<String, EngineError>;
}

fn to_engine_error(node_id: &str, err: nodes::NodeError) -> EngineError {
    EngineError::NodeExec {
        node_id: node_id.to_string(),
        message: err.to_string(),
    }
}

/// The `Templated` + `Concrete` pair: resolves the node's static IR params
/// against whatever store it's handed, then drives `prep` -> retry-wrapped
/// `exec` -> `post`.
///
/// Per `spec.md` §9's redesign note, resolved params are passed as an
/// explicit argument to `prep` rather than mutated into shared state, so a
/// single `Arc<TemplatedNode>` can be shared — unmodified — across
/// sequential batch iterations and concurrent parallel workers alike; no
/// per-worker deep copy of the wrapper chain is needed.
pub struct TemplatedNode {
    pub node_id: String,
    pub params: Map<String, Value>,
    pub resolution_mode: ResolutionMode,
    pub inner: Arc<dyn Node>,
    /// When `Some`, overrides the inner node's own retry settings — set by
    /// the compiler when this node carries a `batch` config (`spec.md` §9:
    /// "batch config overrides the inner node when both are present").
    pub retry_override: Option<(u32, f64)>,
}

impl TemplatedNode {
    fn effective_retry(&self) -> (u32, Duration) {
        match self.retry_override {
            Some((max_retries, wait)) => (max_retries, Duration::from_secs_f64(wait.max(0.0))),
            None => (self.inner.max_retries(), self.inner.retry_wait()),
        }
    }

    pub async fn run_on<S: StoreView>(&self, store: &mut S) -> Result<String, EngineError> {
        let mut resolved = Map::with_capacity(self.params.len());
        for (key, value) in &self.params {
            let rv = store::resolve_value(value, store, self.resolution_mode).map_err(|source| {
                EngineError::Template {
                    node_id: self.node_id.clone(),
                    param: key.clone(),
                    source,
                }
            })?;
            resolved.insert(key.clone(), rv);
        }

        let prep_result = self
            .inner
            .prep(&*store, &resolved)
            .await
            .map_err(|e| to_engine_error(&self.node_id, e))?;

        let (max_retries, wait) = self.effective_retry();
        let exec_result = exec_with_retry(self.inner.as_ref(), &prep_result, max_retries, wait)
            .await
            .map_err(|e| to_engine_error(&self.node_id, e))?;

        self.inner
            .post(store, prep_result, exec_result)
            .await
            .map_err(|e| to_engine_error(&self.node_id, e))
    }
}

/// Applies the per-node namespace proxy (`spec.md` §4.3) before handing
/// control to [`TemplatedNode`]. Used when `enable_namespacing` is true.
pub struct NamespacedWrapper {
    pub node_id: String,
    pub inner: Arc<TemplatedNode>,
}

#[async_trait]
impl ExecutableStep for NamespacedWrapper {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn run(&self, store: &mut SharedStore) -> Result<String, EngineError> {
        let mut ns = NamespacedStore::new(store, self.node_id.clone());
        self.inner.run_on(&mut ns).await
    }
}

/// Bypasses the namespace proxy — used when the IR sets
/// `enable_namespacing: false`. The node reads and writes the root store
/// directly; [`TemplatedNode`] is unaware of the difference because both
/// stores implement [`store::StoreView`].
pub struct DirectWrapper {
    pub node_id: String,
    pub inner: Arc<TemplatedNode>,
}

#[async_trait]
impl ExecutableStep for DirectWrapper {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn run(&self, store: &mut SharedStore) -> Result<String, EngineError> {
        self.inner.run_on(store).await
    }
}

/// Applies the `result_error` check (`spec.md` §7) after an ordinary
/// (non-batch) node completes without raising: a truthy `error` key in the
/// node's own namespace entry is still a failure. Only used on the
/// namespaced, non-batch path — batch nodes run the equivalent check
/// themselves per item inside [`crate::batch`], where it's load-bearing for
/// preserving the item's namespace instead of discarding it on conversion to
/// `Err`; and with namespacing disabled there's no single mapping that's
/// unambiguously "this node's result" to inspect.
pub struct ResultCheckedWrapper {
    pub node_id: String,
    pub inner: Arc<dyn ExecutableStep>,
}

#[async_trait]
impl ExecutableStep for ResultCheckedWrapper {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn run(&self, store: &mut SharedStore) -> Result<String, EngineError> {
        let action = self.inner.run(store).await?;
        if let Some(message) = store.get(&self.node_id).as_ref().and_then(result_error_message) {
            return Err(EngineError::ResultError { node_id: self.node_id.clone(), message });
        }
        Ok(action)
    }
}

/// Outermost layer: timing, trace bookkeeping, and the `__execution__`
/// reserved-key record (`spec.md` §4.4, §4.8, §6).
pub struct InstrumentedWrapper {
    pub node_id: String,
    pub is_batch: bool,
    pub inner: Arc<dyn ExecutableStep>,
}

#[async_trait]
impl ExecutableStep for InstrumentedWrapper {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn run(&self, store: &mut SharedStore) -> Result<String, EngineError> {
        let start = std::time::Instant::now();
        let result = self.inner.run(store).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(action) => info!(node_id = %self.node_id, action, duration_ms, "node succeeded"),
            Err(e) => error!(node_id = %self.node_id, error = %e, duration_ms, "node failed"),
        }

        let mut record = store.get("__execution__").unwrap_or_else(|| {
            json!({
                "completed_nodes": [],
                "failed_node": Value::Null,
                "node_actions": {},
                "node_hashes": {},
                "steps": [],
            })
        });

        let mut step = json!({
            "node_id": self.node_id,
            "status": if result.is_ok() { "success" } else { "failed" },
            "duration_ms": duration_ms,
            "cached": false,
            "is_batch": self.is_batch,
        });

        if self.is_batch {
            if let Some(Value::Object(ns)) = store.get(&self.node_id) {
                if let Some(step_obj) = step.as_object_mut() {
                    step_obj.insert("batch_total".into(), ns.get("count").cloned().unwrap_or(Value::Null));
                    step_obj.insert(
                        "batch_success".into(),
                        ns.get("success_count").cloned().unwrap_or(Value::Null),
                    );
                    step_obj.insert(
                        "batch_errors".into(),
                        ns.get("error_count").cloned().unwrap_or(Value::Null),
                    );
                    if let Some(errors) = ns.get("errors") {
                        step_obj.insert("batch_error_details".into(), errors.clone());
                    }
                }
            }
        }

        if let Some(obj) = record.as_object_mut() {
            if let Some(steps) = obj.entry("steps").or_insert_with(|| Value::Array(vec![])).as_array_mut() {
                steps.push(step);
            }

            match &result {
                Ok(action) => {
                    if let Some(completed) = obj
                        .entry("completed_nodes")
                        .or_insert_with(|| Value::Array(vec![]))
                        .as_array_mut()
                    {
                        completed.push(Value::String(self.node_id.clone()));
                    }
                    if let Some(actions) = obj
                        .entry("node_actions")
                        .or_insert_with(|| Value::Object(Map::new()))
                        .as_object_mut()
                    {
                        actions.insert(self.node_id.clone(), Value::String(action.clone()));
                    }
                }
                Err(_) => {
                    obj.insert("failed_node".to_string(), Value::String(self.node_id.clone()));
                }
            }
        }

        store.set("__execution__", record);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodes::MockNode;
    use serde_json::json;

    fn templated(node_id: &str, inner: Arc<dyn Node>, params: Map<String, Value>) -> Arc<TemplatedNode> {
        Arc::new(TemplatedNode {
            node_id: node_id.to_string(),
            params,
            resolution_mode: ResolutionMode::Strict,
            inner,
            retry_override: None,
        })
    }

    /// Echoes its `x` param back into its own output — used to prove a
    /// whole-value template reference reaches `prep` as a native value
    /// rather than a stringified one.
    struct Echo;
    #[async_trait]
    impl Node for Echo {
        async fn prep(&self, _s: &dyn StoreView, params: &Map<String, Value>) -> Result<Value, nodes::NodeError> {
            Ok(params.get("x").cloned().unwrap_or(Value::Null))
        }
        async fn exec(&self, prep_result: &Value) -> Result<Value, nodes::NodeError> {
            Ok(prep_result.clone())
        }
        async fn post(
            &self,
            store: &mut dyn StoreView,
            _prep_result: Value,
            exec_result: Value,
        ) -> Result<String, nodes::NodeError> {
            store.set("x", exec_result);
            Ok("default".to_string())
        }
    }

    #[tokio::test]
    async fn templated_resolves_whole_value_reference_natively() {
        let mut store = SharedStore::new();
        store.set("A", json!({"value": 42}));

        let echoed = templated(
            "B",
            Arc::new(Echo),
            Map::from_iter([("x".to_string(), json!("${A.value}"))]),
        );

        let wrapper = NamespacedWrapper { node_id: "B".to_string(), inner: echoed };
        wrapper.run(&mut store).await.unwrap();

        assert_eq!(store.get("B"), Some(json!({"x": 42})));
    }

    #[tokio::test]
    async fn instrumented_records_completion_and_failure() {
        let mut store = SharedStore::new();
        let ok_inner: Arc<dyn ExecutableStep> = Arc::new(NamespacedWrapper {
            node_id: "A".to_string(),
            inner: templated("A", Arc::new(MockNode::returning("A", "value", json!(1))), Map::new()),
        });
        let ok_wrapper = InstrumentedWrapper { node_id: "A".to_string(), is_batch: false, inner: ok_inner };
        ok_wrapper.run(&mut store).await.unwrap();

        let record = store.get("__execution__").unwrap();
        assert_eq!(record["completed_nodes"], json!(["A"]));
        assert_eq!(record["failed_node"], Value::Null);

        let fail_inner: Arc<dyn ExecutableStep> = Arc::new(NamespacedWrapper {
            node_id: "Z".to_string(),
            inner: templated(
                "Z",
                Arc::new(MockNode::failing_fatal("Z", "value", "boom")),
                Map::new(),
            ),
        });
        let fail_wrapper = InstrumentedWrapper { node_id: "Z".to_string(), is_batch: false, inner: fail_inner };
        assert!(fail_wrapper.run(&mut store).await.is_err());

        let record = store.get("__execution__").unwrap();
        assert_eq!(record["failed_node"], json!("Z"));
    }

    #[tokio::test]
    async fn result_checked_wrapper_raises_on_truthy_error_key() {
        let mut store = SharedStore::new();
        let inner = templated("A", Arc::new(MockNode::returning("A", "error", json!("boom"))), Map::new());
        let namespaced: Arc<dyn ExecutableStep> = Arc::new(NamespacedWrapper { node_id: "A".to_string(), inner });
        let checked = ResultCheckedWrapper { node_id: "A".to_string(), inner: namespaced };

        let err = checked.run(&mut store).await.unwrap_err();
        assert!(matches!(err, EngineError::ResultError { ref node_id, .. } if node_id == "A"));
    }

    #[tokio::test]
    async fn direct_wrapper_writes_to_root_without_namespacing() {
        let mut store = SharedStore::new();
        let inner = templated("A", Arc::new(MockNode::returning("A", "value", json!(7))), Map::new());
        let wrapper = DirectWrapper { node_id: "A".to_string(), inner };
        wrapper.run(&mut store).await.unwrap();

        // With namespacing bypassed the node wrote `value` straight to root,
        // not under an `A` namespace object.
        assert_eq!(store.get("value"), Some(json!(7)));
        assert_eq!(store.get("A"), None);
    }
}
