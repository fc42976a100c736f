//! The batch engine (`spec.md` §4.6): fan out one node over a resolved
//! collection, sequentially or in parallel, with isolated per-item store
//! contexts and indexed result ordering.
//!
//! Grounded on the pack's bounded-concurrency executors — the
//! `Semaphore`-gated `JoinSet` loop in `mofa-org-mofa`'s
//! `mofa-kernel/src/message_graph/executor.rs` and
//! `mofa-foundation/src/workflow/executor.rs` — adapted from their
//! frontier/wave dispatch to per-item fan-out with a fixed result slot per
//! index.

use std::sync::Arc;
use std::time::Instant;

use ir::{BatchConfig, ErrorHandling};
use serde_json::{json, Value};
use store::{coerce_batch_items, resolve_value, ResolutionMode, SharedStore, StoreView};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::info;

use crate::error::EngineError;
use crate::result::result_error_message;
use crate::wrapper::ExecutableStep;

/// Wraps the inner `namespaced -> templated -> concrete` chain with the
/// batch fan-out described in `spec.md` §4.6. Lives *outside* the namespace
/// boundary (constructed from the already-namespaced inner step) so the
/// per-item alias write lands at root where the templated wrapper expects
/// it, and *inside* instrumentation so the whole batch reads as one
/// observation (`spec.md` §4.4 "Ordering rationale").
pub struct BatchWrapper {
    pub node_id: String,
    pub config: BatchConfig,
    /// The already-namespaced inner step (`NamespacedWrapper` or
    /// `DirectWrapper` around a [`crate::wrapper::TemplatedNode`]) run once
    /// per item.
    pub inner: Arc<dyn ExecutableStep>,
}

struct ItemOutcome {
    index: usize,
    item: Value,
    namespace: Option<Value>,
    error: Option<String>,
    duration_ms: u64,
}

impl BatchWrapper {
    async fn resolve_items(&self, store: &SharedStore) -> Result<Vec<Value>, EngineError> {
        let template = Value::String(self.config.items.clone());
        let resolved = resolve_value(&template, store, ResolutionMode::Strict).map_err(|source| {
            EngineError::Template {
                node_id: self.node_id.clone(),
                param: "batch.items".to_string(),
                source,
            }
        })?;
        match coerce_batch_items(resolved) {
            Value::Array(items) => Ok(items),
            _ => Err(EngineError::BatchItemsNotArray {
                node_id: self.node_id.clone(),
            }),
        }
    }

    /// Build the per-item store: a shallow copy of `store` (reserved
    /// trackers aliased, everything else isolated) with the item bound at
    /// root under the configured alias and this node's own namespace entry
    /// cleared so the item's run starts clean.
    fn item_context(&self, store: &SharedStore, item: &Value) -> SharedStore {
        let mut copy = store.shallow_copy();
        copy.set(self.config.as_name.clone(), item.clone());
        copy.clear(&self.node_id);
        copy
    }

    async fn run_one(&self, store: &SharedStore, index: usize, item: Value) -> ItemOutcome {
        let mut item_store = self.item_context(store, &item);
        let start = Instant::now();
        let run_result = self.inner.run(&mut item_store).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match run_result {
            Ok(_) => {
                let namespace = item_store.get(&self.node_id);
                let error = namespace.as_ref().and_then(result_error_message);
                ItemOutcome { index, item, namespace, error, duration_ms }
            }
            Err(e) => ItemOutcome {
                index,
                item,
                namespace: None,
                error: Some(e.to_string()),
                duration_ms,
            },
        }
    }
}

#[async_trait::async_trait]
impl ExecutableStep for BatchWrapper {
    fn node_id(&self) -> &str {
        &self.node_id
    }

    async fn run(&self, store: &mut SharedStore) -> Result<String, EngineError> {
        let items = self.resolve_items(store).await?;
        let count = items.len();
        info!(node_id = %self.node_id, count, parallel = self.config.parallel, "starting batch");

        if count == 0 {
            store.set(self.node_id.clone(), empty_batch_result(&self.config));
            return Ok(nodes::DEFAULT_ACTION.to_string());
        }

        let outcomes = if self.config.parallel {
            self.run_parallel(store, items).await?
        } else {
            self.run_sequential(store, items).await?
        };

        let result = assemble_batch_result(&self.config, count, outcomes);
        info!(
            node_id = %self.node_id,
            success_count = %result["success_count"],
            error_count = %result["error_count"],
            "batch finished"
        );
        store.set(self.node_id.clone(), result);
        Ok(nodes::DEFAULT_ACTION.to_string())
    }
}

impl BatchWrapper {
    async fn run_sequential(
        &self,
        store: &SharedStore,
        items: Vec<Value>,
    ) -> Result<Vec<ItemOutcome>, EngineError> {
        let mut outcomes = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let outcome = self.run_one(store, index, item).await;
            if self.config.error_handling == ErrorHandling::FailFast {
                if let Some(message) = &outcome.error {
                    return Err(EngineError::BatchFailFast {
                        node_id: self.node_id.clone(),
                        index: outcome.index,
                        message: message.clone(),
                    });
                }
            }
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// `spec.md` §4.6 parallel mode: a fixed worker pool of `max_concurrent`
    /// gated by a `Semaphore`, items submitted in order, results placed by
    /// index so `results[]` matches input order regardless of completion
    /// order. On `fail_fast`, the first error stops submission of
    /// not-yet-started items; already-spawned tasks are awaited to
    /// completion (external I/O is not interruptible, per `spec.md` §5).
    async fn run_parallel(
        &self,
        store: &SharedStore,
        items: Vec<Value>,
    ) -> Result<Vec<ItemOutcome>, EngineError> {
        let max_concurrent = self.config.max_concurrent.max(1) as usize;
        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut join_set: JoinSet<ItemOutcome> = JoinSet::new();
        let mut first_error: Option<EngineError> = None;
        let mut pending = items.into_iter().enumerate();

        // Prime the pool to capacity; each completion below pulls the next
        // pending item, so the pool stays full until `pending` drains or
        // `fail_fast` stops new submissions.
        for _ in 0..max_concurrent {
            match pending.next() {
                Some((index, item)) => self.spawn_item(&mut join_set, semaphore.clone(), store, index, item),
                None => break,
            }
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            let outcome = joined.map_err(|e| EngineError::NodeExec {
                node_id: self.node_id.clone(),
                message: format!("batch worker task panicked: {e}"),
            })?;

            if self.config.error_handling == ErrorHandling::FailFast && first_error.is_none() {
                if let Some(message) = &outcome.error {
                    first_error = Some(EngineError::BatchFailFast {
                        node_id: self.node_id.clone(),
                        index: outcome.index,
                        message: message.clone(),
                    });
                }
            }
            outcomes.push(outcome);

            if first_error.is_none() {
                if let Some((index, item)) = pending.next() {
                    self.spawn_item(&mut join_set, semaphore.clone(), store, index, item);
                }
            }
        }

        if let Some(err) = first_error {
            return Err(err);
        }
        Ok(outcomes)
    }

    fn spawn_item(
        &self,
        join_set: &mut JoinSet<ItemOutcome>,
        semaphore: Arc<Semaphore>,
        store: &SharedStore,
        index: usize,
        item: Value,
    ) {
        let mut item_store = self.item_context(store, &item);
        let node_id = self.node_id.clone();
        let inner = self.inner.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let start = Instant::now();
            let run_result = inner.run(&mut item_store).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            match run_result {
                Ok(_) => {
                    let namespace = item_store.get(&node_id);
                    let error = namespace.as_ref().and_then(result_error_message);
                    ItemOutcome { index, item, namespace, error, duration_ms }
                }
                Err(e) => ItemOutcome {
                    index,
                    item,
                    namespace: None,
                    error: Some(e.to_string()),
                    duration_ms,
                },
            }
        });
    }
}

fn empty_batch_result(config: &BatchConfig) -> Value {
    json!({
        "results": [],
        "count": 0,
        "success_count": 0,
        "error_count": 0,
        "errors": Value::Null,
        "batch_metadata": batch_metadata(config, &[]),
    })
}

fn batch_metadata(config: &BatchConfig, durations_ms: &[u64]) -> Value {
    let total: u64 = durations_ms.iter().sum();
    let n = durations_ms.len() as u64;
    let avg = if n > 0 { total / n } else { 0 };
    let min = durations_ms.iter().min().copied().unwrap_or(0);
    let max = durations_ms.iter().max().copied().unwrap_or(0);

    json!({
        "parallel": config.parallel,
        "max_concurrent": config.max_concurrent,
        "max_retries": config.max_retries,
        "retry_wait": config.retry_wait,
        "execution_mode": if config.parallel { "parallel" } else { "sequential" },
        "timing": {
            "total_items_ms": total,
            "avg_item_ms": avg,
            "min_item_ms": min,
            "max_item_ms": max,
        },
    })
}

fn assemble_batch_result(config: &BatchConfig, count: usize, mut outcomes: Vec<ItemOutcome>) -> Value {
    outcomes.sort_by_key(|o| o.index);

    let mut results: Vec<Value> = vec![Value::Null; count];
    let mut errors: Vec<Value> = Vec::new();
    let mut durations = Vec::with_capacity(outcomes.len());
    let mut success_count = 0usize;
    let mut error_count = 0usize;

    for outcome in outcomes {
        durations.push(outcome.duration_ms);
        results[outcome.index] = outcome.namespace.clone().unwrap_or(Value::Null);
        match &outcome.error {
            Some(message) => {
                error_count += 1;
                errors.push(json!({
                    "index": outcome.index,
                    "item": outcome.item,
                    "error": message,
                }));
            }
            None => success_count += 1,
        }
    }

    json!({
        "results": results,
        "count": count,
        "success_count": success_count,
        "error_count": error_count,
        "errors": if errors.is_empty() { Value::Null } else { Value::Array(errors) },
        "batch_metadata": batch_metadata(config, &durations),
    })
}

/// Builds a [`BatchWrapper`] from the IR's declared config plus the
/// already-wrapped inner chain.
pub fn compile_batch_wrapper(node_id: String, config: BatchConfig, inner: Arc<dyn ExecutableStep>) -> BatchWrapper {
    BatchWrapper { node_id, config, inner }
}

/// Per-node retry settings a [`BatchConfig`] imposes on its inner node —
/// `spec.md` §9: "batch config overrides the inner node when both are
/// present".
pub fn retry_override(config: &BatchConfig) -> (u32, f64) {
    (config.max_retries, config.retry_wait)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nodes::{MockNode, Node, NodeError};
    use serde_json::Map;
    use store::ResolutionMode;

    use crate::wrapper::{NamespacedWrapper, TemplatedNode};

    fn namespaced_chain(node_id: &str, inner: Arc<dyn Node>) -> Arc<dyn ExecutableStep> {
        let templated = Arc::new(TemplatedNode {
            node_id: node_id.to_string(),
            params: Map::from_iter([("item".to_string(), json!("${item}"))]),
            resolution_mode: ResolutionMode::Strict,
            inner,
            retry_override: None,
        });
        Arc::new(NamespacedWrapper { node_id: node_id.to_string(), inner: templated })
    }

    /// Writes `{value: <its item param>}`, failing when the item is in a
    /// configured set of sentinels — drives S2/S3-style scenarios.
    struct FailOnAny(Vec<Value>);
    #[async_trait]
    impl Node for FailOnAny {
        async fn prep(&self, _s: &dyn StoreView, params: &Map<String, Value>) -> Result<Value, NodeError> {
            Ok(params.get("item").cloned().unwrap_or(Value::Null))
        }
        async fn exec(&self, prep_result: &Value) -> Result<Value, NodeError> {
            if self.0.contains(prep_result) {
                Err(NodeError::Fatal("matched sentinel".to_string()))
            } else {
                Ok(prep_result.clone())
            }
        }
        async fn post(&self, store: &mut dyn StoreView, _prep: Value, exec_result: Value) -> Result<String, NodeError> {
            store.set("value", exec_result);
            Ok(nodes::DEFAULT_ACTION.to_string())
        }
    }

    fn config(parallel: bool, error_handling: ErrorHandling, max_concurrent: u32) -> BatchConfig {
        BatchConfig {
            items: "${items}".to_string(),
            as_name: "item".to_string(),
            error_handling,
            parallel,
            max_concurrent,
            max_retries: 1,
            retry_wait: 0.0,
        }
    }

    #[tokio::test]
    async fn empty_items_yields_zeroed_result() {
        let mut store = SharedStore::new();
        store.set("items", json!([]));
        let inner = namespaced_chain("batch", Arc::new(MockNode::returning("batch", "value", json!(1))));
        let wrapper = compile_batch_wrapper("batch".to_string(), config(false, ErrorHandling::FailFast, 10), inner);
        wrapper.run(&mut store).await.unwrap();
        let out = store.get("batch").unwrap();
        assert_eq!(out["count"], json!(0));
        assert_eq!(out["results"], json!([]));
        assert_eq!(out["errors"], Value::Null);
    }

    #[tokio::test]
    async fn sequential_fail_fast_reports_failing_index() {
        let mut store = SharedStore::new();
        store.set("items", json!([1, 2, 3, 4]));
        let inner = namespaced_chain("batch", Arc::new(FailOnAny(vec![json!(3)])));
        let wrapper = compile_batch_wrapper("batch".to_string(), config(false, ErrorHandling::FailFast, 10), inner);
        let err = wrapper.run(&mut store).await.unwrap_err();
        match err {
            EngineError::BatchFailFast { index, .. } => assert_eq!(index, 2),
            other => panic!("expected BatchFailFast, got {other:?}"),
        }
        // No namespace entry was committed for the failed batch node.
        assert_eq!(store.get("batch"), None);
    }

    #[tokio::test]
    async fn parallel_continue_preserves_order_and_counts() {
        let mut store = SharedStore::new();
        let items: Vec<Value> = (0..10).map(|i| json!(i)).collect();
        store.set("items", Value::Array(items));
        let inner = namespaced_chain("batch", Arc::new(FailOnAny(vec![json!(1), json!(4)])));
        let wrapper = compile_batch_wrapper("batch".to_string(), config(true, ErrorHandling::Continue, 3), inner);
        wrapper.run(&mut store).await.unwrap();

        let out = store.get("batch").unwrap();
        assert_eq!(out["count"], json!(10));
        assert_eq!(out["results"].as_array().unwrap().len(), 10);
        assert_eq!(out["success_count"], json!(8));
        assert_eq!(out["error_count"], json!(2));
        let errors = out["errors"].as_array().unwrap();
        let indices: Vec<u64> = errors.iter().map(|e| e["index"].as_u64().unwrap()).collect();
        assert_eq!(indices, vec![1, 4]);
    }

    #[tokio::test]
    async fn max_concurrent_one_matches_sequential_results() {
        let items: Vec<Value> = (0..5).map(|i| json!(i)).collect();

        let mut seq_store = SharedStore::new();
        seq_store.set("items", Value::Array(items.clone()));
        let seq_chain = namespaced_chain("batch", Arc::new(FailOnAny(vec![])));
        let seq_wrapper = compile_batch_wrapper("batch".to_string(), config(false, ErrorHandling::FailFast, 10), seq_chain);
        seq_wrapper.run(&mut seq_store).await.unwrap();

        let mut par_store = SharedStore::new();
        par_store.set("items", Value::Array(items));
        let par_chain = namespaced_chain("batch", Arc::new(FailOnAny(vec![])));
        let par_wrapper = compile_batch_wrapper("batch".to_string(), config(true, ErrorHandling::FailFast, 1), par_chain);
        par_wrapper.run(&mut par_store).await.unwrap();

        assert_eq!(seq_store.get("batch").unwrap()["results"], par_store.get("batch").unwrap()["results"]);
    }

    #[tokio::test]
    async fn reserved_key_tracker_accumulates_across_items() {
        let mut store = SharedStore::new();
        store.set("items", json!([1, 2]));

        struct Tracker;
        #[async_trait]
        impl Node for Tracker {
            async fn prep(&self, _s: &dyn StoreView, params: &Map<String, Value>) -> Result<Value, NodeError> {
                Ok(params.get("item").cloned().unwrap_or(Value::Null))
            }
            async fn exec(&self, p: &Value) -> Result<Value, NodeError> {
                Ok(p.clone())
            }
            async fn post(&self, store: &mut dyn StoreView, _p: Value, e: Value) -> Result<String, NodeError> {
                use store::Lookup;
                let mut calls = match store.get_head("__llm_calls__") {
                    Some(Value::Array(a)) => a,
                    _ => Vec::new(),
                };
                calls.push(e.clone());
                store.set("__llm_calls__", Value::Array(calls));
                store.set("value", e);
                Ok(nodes::DEFAULT_ACTION.to_string())
            }
        }

        let inner = namespaced_chain("batch", Arc::new(Tracker));
        let wrapper = compile_batch_wrapper("batch".to_string(), config(false, ErrorHandling::FailFast, 10), inner);
        wrapper.run(&mut store).await.unwrap();
        assert_eq!(store.get("__llm_calls__"), Some(json!([1, 2])));
    }
}
