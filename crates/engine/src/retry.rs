//! The retry kernel (`spec.md` §4.5) — a local loop on attempt count, never
//! instance state, so the same node object can be reused across sequential
//! batch iterations and shared across parallel workers (the wrapper chain
//! passes resolved params as an explicit argument rather than mutating
//! shared state — see `spec.md` §9's redesign note — so there is nothing
//! left for a shared retry counter to race on).

use std::time::Duration;

use nodes::{Node, NodeError};
use serde_json::Value;
use tracing::warn;

/// Run `node.exec(prep_result)` up to `max_retries` times (always at least
/// once), sleeping `wait` between failed attempts. `NodeError::Fatal`
/// short-circuits immediately — it is never retried, matching
/// `NodeError`'s own contract (`nodes::NodeError`: "`Fatal` — the execution
/// is immediately marked as failed"). Only `NodeError::Retryable` consumes
/// attempt budget; once attempts are exhausted, the last retryable failure
/// is handed to `node.exec_fallback`, which may recover it into a result
/// value or re-raise.
pub async fn exec_with_retry(
    node: &dyn Node,
    prep_result: &Value,
    max_retries: u32,
    wait: Duration,
) -> Result<Value, NodeError> {
    let max_retries = max_retries.max(1);
    let mut attempt = 0u32;

    loop {
        match node.exec(prep_result).await {
            Ok(value) => return Ok(value),
            Err(err @ NodeError::Fatal(_)) => return Err(err),
            Err(err @ NodeError::Retryable(_)) => {
                attempt += 1;
                if attempt >= max_retries {
                    return node.exec_fallback(prep_result, err).await;
                }
                warn!(attempt, max_retries, error = %err, "retryable node error, retrying");
                if !wait.is_zero() {
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicU32, Ordering};
    use store::StoreView;

    struct FlakyNode {
        fail_until: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Node for FlakyNode {
        async fn prep(&self, _store: &dyn StoreView, _params: &Map<String, Value>) -> Result<Value, NodeError> {
            Ok(Value::Null)
        }

        async fn exec(&self, _prep_result: &Value) -> Result<Value, NodeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.fail_until {
                Err(NodeError::Retryable(format!("attempt {n} failed")))
            } else {
                Ok(json!({"ok": true}))
            }
        }

        async fn post(
            &self,
            _store: &mut dyn StoreView,
            _prep_result: Value,
            exec_result: Value,
        ) -> Result<String, NodeError> {
            Ok(exec_result.to_string())
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures_within_budget() {
        let node = FlakyNode { fail_until: 2, calls: AtomicU32::new(0) };
        let result = exec_with_retry(&node, &Value::Null, 3, Duration::ZERO).await;
        assert_eq!(result.unwrap(), json!({"ok": true}));
        assert_eq!(node.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn falls_back_once_retries_are_exhausted() {
        let node = FlakyNode { fail_until: 5, calls: AtomicU32::new(0) };
        let result = exec_with_retry(&node, &Value::Null, 3, Duration::ZERO).await;
        assert!(result.is_err());
        assert_eq!(node.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn max_retries_one_never_retries() {
        let node = FlakyNode { fail_until: 1, calls: AtomicU32::new(0) };
        let result = exec_with_retry(&node, &Value::Null, 1, Duration::ZERO).await;
        assert!(result.is_err());
        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
    }

    struct AlwaysFatal {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Node for AlwaysFatal {
        async fn prep(&self, _store: &dyn StoreView, _params: &Map<String, Value>) -> Result<Value, NodeError> {
            Ok(Value::Null)
        }

        async fn exec(&self, _prep_result: &Value) -> Result<Value, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(NodeError::Fatal("unrecoverable".to_string()))
        }

        async fn post(
            &self,
            _store: &mut dyn StoreView,
            _prep_result: Value,
            exec_result: Value,
        ) -> Result<String, NodeError> {
            Ok(exec_result.to_string())
        }
    }

    #[tokio::test]
    async fn fatal_error_short_circuits_without_consuming_retry_budget() {
        let node = AlwaysFatal { calls: AtomicU32::new(0) };
        let result = exec_with_retry(&node, &Value::Null, 5, Duration::ZERO).await;
        assert!(matches!(result, Err(NodeError::Fatal(_))));
        assert_eq!(node.calls.load(Ordering::SeqCst), 1);
    }
}
