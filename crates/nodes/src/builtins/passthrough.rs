use async_trait::async_trait;
use serde_json::{Map, Value};
use store::StoreView;

use crate::error::NodeError;
use crate::node::{Node, DEFAULT_ACTION};

/// Copies its `x` parameter into its own output, unchanged. `spec.md` §8
/// scenario S1's node `B`: `x = "${A.value}"` yields `store["B"] = {x: 42}`
/// — the templated wrapper resolves the reference to the native `42`
/// before this node ever sees it.
pub struct PassthroughNode;

#[async_trait]
impl Node for PassthroughNode {
    async fn prep(&self, _store: &dyn StoreView, params: &Map<String, Value>) -> Result<Value, NodeError> {
        Ok(params.get("x").cloned().unwrap_or(Value::Null))
    }

    async fn exec(&self, prep_result: &Value) -> Result<Value, NodeError> {
        Ok(prep_result.clone())
    }

    async fn post(
        &self,
        store: &mut dyn StoreView,
        _prep_result: Value,
        exec_result: Value,
    ) -> Result<String, NodeError> {
        store.set("x", exec_result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::SharedStore;

    #[tokio::test]
    async fn copies_resolved_param_natively() {
        let node = PassthroughNode;
        let params = Map::from_iter([("x".to_string(), serde_json::json!(42))]);
        let mut store = SharedStore::new();

        let prep = node.prep(&store, &params).await.unwrap();
        let exec = node.exec(&prep).await.unwrap();
        node.post(&mut store, prep, exec).await.unwrap();

        assert_eq!(store.get("x"), Some(serde_json::json!(42)));
    }
}
