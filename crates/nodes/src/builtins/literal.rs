use async_trait::async_trait;
use serde_json::{Map, Value};
use store::StoreView;

use crate::error::NodeError;
use crate::node::{Node, DEFAULT_ACTION};

/// Emits its `value` parameter verbatim. `spec.md` §8 scenario S1's node
/// `A`: `value = 42` yields `store["A"] = {value: 42}`.
pub struct LiteralNode;

#[async_trait]
impl Node for LiteralNode {
    async fn prep(&self, _store: &dyn StoreView, params: &Map<String, Value>) -> Result<Value, NodeError> {
        Ok(params.get("value").cloned().unwrap_or(Value::Null))
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
        store.set("value", exec_result);
        Ok(DEFAULT_ACTION.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::SharedStore;

    #[tokio::test]
    async fn emits_its_value_param_natively() {
        let node = LiteralNode;
        let params = Map::from_iter([("value".to_string(), serde_json::json!(42))]);
        let mut store = SharedStore::new();

        let prep = node.prep(&store, &params).await.unwrap();
        let exec = node.exec(&prep).await.unwrap();
        node.post(&mut store, prep, exec).await.unwrap();

        assert_eq!(store.get("value"), Some(serde_json::json!(42)));
    }
}
