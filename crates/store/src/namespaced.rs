//! Per-node view over the shared store (§4.3).
//!
//! Reads check the node's own namespace first, then the root. Writes land
//! in the node's own namespace, except `__`-prefixed keys, which write
//! through to the root. The proxy is a view, not a copy — it borrows the
//! underlying [`SharedStore`] for the duration of a node's `_run`.

use serde_json::{Map, Value};

use crate::resolver::Lookup;
use crate::shared::{is_reserved, SharedStore};

pub struct NamespacedStore<'a> {
    inner: &'a mut SharedStore,
    node_id: String,
}

impl<'a> NamespacedStore<'a> {
    pub fn new(inner: &'a mut SharedStore, node_id: impl Into<String>) -> Self {
        Self {
            inner,
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn own_namespace(&self) -> Map<String, Value> {
        match self.inner.get(&self.node_id) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Own namespace first, then root. Never searches sibling namespaces.
    pub fn get(&self, key: &str) -> Option<Value> {
        if let Some(v) = self.own_namespace().get(key) {
            return Some(v.clone());
        }
        self.inner.get(key)
    }

    /// `__`-prefixed keys write through to the root (and are aliased across
    /// batch-item copies); everything else lands in this node's own
    /// namespace, created lazily on first write.
    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if is_reserved(&key) {
            self.inner.set(key, value);
            return;
        }
        let mut ns = self.own_namespace();
        ns.insert(key, value);
        self.inner.set(self.node_id.clone(), Value::Object(ns));
    }

    /// Union of own-namespace keys and root keys, excluding this node's own
    /// namespace entry (a node never enumerates itself as a nested key).
    pub fn keys(&self) -> Vec<String> {
        let mut ks: Vec<String> = self.own_namespace().keys().cloned().collect();
        ks.extend(
            self.inner
                .keys()
                .into_iter()
                .filter(|k| k != &self.node_id),
        );
        ks
    }

    /// Replace this node's whole namespace object (used by the wrapper
    /// chain to commit a node's `post` output in one write).
    pub fn set_namespace(&mut self, value: Value) {
        self.inner.set(self.node_id.clone(), value);
    }

    pub fn root(&self) -> &SharedStore {
        self.inner
    }

    pub fn root_mut(&mut self) -> &mut SharedStore {
        self.inner
    }
}

/// Lets the template resolver run against a node's own view exactly as it
/// would against the bare root — callers that only hold a [`Lookup`] (e.g.
/// the compiler's per-node templated wrapper) don't need to know which.
impl Lookup for NamespacedStore<'_> {
    fn get_head(&self, head: &str) -> Option<Value> {
        self.get(head)
    }

    fn known_heads(&self) -> Vec<String> {
        self.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_own_namespace_before_root() {
        let mut store = SharedStore::new();
        store.set("shadowed", json!("root-value"));
        store.set("B", json!({"shadowed": "namespace-value"}));

        let ns = NamespacedStore::new(&mut store, "B");
        assert_eq!(ns.get("shadowed"), Some(json!("namespace-value")));
    }

    #[test]
    fn reads_fall_through_to_root_when_absent_in_namespace() {
        let mut store = SharedStore::new();
        store.set("input_x", json!(42));

        let ns = NamespacedStore::new(&mut store, "B");
        assert_eq!(ns.get("input_x"), Some(json!(42)));
    }

    #[test]
    fn does_not_search_sibling_namespaces() {
        let mut store = SharedStore::new();
        store.set("A", json!({"field": 1}));

        let ns = NamespacedStore::new(&mut store, "B");
        assert_eq!(ns.get("field"), None);
    }

    #[test]
    fn writes_land_in_own_namespace_lazily() {
        let mut store = SharedStore::new();
        {
            let mut ns = NamespacedStore::new(&mut store, "B");
            assert_eq!(ns.get("out"), None);
            ns.set("out", json!(1));
        }
        assert_eq!(store.get("B"), Some(json!({"out": 1})));
    }

    #[test]
    fn reserved_writes_go_through_to_root() {
        let mut store = SharedStore::new();
        {
            let mut ns = NamespacedStore::new(&mut store, "B");
            ns.set("__execution__", json!({"completed_nodes": ["B"]}));
        }
        assert_eq!(store.get("B"), None);
        assert_eq!(
            store.get("__execution__"),
            Some(json!({"completed_nodes": ["B"]}))
        );
    }

    #[test]
    fn keys_exclude_own_namespace_entry() {
        let mut store = SharedStore::new();
        store.set("A", json!({"x": 1}));
        {
            let mut ns = NamespacedStore::new(&mut store, "B");
            ns.set("y", json!(2));
            let keys = ns.keys();
            assert!(keys.contains(&"y".to_string()));
            assert!(keys.contains(&"A".to_string()));
            assert!(!keys.contains(&"B".to_string()));
        }
    }
}
