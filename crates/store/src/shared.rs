//! The shared key-value store that backs a single workflow execution.
//!
//! Three key classes coexist (see `spec.md` §3): workflow-root keys,
//! per-node namespaces (themselves ordinary root keys holding an object),
//! and `__`-prefixed reserved keys. Reserved keys live behind an `Arc<Mutex<_>>`
//! so that cloning the store (the batch engine's per-item "shallow copy",
//! §4.6) duplicates ordinary keys but keeps reserved trackers aliased and
//! safely mutable from concurrent batch workers.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::resolver::Lookup;

/// `true` for keys beginning with `__` — never namespaced, shared across
/// the whole run and across batch-item copies.
pub fn is_reserved(key: &str) -> bool {
    key.starts_with("__")
}

/// The root store for one workflow execution.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    root: HashMap<String, Value>,
    reserved: Arc<Mutex<HashMap<String, Value>>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with the workflow's initial parameter map.
    pub fn with_inputs(inputs: Map<String, Value>) -> Self {
        let mut store = Self::new();
        for (k, v) in inputs {
            store.set(k, v);
        }
        store
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        if is_reserved(key) {
            self.reserved.lock().unwrap().get(key).cloned()
        } else {
            self.root.get(key).cloned()
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        if is_reserved(&key) {
            self.reserved.lock().unwrap().insert(key, value);
        } else {
            self.root.insert(key, value);
        }
    }

    /// Append `value` to the reserved list tracker at `key`, creating it as
    /// an empty array on first use. No-op (besides creation) if `key` isn't
    /// reserved or already holds a non-array value.
    pub fn append_reserved(&self, key: &str, value: Value) {
        if !is_reserved(key) {
            return;
        }
        let mut guard = self.reserved.lock().unwrap();
        let entry = guard.entry(key.to_string()).or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = entry {
            arr.push(value);
        }
    }

    /// Union of all root keys and all reserved keys.
    pub fn keys(&self) -> Vec<String> {
        let mut ks: Vec<String> = self.root.keys().cloned().collect();
        ks.extend(self.reserved.lock().unwrap().keys().cloned());
        ks
    }

    /// A snapshot of the entire store (root + reserved merged) as one JSON
    /// object — used by the instrumented wrapper's "after" trace capture
    /// and by output projection.
    pub fn snapshot(&self) -> Map<String, Value> {
        let mut out = Map::with_capacity(self.root.len());
        for (k, v) in &self.root {
            out.insert(k.clone(), v.clone());
        }
        for (k, v) in self.reserved.lock().unwrap().iter() {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    /// A fresh, independent store sharing only the reserved trackers with
    /// `self` — the per-item context the batch engine hands to each item's
    /// wrapper chain invocation (§4.6 "shallow copy").
    pub fn shallow_copy(&self) -> Self {
        self.clone()
    }

    /// Remove a root-level key entirely. Used by the batch engine to reset
    /// a per-item copy's namespace entry between retry attempts so the next
    /// attempt starts clean. No-op for reserved keys.
    pub fn clear(&mut self, key: &str) {
        if !is_reserved(key) {
            self.root.remove(key);
        }
    }
}

impl Lookup for SharedStore {
    fn get_head(&self, head: &str) -> Option<Value> {
        self.get(head)
    }

    fn known_heads(&self) -> Vec<String> {
        self.keys()
    }
}
