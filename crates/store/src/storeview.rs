//! A small abstraction over "something a node can read and write", so the
//! node contract (in the `nodes` crate) doesn't need to care whether
//! `enable_namespacing` put a [`NamespacedStore`] proxy in front of the root
//! [`SharedStore`] or not — both implement it.

use serde_json::Value;

use crate::namespaced::NamespacedStore;
use crate::resolver::Lookup;
use crate::shared::SharedStore;

pub trait StoreView: Lookup {
    fn set(&mut self, key: &str, value: Value);
}

impl StoreView for SharedStore {
    fn set(&mut self, key: &str, value: Value) {
        SharedStore::set(self, key, value);
    }
}

impl StoreView for NamespacedStore<'_> {
    fn set(&mut self, key: &str, value: Value) {
        NamespacedStore::set(self, key, value);
    }
}
