//! The concrete node-type registry — constructors plus the declared
//! parameter/output interface each type publishes (`spec.md` §6 "Registry
//! contract"). Implements [`ir::RegistryView`] so the validator can consult
//! it without depending on this crate.

use std::collections::HashMap;
use std::sync::Arc;

use crate::builtins::{LiteralNode, PassthroughNode};
use crate::node::Node;

/// One declared parameter of a node type.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub description: &'static str,
    pub required: bool,
}

impl ParamSpec {
    pub fn new(name: &str, description: &'static str, required: bool) -> Self {
        Self {
            name: name.to_string(),
            description,
            required,
        }
    }
}

/// Everything the registry publishes about one node type.
pub struct NodeSpec {
    pub name: String,
    pub params: Vec<ParamSpec>,
    pub outputs: Vec<String>,
    pub construct: fn() -> Arc<dyn Node>,
}

/// Maps registered type names to their spec and constructor.
#[derive(Default)]
pub struct Registry {
    types: HashMap<String, NodeSpec>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with the built-in node types (`literal`,
    /// `passthrough`) used in the spec's own worked scenarios.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        reg.register(NodeSpec {
            name: "literal".to_string(),
            params: vec![ParamSpec::new("value", "the literal value to emit", true)],
            outputs: vec!["value".to_string()],
            construct: || Arc::new(LiteralNode),
        });
        reg.register(NodeSpec {
            name: "passthrough".to_string(),
            params: vec![ParamSpec::new("x", "the value to copy into this node's output", true)],
            outputs: vec!["x".to_string()],
            construct: || Arc::new(PassthroughNode),
        });
        reg
    }

    pub fn register(&mut self, spec: NodeSpec) {
        tracing::debug!(node_type = %spec.name, "registered node type");
        self.types.insert(spec.name.clone(), spec);
    }

    pub fn construct(&self, node_type: &str) -> Option<Arc<dyn Node>> {
        self.types.get(node_type).map(|spec| (spec.construct)())
    }
}

impl ir::RegistryView for Registry {
    fn has_type(&self, node_type: &str) -> bool {
        self.types.contains_key(node_type)
    }

    fn param_names(&self, node_type: &str) -> Option<Vec<String>> {
        self.types
            .get(node_type)
            .map(|spec| spec.params.iter().map(|p| p.name.clone()).collect())
    }

    fn output_fields(&self, node_type: &str) -> Option<Vec<String>> {
        self.types.get(node_type).map(|spec| spec.outputs.clone())
    }
}
