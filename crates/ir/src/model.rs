//! Core domain models for the workflow intermediate representation.
//!
//! These types are the canonical, normalised shape of a workflow — the
//! source of truth the compiler walks. They deserialise directly from the
//! JSON mapping produced by the (out-of-scope) file-format parser, after
//! [`crate::normalize::normalize`] has run over the raw value.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const CURRENT_IR_VERSION: &str = "1.0";

/// The canonical declarative form of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default = "default_ir_version")]
    pub ir_version: String,
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub inputs: HashMap<String, InputDecl>,
    #[serde(default)]
    pub outputs: HashMap<String, OutputDecl>,
    #[serde(default)]
    pub start_node: Option<String>,
    #[serde(default = "default_true")]
    pub enable_namespacing: bool,
    #[serde(default)]
    pub template_resolution_mode: TemplateResolutionMode,
}

fn default_ir_version() -> String {
    CURRENT_IR_VERSION.to_string()
}

fn default_true() -> bool {
    true
}

impl Workflow {
    /// The node execution actually starts from: `start_node` if set, else
    /// the first declared node.
    pub fn effective_start_node(&self) -> Option<&str> {
        match &self.start_node {
            Some(id) => Some(id.as_str()),
            None => self.nodes.first().map(|n| n.id.as_str()),
        }
    }

    pub fn node_by_id(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn position_of(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.id == id)
    }
}

/// Resolution strictness for `${...}` template expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TemplateResolutionMode {
    #[default]
    Strict,
    Lenient,
}

/// A single step in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier within this workflow (referenced by templates).
    pub id: String,
    /// Maps to a registered node type.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Documentation only; never consulted at runtime.
    #[serde(default)]
    pub purpose: Option<String>,
    /// Parameter map: literal values or template strings.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Present only when this node fans out over a collection.
    #[serde(default)]
    pub batch: Option<BatchConfig>,
}

/// Directed edge from one node to another. Used by validation only — the
/// compiler always links successors in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

/// How a batch node handles a per-item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorHandling {
    #[default]
    FailFast,
    Continue,
}

/// Fan-out configuration attached to a node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Template string matching `^\$\{.+\}$`, resolved to the item collection.
    pub items: String,
    /// Identifier the per-item value is bound to. Default `"item"`.
    #[serde(default = "default_as", rename = "as")]
    pub as_name: String,
    #[serde(default)]
    pub error_handling: ErrorHandling,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_wait: f64,
}

fn default_as() -> String {
    "item".to_string()
}

fn default_max_concurrent() -> u32 {
    10
}

fn default_max_retries() -> u32 {
    1
}

impl BatchConfig {
    pub const MIN_MAX_CONCURRENT: u32 = 1;
    pub const MAX_MAX_CONCURRENT: u32 = 100;
    pub const MIN_MAX_RETRIES: u32 = 1;
    pub const MAX_MAX_RETRIES: u32 = 10;
}

/// Scalar types nameable in `InputDecl`/`OutputDecl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

/// A workflow-level parameter declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputDecl {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(rename = "type", default)]
    pub scalar_type: Option<ScalarType>,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub stdin: bool,
}

/// A projection over node outputs exposed at the workflow boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDecl {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub scalar_type: Option<ScalarType>,
    /// Template expression resolved against the final store.
    pub source: String,
}
