//! IR-level error types — the `schema`, `template`, and graph-shape error
//! kinds from `spec.md` §7. `batch_items`, `node_exec`, `result_error`, and
//! `timeout` are runtime kinds owned by the `engine` crate.

use store::TemplateSyntaxError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IrError {
    // ---- layer 1: schema ----
    #[error("schema error: {message}")]
    Schema { message: String },

    // ---- layer 2: identifier ----
    #[error("node id '{0}' does not match ^[a-z0-9_]+(-[a-z0-9_]+)*$")]
    InvalidIdentifier(String),

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    // ---- layer 3: node types ----
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    // ---- layer 4: graph shape ----
    #[error("edge references unknown node '{node_id}' ({side} side)")]
    UnknownNodeReference { node_id: String, side: &'static str },

    #[error("workflow graph contains a cycle")]
    CycleDetected,

    #[error("node '{node_id}' param '{param}' forward-references node '{referenced}', which is declared later")]
    ForwardReference {
        node_id: String,
        param: String,
        referenced: String,
    },

    // ---- layer 5: templates ----
    #[error("node '{node_id}' param '{param}' has a malformed template: {source}")]
    MalformedTemplate {
        node_id: String,
        param: String,
        #[source]
        source: TemplateSyntaxError,
    },

    #[error(
        "node '{node_id}' param '{param}' references unknown identifier '{reference}'; known identifiers: {available:?}"
    )]
    UnknownTemplateHead {
        node_id: String,
        param: String,
        reference: String,
        available: Vec<String>,
    },

    #[error(
        "node '{node_id}' param '{param}' references '{reference}', which has no known output '{field}'; available outputs of '{head}': {available:?}"
    )]
    UnknownTemplateField {
        node_id: String,
        param: String,
        reference: String,
        head: String,
        field: String,
        available: Vec<String>,
    },

    #[error("output '{name}' source is invalid: {source}")]
    InvalidOutputSource {
        name: String,
        #[source]
        source: Box<IrError>,
    },

    #[error("start_node '{0}' is not a declared node")]
    UnknownStartNode(String),
}

/// Non-fatal findings from layer 6 (unknown params). Never blocks
/// execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownParamWarning {
    pub node_id: String,
    pub param: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for UnknownParamWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.suggestion {
            Some(s) => write!(
                f,
                "node '{}' has unknown param '{}' — did you mean '{}'?",
                self.node_id, self.param, s
            ),
            None => write!(f, "node '{}' has unknown param '{}'", self.node_id, self.param),
        }
    }
}
