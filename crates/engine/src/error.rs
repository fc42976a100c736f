//! Runtime error kinds (`spec.md` §7): `batch_items`, `node_exec`,
//! `result_error`, and `timeout` (folded into `node_exec`, as the spec
//! prescribes — a node that times out reports it through the same path as
//! any other exhausted-retry failure). `schema` and `template` errors
//! raised by the static validator are `ir::IrError`, composed in here via
//! `#[from]`; template errors raised at *resolution* time (the store holds
//! different values than the dummy placeholders did) are `Resolve`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The IR failed static validation; the run never started.
    #[error(transparent)]
    Validation(#[from] ir::IrError),

    /// The compiler could not find a constructor for a node's declared
    /// type. Defensive — the validator's layer 3 should already have
    /// rejected this, but the registry used at compile time need not be
    /// the same instance used at validation time.
    #[error("node '{node_id}' has unregistered type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },

    /// A `${...}` reference failed to resolve against the live store.
    #[error("node '{node_id}' param '{param}': {source}")]
    Template {
        node_id: String,
        param: String,
        #[source]
        source: store::ResolveError,
    },

    /// `batch.items` resolved to something other than a JSON array, even
    /// after JSON-array coercion.
    #[error("node '{node_id}' batch.items did not resolve to an array")]
    BatchItemsNotArray { node_id: String },

    /// A node's `exec` failed — fatally, or after exhausting retries.
    #[error("node '{node_id}' failed: {message}")]
    NodeExec { node_id: String, message: String },

    /// A node returned a result mapping with a truthy `error` key.
    #[error("node '{node_id}' returned a result error: {message}")]
    ResultError { node_id: String, message: String },

    /// `fail_fast` batch mode: the first item error, reported with the
    /// node id and the failing index per `spec.md` §7.
    #[error("Batch '{node_id}' failed at item [{index}]: {message}")]
    BatchFailFast {
        node_id: String,
        index: usize,
        message: String,
    },
}

impl EngineError {
    /// The node id this error is attributed to, when it names exactly one
    /// (used by the executor to populate `__execution__.failed_node`).
    pub fn node_id(&self) -> Option<&str> {
        match self {
            EngineError::Validation(_) => None,
            EngineError::UnknownNodeType { node_id, .. }
            | EngineError::Template { node_id, .. }
            | EngineError::BatchItemsNotArray { node_id }
            | EngineError::NodeExec { node_id, .. }
            | EngineError::ResultError { node_id, .. }
            | EngineError::BatchFailFast { node_id, .. } => Some(node_id),
        }
    }
}
