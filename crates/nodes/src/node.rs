//! The `Node` trait — the contract every concrete node type fulfils
//! (`spec.md` §4.4 "Concrete", §6 "Node implementation contract").
//!
//! A node's lifecycle has three phases plus an optional fallback:
//! `prep` reads the store and the node's resolved parameters into a
//! `prep_result`; `exec` does the (possibly failing, possibly retried) work;
//! `post` writes the result back into the store and names the outgoing
//! action. Retry wraps `exec` alone — see `engine`'s retry kernel.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use store::StoreView;

use crate::error::NodeError;

/// The action a node hands to the compiler's successor chain. MVP graphs
/// are linear, so `"default"` is the only action ever produced by the
/// built-in nodes, but the field exists for forward compatibility with
/// conditional branching.
pub const DEFAULT_ACTION: &str = "default";

#[async_trait]
pub trait Node: Send + Sync {
    /// Maximum `exec` attempts (including the first), per `spec.md` §4.5.
    /// A batch wrapper may override this per-node; see `engine::batch`.
    fn max_retries(&self) -> u32 {
        1
    }

    /// Wait between failed attempts.
    fn retry_wait(&self) -> Duration {
        Duration::ZERO
    }

    /// Read the store (this node's namespace, then root) and the resolved
    /// parameter map for this invocation into a `prep_result`.
    async fn prep(&self, store: &dyn StoreView, params: &Map<String, Value>) -> Result<Value, NodeError>;

    /// Do the node's actual work. Never touches the store directly — pure
    /// with respect to `prep_result` (the retry kernel may call this more
    /// than once with the same input).
    async fn exec(&self, prep_result: &Value) -> Result<Value, NodeError>;

    /// Write `exec_result` (or whatever derived shape the node wants) into
    /// its own namespace and return the outgoing action name.
    async fn post(
        &self,
        store: &mut dyn StoreView,
        prep_result: Value,
        exec_result: Value,
    ) -> Result<String, NodeError>;

    /// Called once retries are exhausted. The default re-raises; nodes that
    /// want to degrade gracefully (emit an `error`-valued result instead of
    /// failing the run) override this.
    async fn exec_fallback(&self, _prep_result: &Value, error: NodeError) -> Result<Value, NodeError> {
        Err(error)
    }
}
