//! `nodes` crate — the `Node` trait, built-in node types, and the concrete
//! registry the `ir` crate's validator and the `engine` crate's compiler
//! both consult.

pub mod builtins;
pub mod error;
pub mod mock;
pub mod node;
pub mod registry;

pub use error::NodeError;
pub use mock::{MockBehaviour, MockNode};
pub use node::{Node, DEFAULT_ACTION};
pub use registry::{NodeSpec, ParamSpec, Registry};
