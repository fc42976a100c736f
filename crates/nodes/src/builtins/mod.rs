//! Built-in node types used in the spec's own worked scenarios (S1–S6) and
//! available to any workflow via the registry's default type names.

mod literal;
mod passthrough;

pub use literal::LiteralNode;
pub use passthrough::PassthroughNode;
