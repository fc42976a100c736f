//! `store` crate — the shared key-value store, the per-node namespaced
//! view over it, and the `${...}` template resolver.

pub mod namespaced;
pub mod resolver;
pub mod shared;
pub mod storeview;
pub mod template;

pub use namespaced::NamespacedStore;
pub use resolver::{resolve_value, coerce_batch_items, Lookup, ResolutionMode, ResolveError};
pub use shared::{is_reserved, SharedStore};
pub use storeview::StoreView;
pub use template::{parse_reference, scan, PathSegment, ScanItem, TemplateRef, TemplateSyntaxError};
