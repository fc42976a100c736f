//! `ir` crate — the workflow intermediate representation: its schema,
//! normaliser, and six-layer static validator.
//!
//! This crate knows nothing about how nodes actually execute; it depends on
//! [`RegistryView`] as a narrow, abstract window into the `nodes` crate's
//! concrete registry so the dependency edge only ever points one way
//! (`nodes` → `ir`, never back).

pub mod error;
pub mod model;
pub mod normalize;
pub mod registry;
pub mod validate;

pub use error::{IrError, UnknownParamWarning};
pub use model::{
    BatchConfig, Edge, ErrorHandling, InputDecl, Node, OutputDecl, ScalarType, TemplateResolutionMode,
    Workflow, CURRENT_IR_VERSION,
};
pub use normalize::normalize;
pub use registry::{EmptyRegistry, RegistryView};
pub use validate::{validate, ValidationOutcome};
