//! `engine` crate — the node wrapper chain, retry kernel, batch engine,
//! compiler, and executor (`spec.md` §4.4–§4.8).

pub mod batch;
pub mod compiler;
pub mod config;
pub mod error;
pub mod executor;
mod result;
pub mod retry;
pub mod wrapper;

pub use batch::BatchWrapper;
pub use compiler::{compile, CompiledFlow, CompiledNode};
pub use config::ExecutorConfig;
pub use error::EngineError;
pub use executor::Executor;
pub use retry::exec_with_retry;
pub use wrapper::{
    DirectWrapper, ExecutableStep, InstrumentedWrapper, NamespacedWrapper, ResultCheckedWrapper, TemplatedNode,
};
