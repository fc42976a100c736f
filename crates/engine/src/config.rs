//! Executor-wide defaults (`spec.md` §9/§11) — the retry policy applied to
//! ordinary nodes, which (unlike batch nodes via [`ir::BatchConfig`]) have
//! no per-node retry knob in the IR at all.
//!
//! Mirrors the teacher's `ExecutorConfig` (`crates/engine/src/executor.rs`:
//! `max_retries` + `retry_base_delay`, with a matching `Default` impl),
//! narrowed to the fields that are not already expressed, with their own
//! defaults, in the IR model (batch concurrency and template resolution
//! mode are per-workflow/per-node IR fields and stay the single source of
//! truth for those — duplicating them here would just be two defaults
//! disagreeing with each other).

use std::time::Duration;

/// Default retry policy for nodes that don't carry a `batch` config.
/// The [`crate::compiler::compile`] step applies this whenever a node has
/// no `batch` block to override it (`spec.md` §9: "batch config overrides
/// the inner node when both are present").
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutorConfig {
    pub default_max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_teacher_values() {
        let config = ExecutorConfig::default();
        assert_eq!(config.default_max_retries, 3);
        assert_eq!(config.retry_base_delay, Duration::from_millis(100));
    }
}
