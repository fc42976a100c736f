//! `MockNode` — a test double for [`Node`], adapted from the project's
//! original `ExecutableNode` mock to the prep/exec/post lifecycle. Used
//! throughout the `engine` crate's wrapper-chain and batch-engine tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use store::StoreView;

use crate::error::NodeError;
use crate::node::{Node, DEFAULT_ACTION};

/// Behaviour injected into `MockNode` at construction time.
pub enum MockBehaviour {
    /// Always succeed, writing this value under `out_key`.
    ReturnValue(Value),
    /// Always fail `exec` with a `Retryable` error.
    FailRetryable(String),
    /// Always fail `exec` with a `Fatal` error.
    FailFatal(String),
    /// Fail `exec` on the first `n` calls, then succeed with the value.
    FailThenSucceed { failures: usize, value: Value },
}

/// A mock node that records every `prep_result` it receives and behaves
/// per its configured [`MockBehaviour`].
pub struct MockNode {
    pub name: String,
    pub out_key: String,
    pub behaviour: MockBehaviour,
    pub calls: Arc<Mutex<Vec<Value>>>,
    attempt: Mutex<usize>,
    max_retries: u32,
    retry_wait: Duration,
}

impl MockNode {
    pub fn returning(name: impl Into<String>, out_key: impl Into<String>, value: Value) -> Self {
        Self::new(name, out_key, MockBehaviour::ReturnValue(value))
    }

    pub fn failing_fatal(name: impl Into<String>, out_key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(name, out_key, MockBehaviour::FailFatal(msg.into()))
    }

    pub fn failing_retryable(name: impl Into<String>, out_key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::new(name, out_key, MockBehaviour::FailRetryable(msg.into()))
    }

    pub fn failing_then_succeeding(
        name: impl Into<String>,
        out_key: impl Into<String>,
        failures: usize,
        value: Value,
    ) -> Self {
        Self::new(name, out_key, MockBehaviour::FailThenSucceed { failures, value })
    }

    fn new(name: impl Into<String>, out_key: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            out_key: out_key.into(),
            behaviour,
            calls: Arc::new(Mutex::new(Vec::new())),
            attempt: Mutex::new(0),
            max_retries: 1,
            retry_wait: Duration::ZERO,
        }
    }

    pub fn with_retries(mut self, max_retries: u32, retry_wait: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_wait = retry_wait;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Node for MockNode {
    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    fn retry_wait(&self) -> Duration {
        self.retry_wait
    }

    async fn prep(&self, _store: &dyn StoreView, params: &Map<String, Value>) -> Result<Value, NodeError> {
        let input = Value::Object(params.clone());
        self.calls.lock().unwrap().push(input.clone());
        Ok(input)
    }

    async fn exec(&self, prep_result: &Value) -> Result<Value, NodeError> {
        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
            MockBehaviour::FailThenSucceed { failures, value } => {
                let mut attempt = self.attempt.lock().unwrap();
                *attempt += 1;
                if *attempt <= *failures {
                    Err(NodeError::Retryable(format!(
                        "{}: attempt {} of {} configured failures",
                        self.name, attempt, failures
                    )))
                } else {
                    let _ = prep_result;
                    Ok(value.clone())
                }
            }
        }
    }

    async fn post(
        &self,
        store: &mut dyn StoreView,
        _prep_result: Value,
        exec_result: Value,
    ) -> Result<String, NodeError> {
        store.set(&self.out_key, exec_result);
        Ok(DEFAULT_ACTION.to_string())
    }
}
