//! The step-execution substrate contract.
//!
//! Executors never perform side effects directly; they hand them to a
//! [`StepRunner`] under a stable step name. The runner executes each named
//! step at most effectively once per run and replays the memoized result
//! when the run is retried.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::NodeError;

/// A boxed unit of side-effecting work.
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, NodeError>> + Send + 'a>>;

/// Durable step execution for a single run.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run `step` unless a result for `name` was already recorded, in which
    /// case the recorded result is returned and `step` is dropped unpolled.
    async fn run_step(&self, name: &str, step: StepFuture<'_>) -> Result<Value, NodeError>;

    /// Suspend the run for `duration`; replays of a completed sleep return
    /// immediately.
    async fn sleep(&self, name: &str, duration: Duration) -> Result<(), NodeError>;
}

/// Hands out one [`StepRunner`] per run key.
///
/// The run key is the triggering event's idempotency key, so every
/// re-delivery and retry of the same logical occurrence shares memos.
pub trait StepSubstrate: Send + Sync {
    fn runner_for(&self, run_key: &str) -> Arc<dyn StepRunner>;

    /// Drop any state kept for a finished run.
    fn release(&self, _run_key: &str) {}
}

// ---------------------------------------------------------------------------
// In-process substrate
// ---------------------------------------------------------------------------

/// Memoizing runner that keeps step results in memory.
///
/// Survives retries within one process; it does not survive restarts.
#[derive(Debug, Default)]
pub struct MemoryStepRunner {
    completed: Mutex<HashMap<String, Value>>,
    executed: Mutex<Vec<String>>,
}

impl MemoryStepRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of steps whose work actually ran, in execution order.
    pub fn executed_steps(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn recorded(&self, name: &str) -> Option<Value> {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn record(&self, name: &str, value: Value) {
        self.completed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), value);
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(name.to_owned());
    }
}

#[async_trait]
impl StepRunner for MemoryStepRunner {
    async fn run_step(&self, name: &str, step: StepFuture<'_>) -> Result<Value, NodeError> {
        if let Some(value) = self.recorded(name) {
            debug!(step = name, "replaying memoized step");
            return Ok(value);
        }
        let value = step.await?;
        self.record(name, value.clone());
        Ok(value)
    }

    async fn sleep(&self, name: &str, duration: Duration) -> Result<(), NodeError> {
        let key = format!("sleep:{name}");
        if self.recorded(&key).is_some() {
            debug!(step = name, "sleep already completed");
            return Ok(());
        }
        tokio::time::sleep(duration).await;
        self.record(&key, Value::Null);
        Ok(())
    }
}

/// Substrate backed by [`MemoryStepRunner`]s keyed by run key.
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    runners: Mutex<HashMap<String, Arc<MemoryStepRunner>>>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The concrete runner for `run_key`, if one was handed out.
    pub fn runner(&self, run_key: &str) -> Option<Arc<MemoryStepRunner>> {
        self.runners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(run_key)
            .cloned()
    }
}

impl StepSubstrate for MemorySubstrate {
    fn runner_for(&self, run_key: &str) -> Arc<dyn StepRunner> {
        let mut runners = self.runners.lock().unwrap_or_else(PoisonError::into_inner);
        let runner = runners
            .entry(run_key.to_owned())
            .or_insert_with(|| Arc::new(MemoryStepRunner::new()));
        Arc::clone(runner) as Arc<dyn StepRunner>
    }

    fn release(&self, run_key: &str) {
        self.runners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(run_key);
    }
}
