//! Workflow execution engine.
//!
//! `WorkflowExecutor` is the run controller:
//! 1. Creates (or finds) the execution row keyed by the trigger's event id.
//! 2. Loads the graph, checks it is active and owned, and orders the nodes.
//! 3. Folds the context through each node's executor, strictly in order.
//! 4. Replays the whole fold on a retryable failure (up to `max_retries`);
//!    the shared step runner memoizes each completed node, so a replay
//!    resumes at the node that failed.
//! 5. Finalizes the row exactly once as `SUCCESS` or `FAILED`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, field, info, instrument, warn, Span};
use uuid::Uuid;

use nodes::{
    BraceRenderer, Context, Invocation, MemorySubstrate, StepRunner, StepSubstrate,
    TemplateRenderer,
};

use crate::dag::topological_sort;
use crate::error::error_stack;
use crate::models::{Execution, ExecutionStatus, TriggerEvent};
use crate::registry::ExecutorRegistry;
use crate::status::StatusPublisher;
use crate::store::{ExecutionStore, GraphStore};
use crate::EngineError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tuning knobs for the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of times a retryable failure replays the run.
    pub max_retries: u32,
    /// Base delay for exponential back-off between replays.
    pub retry_base_delay: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

impl ExecutorConfig {
    /// Back-off before replay number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

// ---------------------------------------------------------------------------
// Output of a completed execution
// ---------------------------------------------------------------------------

/// The outcome of one trigger event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub event_id: String,
    pub status: ExecutionStatus,
    /// The final context, on success.
    pub output: Option<Value>,
    pub error: Option<String>,
    /// True when the event had already been processed and nothing ran.
    pub replayed: bool,
}

impl ExecutionResult {
    fn stored(row: &Execution) -> Self {
        Self {
            execution_id: row.id,
            event_id: row.event_id.clone(),
            status: row.status,
            output: row.output.clone(),
            error: row.error.clone(),
            replayed: true,
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowExecutor
// ---------------------------------------------------------------------------

/// Runs workflows for trigger events.
///
/// One executor serves every run in the process; runs share no state beyond
/// the stores.
pub struct WorkflowExecutor {
    graphs: Arc<dyn GraphStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: Arc<ExecutorRegistry>,
    publisher: StatusPublisher,
    substrate: Arc<dyn StepSubstrate>,
    templates: Arc<dyn TemplateRenderer>,
    config: ExecutorConfig,
    in_flight: Mutex<HashSet<String>>,
}

impl WorkflowExecutor {
    /// Create an executor with the in-process step substrate, the brace
    /// template renderer and default retry settings.
    pub fn new(
        graphs: Arc<dyn GraphStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: Arc<ExecutorRegistry>,
        publisher: StatusPublisher,
    ) -> Self {
        Self {
            graphs,
            executions,
            registry,
            publisher,
            substrate: Arc::new(MemorySubstrate::new()),
            templates: Arc::new(BraceRenderer),
            config: ExecutorConfig::default(),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_substrate(mut self, substrate: Arc<dyn StepSubstrate>) -> Self {
        self.substrate = substrate;
        self
    }

    #[must_use]
    pub fn with_templates(mut self, templates: Arc<dyn TemplateRenderer>) -> Self {
        self.templates = templates;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run the workflow for `event`.
    ///
    /// An event whose execution already finished is not run again; its
    /// stored outcome is returned with `replayed = true`.
    ///
    /// # Errors
    /// The error that ended the run, after it was stored on the execution
    /// row. Errors raised before the row exists (unknown workflow, store
    /// failure) are returned without a row.
    #[instrument(
        skip(self, event),
        fields(workflow_id = %event.workflow_id, event_id = %event.id, execution_id = field::Empty)
    )]
    pub async fn run(&self, event: &TriggerEvent) -> Result<ExecutionResult, EngineError> {
        let _claim = self.claim(&event.id)?;

        let execution = self
            .executions
            .create_or_get(event.workflow_id, &event.id)
            .await?;
        Span::current().record("execution_id", field::display(execution.id));

        if execution.status.is_terminal() {
            info!(status = %execution.status, "event already processed");
            return Ok(ExecutionResult::stored(&execution));
        }

        let steps = self.substrate.runner_for(&event.id);
        let result = match self.execute_with_retry(event, execution.id, steps.as_ref()).await {
            Ok(output) => self
                .executions
                .mark_succeeded(&event.id, output.clone())
                .await
                .map(|finalized| {
                    if !finalized {
                        warn!("execution was already finalized");
                    }
                    output
                }),
            Err(e) => Err(e),
        };

        match result {
            Ok(output) => {
                info!("workflow execution succeeded");
                self.substrate.release(&event.id);
                Ok(ExecutionResult {
                    execution_id: execution.id,
                    event_id: event.id.clone(),
                    status: ExecutionStatus::Success,
                    output: Some(output),
                    error: None,
                    replayed: false,
                })
            }
            Err(err) => {
                self.record_failure(&event.id, &err).await;
                self.substrate.release(&event.id);
                Err(err)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: failure hook.
    // -----------------------------------------------------------------------

    async fn record_failure(&self, event_id: &str, err: &EngineError) {
        error!(node_id = err.node_id(), error = %err, "workflow execution failed");
        match self
            .executions
            .mark_failed(event_id, &err.to_string(), &error_stack(err))
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("execution was already finalized"),
            Err(e) => error!(error = %e, "failed to record execution failure"),
        }
    }

    // -----------------------------------------------------------------------
    // Internal: replay the run on retryable failures.
    // -----------------------------------------------------------------------

    async fn execute_with_retry(
        &self,
        event: &TriggerEvent,
        execution_id: Uuid,
        steps: &dyn StepRunner,
    ) -> Result<Value, EngineError> {
        let mut attempts = 0u32;

        loop {
            match self.execute_once(event, execution_id, steps).await {
                Ok(context) => return Ok(context.into_value()),

                Err(err) if err.is_retryable() => {
                    attempts += 1;
                    if attempts > self.config.max_retries {
                        return Err(EngineError::RetriesExhausted {
                            attempts,
                            source: Box::new(err),
                        });
                    }

                    let delay = self.config.delay_for(attempts);
                    warn!(
                        attempt = attempts,
                        max_retries = self.config.max_retries,
                        ?delay,
                        error = %err,
                        "retryable failure, replaying run"
                    );
                    tokio::time::sleep(delay).await;
                }

                Err(err) => return Err(err),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Internal: one pass over the graph.
    // -----------------------------------------------------------------------

    async fn execute_once(
        &self,
        event: &TriggerEvent,
        execution_id: Uuid,
        steps: &dyn StepRunner,
    ) -> Result<Context, EngineError> {
        let graph = self.graphs.load_workflow_graph(event.workflow_id).await?;
        let workflow = &graph.workflow;
        if !workflow.active {
            return Err(EngineError::WorkflowInactive(workflow.id));
        }

        let order = topological_sort(&graph.nodes, &graph.connections)?;

        let owner_id = workflow
            .owner_id
            .as_deref()
            .filter(|owner| !owner.trim().is_empty())
            .ok_or(EngineError::MissingOwner(workflow.id))?;

        // Resolve every executor before any node runs.
        let plan = order
            .into_iter()
            .map(|node| {
                self.registry
                    .resolve(&node.node_type)
                    .map(|(node_type, executor)| (node, node_type, executor))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut context = Context::from_value(event.initial_data.clone())
            .map_err(|e| EngineError::InvalidInitialData(e.message().to_owned()))?;

        info!(
            "graph ordered, executing {} nodes: {:?}",
            plan.len(),
            plan.iter().map(|(n, _, _)| n.id.as_str()).collect::<Vec<_>>()
        );

        let status = self.publisher.for_execution(execution_id);

        for (node, node_type, executor) in plan {
            let invocation = Invocation {
                node_id: &node.id,
                workflow_id: Some(workflow.id),
                execution_id,
                owner_id,
                raw_config: &node.data,
                incoming_connections: graph.incoming_connections(&node.id),
                steps,
                status: &status,
                templates: self.templates.as_ref(),
            };

            // A node that completed on an earlier attempt is replayed from its
            // memoized output and publishes no statuses.
            let step = invocation.step_name("node");
            let before = context.clone();
            let effect = async move {
                executor
                    .execute(&invocation, context)
                    .await
                    .map(Context::into_value)
            };
            let after = steps
                .run_step(&step, Box::pin(effect))
                .await
                .and_then(Context::from_value)
                .map_err(|source| EngineError::Node {
                    node_id: node.id.clone(),
                    source,
                })?;
            ensure_append_only(&node.id, &before, &after)?;

            debug!(node_id = %node.id, %node_type, "node succeeded");
            context = after;
        }

        Ok(context)
    }

    // -----------------------------------------------------------------------
    // Internal: one in-process run per event.
    // -----------------------------------------------------------------------

    fn claim(&self, event_id: &str) -> Result<Claim<'_>, EngineError> {
        let mut in_flight = lock(&self.in_flight);
        if !in_flight.insert(event_id.to_owned()) {
            return Err(EngineError::AlreadyRunning(event_id.to_owned()));
        }
        Ok(Claim {
            set: &self.in_flight,
            event_id: event_id.to_owned(),
        })
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Releases an event id from the in-flight set on drop.
struct Claim<'a> {
    set: &'a Mutex<HashSet<String>>,
    event_id: String,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.event_id);
    }
}

/// Every key present before a node ran must still be present, unchanged.
fn ensure_append_only(node_id: &str, before: &Context, after: &Context) -> Result<(), EngineError> {
    for (key, value) in before.as_map() {
        if after.get(key) != Some(value) {
            return Err(EngineError::ContextConflict {
                node_id: node_id.to_owned(),
                key: key.clone(),
            });
        }
    }
    Ok(())
}
