//! Persistence contracts consumed by the engine.
//!
//! The run controller, status publisher and scheduler only talk to these
//! traits. [`MemoryStore`] backs tests and single-process setups;
//! [`PgStore`] maps them onto the `db` crate's repositories.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use nodes::NodeStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::models::{Execution, Workflow, WorkflowGraph};
use crate::EngineError;

/// A cron trigger node found on an active workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronTriggerDefinition {
    pub workflow_id: Uuid,
    pub node_id: String,
    pub cron_expression: String,
    pub timezone: Option<String>,
}

/// Read access to workflow graphs.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] if the id is unknown.
    async fn load_workflow_graph(&self, workflow_id: Uuid) -> Result<WorkflowGraph, EngineError>;

    /// Workflow metadata only; `None` if the id is unknown.
    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, EngineError>;

    /// Cron triggers of every active workflow, used to re-arm schedules at
    /// startup.
    async fn cron_triggers(&self) -> Result<Vec<CronTriggerDefinition>, EngineError>;
}

/// Execution rows. Every write is a targeted update.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Create the `RUNNING` row for `event_id`, or return the existing one.
    ///
    /// # Errors
    /// [`EngineError::WorkflowNotFound`] if the workflow does not exist.
    async fn create_or_get(&self, workflow_id: Uuid, event_id: &str) -> Result<Execution, EngineError>;

    async fn get(&self, execution_id: Uuid) -> Result<Option<Execution>, EngineError>;

    async fn get_by_event(&self, event_id: &str) -> Result<Option<Execution>, EngineError>;

    /// Overwrite one node's entry of the status map, leaving the others.
    async fn merge_node_status(
        &self,
        execution_id: Uuid,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<(), EngineError>;

    /// Finalize a `RUNNING` row as `SUCCESS`. Returns `false` if the row was
    /// missing or already final.
    async fn mark_succeeded(&self, event_id: &str, output: Value) -> Result<bool, EngineError>;

    /// Finalize a `RUNNING` row as `FAILED`. Returns `false` if the row was
    /// missing or already final.
    async fn mark_failed(&self, event_id: &str, error: &str, error_stack: &str) -> Result<bool, EngineError>;

    /// Newest first.
    async fn list_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Execution>, EngineError>;
}
