//! Postgres-backed stores over the `db` crate's repositories.

use std::collections::BTreeMap;

use async_trait::async_trait;
use db::models::{ConnectionRow, ExecutionRow, NodeRow, WorkflowRow};
use db::repository::{executions as exec_repo, workflows as wf_repo};
use db::DbPool;
use nodes::NodeStatus;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use super::{CronTriggerDefinition, ExecutionStore, GraphStore};
use crate::models::{
    Connection, Execution, NodeDefinition, NodeStatusEntry, Position, Workflow, WorkflowGraph,
};
use crate::EngineError;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn workflow_from_row(row: WorkflowRow) -> Workflow {
    Workflow {
        id: row.id,
        name: row.name,
        owner_id: row.user_id,
        active: row.active,
    }
}

fn node_from_row(row: NodeRow) -> NodeDefinition {
    NodeDefinition {
        id: row.id,
        workflow_id: row.workflow_id,
        node_type: row.node_type,
        data: row.data,
        position: Position {
            x: row.position_x,
            y: row.position_y,
        },
    }
}

fn connection_from_row(row: ConnectionRow) -> Connection {
    Connection {
        id: row.id,
        workflow_id: row.workflow_id,
        from_node_id: row.from_node_id,
        to_node_id: row.to_node_id,
        from_output: row.from_output,
        to_input: row.to_input,
    }
}

fn execution_from_row(row: ExecutionRow) -> Result<Execution, EngineError> {
    let status = row.status.parse().map_err(EngineError::InvalidRecord)?;
    let node_status: BTreeMap<String, NodeStatusEntry> = serde_json::from_value(row.node_status)
        .map_err(|e| EngineError::InvalidRecord(format!("execution {} node_status: {e}", row.id)))?;
    Ok(Execution {
        id: row.id,
        workflow_id: row.workflow_id,
        event_id: row.event_id,
        status,
        error: row.error,
        error_stack: row.error_stack,
        started_at: row.started_at,
        completed_at: row.completed_at,
        output: row.output,
        node_status,
    })
}

// ---------------------------------------------------------------------------
// GraphStore
// ---------------------------------------------------------------------------

#[async_trait]
impl GraphStore for PgStore {
    async fn load_workflow_graph(&self, workflow_id: Uuid) -> Result<WorkflowGraph, EngineError> {
        let workflow = self
            .load_workflow(workflow_id)
            .await?
            .ok_or(EngineError::WorkflowNotFound(workflow_id))?;
        let nodes = wf_repo::list_nodes(&self.pool, workflow_id).await?;
        let connections = wf_repo::list_connections(&self.pool, workflow_id).await?;

        Ok(WorkflowGraph {
            workflow,
            nodes: nodes.into_iter().map(node_from_row).collect(),
            connections: connections.into_iter().map(connection_from_row).collect(),
        })
    }

    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, EngineError> {
        match wf_repo::get_workflow(&self.pool, workflow_id).await {
            Ok(row) => Ok(Some(workflow_from_row(row))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn cron_triggers(&self) -> Result<Vec<CronTriggerDefinition>, EngineError> {
        let rows = wf_repo::list_active_cron_nodes(&self.pool).await?;
        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(expression) = row.data.get("cronExpression").and_then(Value::as_str) else {
                warn!(node_id = %row.id, workflow_id = %row.workflow_id, "cron trigger without expression");
                continue;
            };
            found.push(CronTriggerDefinition {
                workflow_id: row.workflow_id,
                node_id: row.id.clone(),
                cron_expression: expression.to_owned(),
                timezone: row.data.get("timezone").and_then(Value::as_str).map(str::to_owned),
            });
        }
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// ExecutionStore
// ---------------------------------------------------------------------------

#[async_trait]
impl ExecutionStore for PgStore {
    async fn create_or_get(&self, workflow_id: Uuid, event_id: &str) -> Result<Execution, EngineError> {
        if let Some(row) = exec_repo::create_execution(&self.pool, workflow_id, event_id).await? {
            return execution_from_row(row);
        }
        // Either the event already has a row or the workflow is missing.
        match exec_repo::get_execution_by_event(&self.pool, event_id).await? {
            Some(row) => execution_from_row(row),
            None => Err(EngineError::WorkflowNotFound(workflow_id)),
        }
    }

    async fn get(&self, execution_id: Uuid) -> Result<Option<Execution>, EngineError> {
        exec_repo::get_execution(&self.pool, execution_id)
            .await?
            .map(execution_from_row)
            .transpose()
    }

    async fn get_by_event(&self, event_id: &str) -> Result<Option<Execution>, EngineError> {
        exec_repo::get_execution_by_event(&self.pool, event_id)
            .await?
            .map(execution_from_row)
            .transpose()
    }

    async fn merge_node_status(
        &self,
        execution_id: Uuid,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<(), EngineError> {
        exec_repo::merge_node_status(&self.pool, execution_id, node_id, status.as_str()).await?;
        Ok(())
    }

    async fn mark_succeeded(&self, event_id: &str, output: Value) -> Result<bool, EngineError> {
        Ok(exec_repo::mark_succeeded(&self.pool, event_id, output).await?)
    }

    async fn mark_failed(&self, event_id: &str, error: &str, error_stack: &str) -> Result<bool, EngineError> {
        Ok(exec_repo::mark_failed(&self.pool, event_id, error, error_stack).await?)
    }

    async fn list_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Execution>, EngineError> {
        exec_repo::list_executions(&self.pool, workflow_id)
            .await?
            .into_iter()
            .map(execution_from_row)
            .collect()
    }
}
