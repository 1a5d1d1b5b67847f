//! In-memory implementation of both store contracts.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use nodes::{NodeStatus, NodeType};
use serde_json::Value;
use uuid::Uuid;

use super::{CronTriggerDefinition, ExecutionStore, GraphStore};
use crate::models::{Execution, ExecutionStatus, NodeStatusEntry, Workflow, WorkflowGraph};
use crate::EngineError;

#[derive(Debug, Default)]
struct State {
    graphs: HashMap<Uuid, WorkflowGraph>,
    executions: HashMap<Uuid, Execution>,
    by_event: HashMap<String, Uuid>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace a workflow graph.
    pub fn insert_graph(&self, graph: WorkflowGraph) {
        self.lock().graphs.insert(graph.workflow.id, graph);
    }

    /// Returns `false` if the workflow is unknown.
    pub fn set_active(&self, workflow_id: Uuid, active: bool) -> bool {
        match self.lock().graphs.get_mut(&workflow_id) {
            Some(graph) => {
                graph.workflow.active = active;
                true
            }
            None => false,
        }
    }

    pub fn remove_workflow(&self, workflow_id: Uuid) -> Option<WorkflowGraph> {
        self.lock().graphs.remove(&workflow_id)
    }

    /// Every execution row, oldest first.
    pub fn executions(&self) -> Vec<Execution> {
        let mut rows: Vec<Execution> = self.lock().executions.values().cloned().collect();
        rows.sort_by_key(|e| e.started_at);
        rows
    }

    fn finalize(
        &self,
        event_id: &str,
        apply: impl FnOnce(&mut Execution),
    ) -> bool {
        let mut state = self.lock();
        let Some(id) = state.by_event.get(event_id).copied() else {
            return false;
        };
        match state.executions.get_mut(&id) {
            Some(row) if row.status == ExecutionStatus::Running => {
                apply(row);
                row.completed_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn load_workflow_graph(&self, workflow_id: Uuid) -> Result<WorkflowGraph, EngineError> {
        self.lock()
            .graphs
            .get(&workflow_id)
            .cloned()
            .ok_or(EngineError::WorkflowNotFound(workflow_id))
    }

    async fn load_workflow(&self, workflow_id: Uuid) -> Result<Option<Workflow>, EngineError> {
        Ok(self.lock().graphs.get(&workflow_id).map(|g| g.workflow.clone()))
    }

    async fn cron_triggers(&self) -> Result<Vec<CronTriggerDefinition>, EngineError> {
        let state = self.lock();
        let mut found = Vec::new();
        for graph in state.graphs.values().filter(|g| g.workflow.active) {
            for node in &graph.nodes {
                if node.node_type != NodeType::CronTrigger.as_str() {
                    continue;
                }
                let Some(expression) = node.data.get("cronExpression").and_then(Value::as_str) else {
                    continue;
                };
                found.push(CronTriggerDefinition {
                    workflow_id: graph.workflow.id,
                    node_id: node.id.clone(),
                    cron_expression: expression.to_owned(),
                    timezone: node.data.get("timezone").and_then(Value::as_str).map(str::to_owned),
                });
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn create_or_get(&self, workflow_id: Uuid, event_id: &str) -> Result<Execution, EngineError> {
        let mut state = self.lock();
        if let Some(existing) = state.by_event.get(event_id).and_then(|id| state.executions.get(id)) {
            return Ok(existing.clone());
        }
        if !state.graphs.contains_key(&workflow_id) {
            return Err(EngineError::WorkflowNotFound(workflow_id));
        }
        let row = Execution::start(workflow_id, event_id);
        state.by_event.insert(event_id.to_owned(), row.id);
        state.executions.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, execution_id: Uuid) -> Result<Option<Execution>, EngineError> {
        Ok(self.lock().executions.get(&execution_id).cloned())
    }

    async fn get_by_event(&self, event_id: &str) -> Result<Option<Execution>, EngineError> {
        let state = self.lock();
        Ok(state
            .by_event
            .get(event_id)
            .and_then(|id| state.executions.get(id))
            .cloned())
    }

    async fn merge_node_status(
        &self,
        execution_id: Uuid,
        node_id: &str,
        status: NodeStatus,
    ) -> Result<(), EngineError> {
        if let Some(row) = self.lock().executions.get_mut(&execution_id) {
            row.node_status
                .insert(node_id.to_owned(), NodeStatusEntry { status });
        }
        Ok(())
    }

    async fn mark_succeeded(&self, event_id: &str, output: Value) -> Result<bool, EngineError> {
        Ok(self.finalize(event_id, |row| {
            row.status = ExecutionStatus::Success;
            row.output = Some(output);
        }))
    }

    async fn mark_failed(&self, event_id: &str, error: &str, error_stack: &str) -> Result<bool, EngineError> {
        Ok(self.finalize(event_id, |row| {
            row.status = ExecutionStatus::Failed;
            row.error = Some(error.to_owned());
            row.error_stack = Some(error_stack.to_owned());
        }))
    }

    async fn list_for_workflow(&self, workflow_id: Uuid) -> Result<Vec<Execution>, EngineError> {
        let mut rows: Vec<Execution> = self
            .lock()
            .executions
            .values()
            .filter(|e| e.workflow_id == workflow_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(rows)
    }
}
