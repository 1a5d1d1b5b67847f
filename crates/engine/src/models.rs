//! Core domain models for the workflow engine.
//!
//! These types are the source of truth for what a workflow and a run look
//! like in memory. The `db` crate maps them onto rows; the engine itself
//! never touches SQL.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use nodes::NodeStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow graph
// ---------------------------------------------------------------------------

/// Workflow metadata. Read-only to the execution core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: Uuid,
    pub name: String,
    /// Owner used for credential lookups; a run without one is rejected.
    pub owner_id: Option<String>,
    pub active: bool,
}

impl Workflow {
    /// An active workflow with a fresh id.
    pub fn new(name: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner_id: Some(owner_id.into()),
            active: true,
        }
    }
}

/// Editor position. Irrelevant to execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A single node in the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    /// Unique within the workflow; referenced by connections.
    pub id: String,
    #[serde(default)]
    pub workflow_id: Uuid,
    /// Type tag, e.g. `HTTP_REQUEST`. Parsed at dispatch time so an unknown
    /// tag fails only the run that hits it.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Free-form executor configuration.
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub position: Position,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            workflow_id: Uuid::nil(),
            node_type: node_type.into(),
            data,
            position: Position::default(),
        }
    }
}

fn main_port() -> String {
    "main".to_owned()
}

/// Directed edge between two nodes' ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub workflow_id: Uuid,
    pub from_node_id: String,
    pub to_node_id: String,
    #[serde(default = "main_port")]
    pub from_output: String,
    #[serde(default = "main_port")]
    pub to_input: String,
}

impl Connection {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        let from_node_id = from.into();
        let to_node_id = to.into();
        Self {
            id: format!("{from_node_id}->{to_node_id}"),
            workflow_id: Uuid::nil(),
            from_node_id,
            to_node_id,
            from_output: main_port(),
            to_input: main_port(),
        }
    }
}

/// Everything a run needs to know about a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowGraph {
    pub workflow: Workflow,
    pub nodes: Vec<NodeDefinition>,
    pub connections: Vec<Connection>,
}

impl WorkflowGraph {
    /// Stamp the workflow id onto every node and connection.
    pub fn new(workflow: Workflow, mut nodes: Vec<NodeDefinition>, mut connections: Vec<Connection>) -> Self {
        for node in &mut nodes {
            node.workflow_id = workflow.id;
        }
        for connection in &mut connections {
            connection.workflow_id = workflow.id;
        }
        Self {
            workflow,
            nodes,
            connections,
        }
    }

    /// Number of connections ending at `node_id` whose source is a known node.
    pub fn incoming_connections(&self, node_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|c| c.to_node_id == node_id)
            .filter(|c| self.nodes.iter().any(|n| n.id == c.from_node_id))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown execution status: {other}")),
        }
    }
}

/// Entry of the per-node status map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatusEntry {
    pub status: NodeStatus,
}

/// One run of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: Uuid,
    pub workflow_id: Uuid,
    /// Idempotency key of the triggering event.
    pub event_id: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub error_stack: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<Value>,
    /// node id -> last published status
    #[serde(default)]
    pub node_status: BTreeMap<String, NodeStatusEntry>,
}

impl Execution {
    /// A fresh `RUNNING` row.
    pub fn start(workflow_id: Uuid, event_id: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            event_id: event_id.into(),
            status: ExecutionStatus::Running,
            error: None,
            error_stack: None,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            node_status: BTreeMap::new(),
        }
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.node_status.get(node_id).map(|entry| entry.status)
    }
}

// ---------------------------------------------------------------------------
// Trigger input
// ---------------------------------------------------------------------------

/// A request to run a workflow.
///
/// `id` is the idempotency key: every delivery and retry of one logical
/// occurrence carries the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub id: String,
    pub workflow_id: Uuid,
    #[serde(default)]
    pub initial_data: Value,
}

impl TriggerEvent {
    pub fn new(id: impl Into<String>, workflow_id: Uuid, initial_data: Value) -> Self {
        Self {
            id: id.into(),
            workflow_id,
            initial_data,
        }
    }

    /// A one-off occurrence with a fresh idempotency key.
    pub fn manual(workflow_id: Uuid, initial_data: Value) -> Self {
        Self::new(format!("manual:{}", Uuid::new_v4()), workflow_id, initial_data)
    }

    /// The `count`-th fire of a cron chain.
    pub fn scheduled(workflow_id: Uuid, fire_time: DateTime<Utc>, count: u64) -> Self {
        let scheduled_time = fire_time.to_rfc3339();
        Self::new(
            format!("cron:{workflow_id}:{scheduled_time}"),
            workflow_id,
            json!({ "cronTrigger": { "scheduledTime": scheduled_time, "count": count } }),
        )
    }
}
