//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models; they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflow
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub user_id: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// node / connection
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeRow {
    pub id: String,
    pub workflow_id: Uuid,
    /// The `type` column.
    pub node_type: String,
    pub data: serde_json::Value,
    pub position_x: f64,
    pub position_y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConnectionRow {
    pub id: String,
    pub workflow_id: Uuid,
    pub from_node_id: String,
    pub to_node_id: String,
    pub from_output: String,
    pub to_input: String,
}

// ---------------------------------------------------------------------------
// execution
// ---------------------------------------------------------------------------

/// A persisted execution row. `status` is `RUNNING`, `SUCCESS` or `FAILED`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub event_id: String,
    pub status: String,
    pub error: Option<String>,
    pub error_stack: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    /// `{ "<node id>": { "status": "<status>" } }`
    pub node_status: serde_json::Value,
}
