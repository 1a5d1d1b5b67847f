//! Workflow graph reads. The engine never writes workflows.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    DbError,
    models::{ConnectionRow, NodeRow, WorkflowRow},
};

/// Fetch a single workflow by its primary key.
pub async fn get_workflow(pool: &PgPool, id: Uuid) -> Result<WorkflowRow, DbError> {
    let row = sqlx::query_as::<_, WorkflowRow>(
        r#"
        SELECT id, name, user_id, active, created_at, updated_at
        FROM workflow
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound { table: "workflow" })?;

    Ok(row)
}

/// All nodes of a workflow in insertion order.
pub async fn list_nodes(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<NodeRow>, DbError> {
    let rows = sqlx::query_as::<_, NodeRow>(
        r#"
        SELECT id, workflow_id, type AS node_type, data, position_x, position_y
        FROM node
        WHERE workflow_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub async fn list_connections(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<ConnectionRow>, DbError> {
    let rows = sqlx::query_as::<_, ConnectionRow>(
        r#"
        SELECT id, workflow_id, from_node_id, to_node_id, from_output, to_input
        FROM connection
        WHERE workflow_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(workflow_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// `CRON_TRIGGER` nodes belonging to active workflows.
pub async fn list_active_cron_nodes(pool: &PgPool) -> Result<Vec<NodeRow>, DbError> {
    let rows = sqlx::query_as::<_, NodeRow>(
        r#"
        SELECT n.id, n.workflow_id, n.type AS node_type, n.data, n.position_x, n.position_y
        FROM node n
        JOIN workflow w ON w.id = n.workflow_id
        WHERE n.type = 'CRON_TRIGGER' AND w.active
        ORDER BY n.workflow_id, n.created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
