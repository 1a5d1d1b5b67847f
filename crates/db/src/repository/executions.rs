//! Execution repository functions.
//!
//! Rows are keyed by the triggering event's id. After creation every write
//! is a targeted update so status merges and finalization never overwrite
//! each other.

use sqlx::PgPool;
use uuid::Uuid;

use crate::{DbError, models::ExecutionRow};

const COLUMNS: &str = "id, workflow_id, event_id, status, error, error_stack, \
                       started_at, completed_at, output, node_status";

/// Insert a `RUNNING` row for `event_id` unless one exists.
///
/// Returns `None` when a row already exists for the event, or when the
/// workflow does not exist.
pub async fn create_execution(
    pool: &PgPool,
    workflow_id: Uuid,
    event_id: &str,
) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!(
        r#"
        INSERT INTO execution (id, workflow_id, event_id, status, started_at, node_status)
        SELECT $1, w.id, $3, 'RUNNING', now(), '{{}}'::jsonb
        FROM workflow w
        WHERE w.id = $2
        ON CONFLICT (event_id) DO NOTHING
        RETURNING {COLUMNS}
        "#
    );
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(Uuid::new_v4())
        .bind(workflow_id)
        .bind(event_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_execution(pool: &PgPool, id: Uuid) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM execution WHERE id = $1");
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

pub async fn get_execution_by_event(pool: &PgPool, event_id: &str) -> Result<Option<ExecutionRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM execution WHERE event_id = $1");
    let row = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(event_id)
        .fetch_optional(pool)
        .await?;

    Ok(row)
}

/// Set `node_status[node_id] = { status }`, keeping every other entry.
pub async fn merge_node_status(
    pool: &PgPool,
    execution_id: Uuid,
    node_id: &str,
    status: &str,
) -> Result<(), DbError> {
    sqlx::query(
        r#"
        UPDATE execution
        SET node_status = node_status || jsonb_build_object($2::text, jsonb_build_object('status', $3::text))
        WHERE id = $1
        "#,
    )
    .bind(execution_id)
    .bind(node_id)
    .bind(status)
    .execute(pool)
    .await?;

    Ok(())
}

/// Finalize a `RUNNING` row as `SUCCESS`. Returns whether a row changed.
pub async fn mark_succeeded(
    pool: &PgPool,
    event_id: &str,
    output: serde_json::Value,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE execution
        SET status = 'SUCCESS', completed_at = now(), output = $2
        WHERE event_id = $1 AND status = 'RUNNING'
        "#,
    )
    .bind(event_id)
    .bind(output)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Finalize a `RUNNING` row as `FAILED`. Returns whether a row changed.
pub async fn mark_failed(
    pool: &PgPool,
    event_id: &str,
    error: &str,
    error_stack: &str,
) -> Result<bool, DbError> {
    let result = sqlx::query(
        r#"
        UPDATE execution
        SET status = 'FAILED', completed_at = now(), error = $2, error_stack = $3
        WHERE event_id = $1 AND status = 'RUNNING'
        "#,
    )
    .bind(event_id)
    .bind(error)
    .bind(error_stack)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Executions of one workflow, newest first.
pub async fn list_executions(pool: &PgPool, workflow_id: Uuid) -> Result<Vec<ExecutionRow>, DbError> {
    let sql = format!("SELECT {COLUMNS} FROM execution WHERE workflow_id = $1 ORDER BY started_at DESC");
    let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
        .bind(workflow_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}
