use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use engine::{Execution, TriggerEvent};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{ApiError, AppState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub initial_data: Value,
}

/// Queue a manual run. The body is optional.
pub async fn execute(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let request: ExecuteRequest = if body.is_empty() {
        ExecuteRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };
    if !matches!(request.initial_data, Value::Null | Value::Object(_)) {
        return Err(ApiError::BadRequest("initialData must be a JSON object".into()));
    }

    state.active_workflow(id).await?;
    let event = TriggerEvent::manual(id, request.initial_data);
    let event_id = event.id.clone();
    state.dispatcher.dispatch(event).await?;
    info!(workflow_id = %id, %event_id, "manual run queued");

    Ok((StatusCode::ACCEPTED, Json(json!({ "eventId": event_id }))))
}

pub async fn get(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Execution>, ApiError> {
    state
        .executions
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Execution {id} not found")))
}

/// Executions of one workflow, newest first.
pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Execution>>, ApiError> {
    Ok(Json(state.executions.list_for_workflow(id).await?))
}
