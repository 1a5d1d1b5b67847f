use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use engine::ScheduleRequest;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{ApiError, AppState};

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let workflow_id = request.workflow_id;
    state.active_workflow(workflow_id).await?;
    let next_fire_at = state.scheduler.schedule(request)?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "workflowId": workflow_id, "nextFireAt": next_fire_at })),
    ))
}

pub async fn cancel(State(state): State<AppState>, Path(workflow_id): Path<Uuid>) -> Result<StatusCode, ApiError> {
    if state.scheduler.cancel(workflow_id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("No schedule for workflow {workflow_id}")))
    }
}
