use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use engine::EngineError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Every handler failure renders as `{ "success": false, "error": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Engine(e) => match e {
                EngineError::WorkflowNotFound(_) => StatusCode::NOT_FOUND,
                EngineError::WorkflowInactive(_) => StatusCode::CONFLICT,
                EngineError::Schedule(_) | EngineError::NoUpcomingFire(_) => StatusCode::BAD_REQUEST,
                EngineError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, Json(json!({ "success": false, "error": self.to_string() }))).into_response()
    }
}
