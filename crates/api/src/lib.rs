//! `api` crate: HTTP surface of the engine.
//!
//! Routes:
//!   POST   /api/v1/workflows/{id}/execute
//!   GET    /api/v1/workflows/{id}/executions
//!   GET    /api/v1/executions/{id}
//!   POST   /api/v1/webhooks/stripe?workflowId=
//!   POST   /api/v1/webhooks/google-form?workflowId=
//!   POST   /api/v1/schedules
//!   DELETE /api/v1/schedules/{workflowId}
//!
//! Handlers never run workflows inline: they hand a trigger event to the
//! dispatcher and answer immediately.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use engine::{CronScheduler, ExecutionStore, GraphStore, TriggerDispatcher, Workflow};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

pub use error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<dyn TriggerDispatcher>,
    pub graphs: Arc<dyn GraphStore>,
    pub executions: Arc<dyn ExecutionStore>,
    pub scheduler: CronScheduler,
}

impl AppState {
    /// The workflow, provided it exists and is active.
    pub(crate) async fn active_workflow(&self, workflow_id: Uuid) -> Result<Workflow, ApiError> {
        let workflow = self
            .graphs
            .load_workflow(workflow_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Workflow {workflow_id} not found")))?;
        if !workflow.active {
            return Err(ApiError::Conflict(format!("Workflow {workflow_id} is not active")));
        }
        Ok(workflow)
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/workflows/{id}/execute", post(handlers::executions::execute))
        .route("/workflows/{id}/executions", get(handlers::executions::list))
        .route("/executions/{id}", get(handlers::executions::get))
        .route("/webhooks/stripe", post(handlers::webhooks::stripe))
        .route("/webhooks/google-form", post(handlers::webhooks::google_form))
        .route("/schedules", post(handlers::schedules::create))
        .route("/schedules/{workflow_id}", delete(handlers::schedules::cancel));

    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API on `bind` until `shutdown` fires.
pub async fn serve(bind: &str, state: AppState, shutdown: CancellationToken) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "API listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
