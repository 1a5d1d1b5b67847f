//! Inbound webhooks. Each one folds the provider payload into the initial
//! data under a fixed key and queues a run.
//!
//! Provider ids become the event id when present, so a redelivered webhook
//! maps onto the execution it already started.

use axum::extract::{Query, State};
use axum::Json;
use engine::TriggerEvent;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct WebhookQuery {
    #[serde(rename = "workflowId")]
    pub workflow_id: Option<String>,
}

impl WebhookQuery {
    fn workflow_id(&self) -> Result<Uuid, ApiError> {
        let raw = self
            .workflow_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing required query parameter: workflowId".into()))?;
        raw.parse()
            .map_err(|_| ApiError::BadRequest(format!("Invalid workflowId: {raw}")))
    }
}

fn event_id(prefix: &str, provider_id: Option<&Value>, workflow_id: Uuid) -> Option<String> {
    match provider_id {
        Some(Value::String(id)) if !id.is_empty() => Some(format!("{prefix}:{workflow_id}:{id}")),
        _ => None,
    }
}

async fn queue(
    state: &AppState,
    workflow_id: Uuid,
    event_id: Option<String>,
    initial_data: Value,
) -> Result<Json<Value>, ApiError> {
    state.active_workflow(workflow_id).await?;
    let event = match event_id {
        Some(id) => TriggerEvent::new(id, workflow_id, initial_data),
        None => TriggerEvent::manual(workflow_id, initial_data),
    };
    info!(%workflow_id, event_id = %event.id, "webhook run queued");
    state.dispatcher.dispatch(event).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn stripe(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let workflow_id = query.workflow_id()?;
    let stripe = json!({
        "eventId": body.get("id"),
        "eventType": body.get("type"),
        "timestamp": body.get("created"),
        "livemode": body.get("livemode"),
        "raw": body.pointer("/data/object"),
    });
    let event_id = event_id("stripe", body.get("id"), workflow_id);
    queue(&state, workflow_id, event_id, json!({ "stripe": stripe })).await
}

pub async fn google_form(
    State(state): State<AppState>,
    Query(query): Query<WebhookQuery>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let workflow_id = query.workflow_id()?;
    let event_id = event_id("google-form", body.get("responseId"), workflow_id);
    let form = json!({
        "formId": body.get("formId"),
        "formTitle": body.get("formTitle"),
        "responseId": body.get("responseId"),
        "timestamp": body.get("timestamp"),
        "respondentEmail": body.get("respondentEmail"),
        "responses": body.get("responses"),
        "raw": body,
    });
    queue(&state, workflow_id, event_id, json!({ "googleForm": form })).await
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::{json, Value};

    use crate::handlers::testing::TestApp;

    #[tokio::test]
    async fn stripe_payload_is_folded_under_stripe() {
        let mut app = TestApp::new();
        let wf = app.workflow(true);

        let (status, body) = app
            .send(
                Method::POST,
                &format!("/api/v1/webhooks/stripe?workflowId={wf}"),
                Some(json!({
                    "id": "evt_123",
                    "type": "payment_intent.succeeded",
                    "created": 1_700_000_000,
                    "livemode": false,
                    "data": { "object": { "amount": 500 } }
                })),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true }));
        let event = app.events.recv().await.unwrap();
        assert_eq!(event.id, format!("stripe:{wf}:evt_123"));
        let stripe = &event.initial_data["stripe"];
        assert_eq!(stripe["eventId"], "evt_123");
        assert_eq!(stripe["eventType"], "payment_intent.succeeded");
        assert_eq!(stripe["timestamp"], 1_700_000_000);
        assert_eq!(stripe["livemode"], false);
        assert_eq!(stripe["raw"], json!({ "amount": 500 }));
    }

    #[tokio::test]
    async fn google_form_payload_is_folded_under_google_form() {
        let mut app = TestApp::new();
        let wf = app.workflow(true);
        let submission = json!({
            "formId": "f1",
            "formTitle": "Signup",
            "responseId": "r9",
            "timestamp": "2026-01-01T00:00:00Z",
            "respondentEmail": "a@b.co",
            "responses": { "Name": "Ada" }
        });

        let (status, _) = app
            .send(
                Method::POST,
                &format!("/api/v1/webhooks/google-form?workflowId={wf}"),
                Some(submission.clone()),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        let event = app.events.recv().await.unwrap();
        let form = &event.initial_data["googleForm"];
        assert_eq!(form["formTitle"], "Signup");
        assert_eq!(form["responses"]["Name"], "Ada");
        assert_eq!(form["raw"], submission);
        assert_eq!(event.id, format!("google-form:{wf}:r9"));
    }

    #[tokio::test]
    async fn missing_workflow_id_is_a_bad_request() {
        let app = TestApp::new();
        let (status, body) = app
            .send(Method::POST, "/api/v1/webhooks/stripe", Some(json!({ "id": "evt" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("workflowId"));
    }

    #[tokio::test]
    async fn inactive_workflow_queues_nothing() {
        let mut app = TestApp::new();
        let wf = app.workflow(false);
        let (status, _) = app
            .send(
                Method::POST,
                &format!("/api/v1/webhooks/google-form?workflowId={wf}"),
                Some(json!({})),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(app.events.try_recv().is_none());
    }

    #[tokio::test]
    async fn payload_without_provider_id_gets_a_fresh_event_id() {
        let mut app = TestApp::new();
        let wf = app.workflow(true);
        let (status, _) = app
            .send(
                Method::POST,
                &format!("/api/v1/webhooks/stripe?workflowId={wf}"),
                Some(json!({ "type": "ping" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let event = app.events.recv().await.unwrap();
        assert!(event.id.starts_with("manual:"));
        assert_eq!(event.initial_data["stripe"]["eventId"], Value::Null);
    }
}
