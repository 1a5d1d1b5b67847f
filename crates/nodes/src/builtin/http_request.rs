//! HTTP Request node.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::http::{HttpClient, HttpMethod, HttpRequest};
use crate::template::is_templated;
use crate::traits::{Invocation, NodeHandler};
use crate::validate::{take, Violations};
use crate::{Context, NodeError, NodeType};

use super::to_json;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpRequestConfig {
    pub variable_name: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub body: Option<String>,
}

fn parse_method(raw: &str) -> Option<HttpMethod> {
    serde_json::from_value(Value::String(raw.to_ascii_uppercase())).ok()
}

pub struct HttpRequestHandler {
    client: Arc<dyn HttpClient>,
}

impl HttpRequestHandler {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for HttpRequestHandler {
    type Config = HttpRequestConfig;

    fn node_type(&self) -> NodeType {
        NodeType::HttpRequest
    }

    fn validate(&self, config: &HttpRequestConfig, v: &mut Violations) {
        v.variable_name(&config.variable_name);

        if let Some(endpoint) = v.require_text("endpoint", &config.endpoint) {
            if !is_templated(endpoint) && reqwest::Url::parse(endpoint).is_err() {
                v.push("endpoint must be a valid URL");
            }
        }

        if let Some(raw) = v.require_text("method", &config.method) {
            match parse_method(raw) {
                None => v.push("method must be one of GET, POST, PUT, DELETE, PATCH"),
                Some(method) if method.has_body() && config.body.is_none() => {
                    v.push("body is required for POST, PUT and PATCH requests")
                }
                Some(_) => {}
            }
        }
    }

    async fn perform(
        &self,
        config: HttpRequestConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let variable_name = take("variableName", config.variable_name)?;
        let method = parse_method(&take("method", config.method)?)
            .ok_or_else(|| NodeError::fatal("unsupported HTTP method"))?;
        let url = invocation.render(&take("endpoint", config.endpoint)?, &context);

        let json_body = if method.has_body() {
            let rendered = invocation.render(config.body.as_deref().unwrap_or_default(), &context);
            let parsed: Value = serde_json::from_str(&rendered).map_err(|e| {
                NodeError::fatal(format!("Invalid JSON body for HTTP Request node: {e}"))
            })?;
            Some(parsed)
        } else {
            None
        };

        let client = Arc::clone(&self.client);
        let output = invocation
            .steps
            .run_step(
                &invocation.step_name("http-request"),
                Box::pin(async move {
                    let response = client.send(HttpRequest { method, url, json_body }).await?;
                    Ok::<_, NodeError>(json!({ "httpResponse": to_json(&response)? }))
                }),
            )
            .await?;

        context.with_entry(variable_name, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeHttpClient, TestBench};
    use crate::traits::{Guarded, NodeExecutor};
    use crate::NodeStatus;

    fn handler(client: &Arc<FakeHttpClient>) -> Guarded<HttpRequestHandler> {
        Guarded(HttpRequestHandler::new(Arc::clone(client) as Arc<dyn HttpClient>))
    }

    #[tokio::test]
    async fn get_adds_response_under_variable_name() {
        let client = Arc::new(FakeHttpClient::new().respond("https://x/1", 200, json!({ "id": 1 })));
        let config = json!({ "variableName": "todo", "endpoint": "https://x/1", "method": "GET" });
        let bench = TestBench::new("b", config).with_incoming(1);

        let seed = Context::from_value(json!({ "seed": true })).unwrap();
        let ctx = handler(&client).execute(&bench.invocation(), seed).await.unwrap();

        assert_eq!(ctx.get("seed"), Some(&json!(true)));
        assert_eq!(ctx.get("todo").unwrap()["httpResponse"]["status"], 200);
        assert_eq!(ctx.get("todo").unwrap()["httpResponse"]["data"]["id"], 1);
        assert_eq!(bench.status.statuses_for("b"), vec![NodeStatus::Loading, NodeStatus::Success]);
    }

    #[tokio::test]
    async fn templated_endpoint_and_body_are_resolved() {
        let client = Arc::new(FakeHttpClient::new().respond("https://x/users/42", 201, json!({})));
        let config = json!({
            "variableName": "created",
            "endpoint": "https://x/users/{{user.id}}",
            "method": "POST",
            "body": "{\"name\": \"{{user.name}}\", \"missing\": \"{{nope}}\"}"
        });
        let bench = TestBench::new("b", config).with_incoming(1);
        let seed = Context::from_value(json!({ "user": { "id": 42, "name": "Ada" } })).unwrap();

        handler(&client).execute(&bench.invocation(), seed).await.unwrap();

        let sent = client.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://x/users/42");
        assert_eq!(sent[0].json_body, Some(json!({ "name": "Ada", "missing": "" })));
    }

    #[tokio::test]
    async fn invalid_config_lists_every_field_and_reports_error() {
        let client = Arc::new(FakeHttpClient::new());
        let config = json!({ "endpoint": "not a url", "method": "FETCH" });
        let bench = TestBench::new("b", config).with_incoming(1);

        let err = handler(&client)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        let msg = err.message();
        assert!(msg.contains("variableName is required"), "{msg}");
        assert!(msg.contains("endpoint must be a valid URL"), "{msg}");
        assert!(msg.contains("method must be one of"), "{msg}");
        assert_eq!(bench.status.statuses_for("b"), vec![NodeStatus::Error]);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn wrongly_typed_fields_are_all_reported() {
        let client = Arc::new(FakeHttpClient::new());
        let config = json!({ "variableName": 1, "endpoint": 2, "method": 3 });
        let bench = TestBench::new("b", config).with_incoming(1);

        let err = handler(&client)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        let msg = err.message();
        assert!(msg.starts_with("Invalid configuration for HTTP Request node"), "{msg}");
        assert!(msg.contains("variableName has the wrong type"), "{msg}");
        assert!(msg.contains("endpoint has the wrong type"), "{msg}");
        assert!(msg.contains("method has the wrong type"), "{msg}");
        assert!(!msg.contains("is required"), "{msg}");
        assert_eq!(bench.status.statuses_for("b"), vec![NodeStatus::Error]);
    }

    #[tokio::test]
    async fn wrong_types_and_missing_fields_are_reported_together() {
        let client = Arc::new(FakeHttpClient::new());
        let config = json!({ "endpoint": ["https://x/1"], "method": "GET" });
        let bench = TestBench::new("b", config).with_incoming(1);

        let err = handler(&client)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        let msg = err.message();
        assert!(msg.contains("variableName is required"), "{msg}");
        assert!(msg.contains("endpoint has the wrong type"), "{msg}");
        assert!(!msg.contains("method"), "{msg}");
    }

    #[tokio::test]
    async fn node_without_incoming_connection_is_rejected() {
        let client = Arc::new(FakeHttpClient::new());
        let config = json!({ "variableName": "r", "endpoint": "https://x/1", "method": "GET" });
        let bench = TestBench::new("orphan", config);

        let err = handler(&client)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(err.message().contains("no incoming connections"));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let client = Arc::new(FakeHttpClient::new().respond("https://x/1", 503, json!("down")));
        let config = json!({ "variableName": "r", "endpoint": "https://x/1", "method": "GET" });
        let bench = TestBench::new("b", config).with_incoming(1);

        let err = handler(&client)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(bench.status.statuses_for("b"), vec![NodeStatus::Loading, NodeStatus::Retrying]);
    }

    #[tokio::test]
    async fn malformed_body_is_fatal() {
        let client = Arc::new(FakeHttpClient::new());
        let config = json!({
            "variableName": "r", "endpoint": "https://x/1", "method": "PUT", "body": "{ nope"
        });
        let bench = TestBench::new("b", config).with_incoming(1);

        let err = handler(&client)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(err.message().contains("Invalid JSON body"));
        assert_eq!(bench.status.statuses_for("b"), vec![NodeStatus::Loading, NodeStatus::Error]);
    }
}
