//! Outbound HTTP used by the HTTP Request and Discord executors.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    /// Methods that carry a JSON request body.
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
            Self::Patch => reqwest::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub json_body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    /// Parsed JSON when the server answered with JSON, otherwise the body text.
    pub data: Value,
}

#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError>;
}

/// Classify a response status.
///
/// 408, 429 and 5xx are transient; any other 4xx is permanent.
pub fn check_status(status: u16, status_text: &str, url: &str) -> Result<(), NodeError> {
    match status {
        408 | 429 | 500..=599 => Err(NodeError::retryable(format!(
            "{url} responded {status} {status_text}"
        ))),
        400..=499 => Err(NodeError::fatal(format!(
            "{url} responded {status} {status_text}"
        ))),
        _ => Ok(()),
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        let HttpRequest { method, url, json_body } = request;
        debug!(%url, ?method, "sending http request");

        let mut builder = self.client.request(method.to_reqwest(), &url);
        if let Some(body) = &json_body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NodeError::retryable(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_owned();
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));

        let text = response
            .text()
            .await
            .map_err(|e| NodeError::retryable(format!("reading response from {url} failed: {e}")))?;

        check_status(status.as_u16(), &status_text, &url)?;

        let data = if is_json {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        } else {
            Value::String(text)
        };

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text,
            data,
        })
    }
}
