//! Test doubles for executors and their collaborators.
//!
//! Useful in unit and integration tests where a real node implementation or
//! a real provider is either unavailable or irrelevant.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::http::{check_status, HttpClient, HttpRequest, HttpResponse};
use crate::integrations::{
    EmailRequest, FetchPostsRequest, PostRequest, ProviderGateway, TextRequest, TextResponse,
};
use crate::step::MemoryStepRunner;
use crate::template::BraceRenderer;
use crate::traits::{Guarded, Invocation, NodeHandler, StatusSink};
use crate::{Context, NodeError, NodeStatus, NodeType};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// MockNode
// ---------------------------------------------------------------------------

/// Behaviour injected into `MockNode` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Add the value to the context under the node's name.
    ReturnValue(Value),
    /// Fail with a `Retryable` error.
    FailRetryable(String),
    /// Fail with a `Fatal` error.
    FailFatal(String),
    /// Fail with a `Retryable` error for the first `failures` attempts, then
    /// behave like `ReturnValue`.
    Flaky { failures: usize, value: Value },
}

/// A mock handler that records every context it receives.
///
/// Wrap it in [`Guarded`] (see [`MockNode::guarded`]) to get the regular
/// status lifecycle. Its effect runs as a single step named `mock`.
#[derive(Debug)]
pub struct MockNode {
    /// Context key the output is written to.
    pub name: String,
    pub node_type: NodeType,
    pub behaviour: MockBehaviour,
    calls: Mutex<Vec<Value>>,
    attempts: AtomicUsize,
}

impl MockNode {
    fn with_behaviour(name: impl Into<String>, behaviour: MockBehaviour) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::HttpRequest,
            behaviour,
            calls: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Create a mock that always succeeds with the given value.
    pub fn returning(name: impl Into<String>, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::ReturnValue(value))
    }

    /// Create a mock that always fails with a `Fatal` error.
    pub fn failing_fatal(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailFatal(msg.into()))
    }

    /// Create a mock that always fails with a `Retryable` error.
    pub fn failing_retryable(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::with_behaviour(name, MockBehaviour::FailRetryable(msg.into()))
    }

    /// Create a mock whose effect fails `failures` times before succeeding.
    pub fn flaky(name: impl Into<String>, failures: usize, value: Value) -> Self {
        Self::with_behaviour(name, MockBehaviour::Flaky { failures, value })
    }

    /// Report status under a different node type.
    #[must_use]
    pub fn of_type(mut self, node_type: NodeType) -> Self {
        self.node_type = node_type;
        self
    }

    pub fn guarded(self) -> Arc<Guarded<MockNode>> {
        Arc::new(Guarded(self))
    }

    /// Number of times this node has been performed (memoized replays of a
    /// completed effect still count).
    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Every context this node received, in call order.
    pub fn calls(&self) -> Vec<Value> {
        lock(&self.calls).clone()
    }

    /// Number of times the effect itself ran.
    pub fn effect_count(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn effect(&self) -> Result<Value, NodeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            MockBehaviour::ReturnValue(v) => Ok(v.clone()),
            MockBehaviour::FailRetryable(msg) => Err(NodeError::Retryable(msg.clone())),
            MockBehaviour::FailFatal(msg) => Err(NodeError::Fatal(msg.clone())),
            MockBehaviour::Flaky { failures, value } => {
                if attempt < *failures {
                    Err(NodeError::retryable(format!("flaky attempt {}", attempt + 1)))
                } else {
                    Ok(value.clone())
                }
            }
        }
    }
}

#[async_trait]
impl NodeHandler for MockNode {
    type Config = Value;

    fn node_type(&self) -> NodeType {
        self.node_type
    }

    async fn perform(
        &self,
        _config: Value,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        lock(&self.calls).push(context.to_value());
        let output = invocation
            .steps
            .run_step(&invocation.step_name("mock"), Box::pin(async { self.effect() }))
            .await?;
        context.with_entry(self.name.clone(), output)
    }
}

// ---------------------------------------------------------------------------
// Status sink
// ---------------------------------------------------------------------------

/// Records every status transition it receives.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    events: Mutex<Vec<(NodeType, String, NodeStatus)>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(NodeType, String, NodeStatus)> {
        lock(&self.events).clone()
    }

    /// The status sequence published for one node.
    pub fn statuses_for(&self, node_id: &str) -> Vec<NodeStatus> {
        lock(&self.events)
            .iter()
            .filter(|(_, id, _)| id == node_id)
            .map(|(_, _, status)| *status)
            .collect()
    }

    /// Channel of every event, in publish order.
    pub fn channels(&self) -> Vec<String> {
        lock(&self.events).iter().map(|(t, _, _)| t.channel()).collect()
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn publish(&self, node_type: NodeType, node_id: &str, status: NodeStatus) {
        lock(&self.events).push((node_type, node_id.to_owned(), status));
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// Answers from a fixed table keyed by URL; unknown URLs get `200 null`.
#[derive(Debug, Default)]
pub struct FakeHttpClient {
    responses: HashMap<String, (u16, Value)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn respond(mut self, url: impl Into<String>, status: u16, data: Value) -> Self {
        self.responses.insert(url.into(), (status, data));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl HttpClient for FakeHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, NodeError> {
        let (status, data) = self
            .responses
            .get(&request.url)
            .cloned()
            .unwrap_or((200, Value::Null));
        let url = request.url.clone();
        lock(&self.requests).push(request);

        let status_text = reqwest::StatusCode::from_u16(status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or_default()
            .to_owned();
        check_status(status, &status_text, &url)?;
        Ok(HttpResponse {
            status,
            status_text,
            data,
        })
    }
}

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Records provider calls and answers with canned payloads.
#[derive(Debug, Default)]
pub struct FakeGateway {
    text: String,
    text_requests: Mutex<Vec<TextRequest>>,
    emails: Mutex<Vec<EmailRequest>>,
    posts: Mutex<Vec<PostRequest>>,
    fetches: Mutex<Vec<FetchPostsRequest>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn text_requests(&self) -> Vec<TextRequest> {
        lock(&self.text_requests).clone()
    }

    pub fn emails(&self) -> Vec<EmailRequest> {
        lock(&self.emails).clone()
    }

    pub fn posts(&self) -> Vec<PostRequest> {
        lock(&self.posts).clone()
    }

    pub fn fetches(&self) -> Vec<FetchPostsRequest> {
        lock(&self.fetches).clone()
    }
}

#[async_trait]
impl ProviderGateway for FakeGateway {
    async fn generate_text(&self, request: TextRequest) -> Result<TextResponse, NodeError> {
        lock(&self.text_requests).push(request);
        Ok(TextResponse {
            text: self.text.clone(),
            usage: json!({ "totalTokens": self.text.split_whitespace().count() }),
        })
    }

    async fn send_email(&self, request: EmailRequest) -> Result<Value, NodeError> {
        let mut emails = lock(&self.emails);
        emails.push(request);
        Ok(json!({ "id": format!("email_{}", emails.len()) }))
    }

    async fn create_post(&self, request: PostRequest) -> Result<Value, NodeError> {
        let out = json!({ "id": "post_1", "text": request.text });
        lock(&self.posts).push(request);
        Ok(out)
    }

    async fn fetch_posts(&self, request: FetchPostsRequest) -> Result<Value, NodeError> {
        lock(&self.fetches).push(request);
        Ok(json!({ "data": [] }))
    }
}

// ---------------------------------------------------------------------------
// Invocation fixture
// ---------------------------------------------------------------------------

/// Owns everything an [`Invocation`] borrows.
pub struct TestBench {
    pub node_id: String,
    pub config: Value,
    pub incoming: usize,
    pub execution_id: Uuid,
    pub steps: MemoryStepRunner,
    pub status: RecordingStatusSink,
    pub templates: BraceRenderer,
}

impl TestBench {
    pub fn new(node_id: impl Into<String>, config: Value) -> Self {
        Self {
            node_id: node_id.into(),
            config,
            incoming: 0,
            execution_id: Uuid::new_v4(),
            steps: MemoryStepRunner::new(),
            status: RecordingStatusSink::new(),
            templates: BraceRenderer,
        }
    }

    #[must_use]
    pub fn with_incoming(mut self, incoming: usize) -> Self {
        self.incoming = incoming;
        self
    }

    pub fn invocation(&self) -> Invocation<'_> {
        Invocation {
            node_id: &self.node_id,
            workflow_id: None,
            execution_id: self.execution_id,
            owner_id: "owner-1",
            raw_config: &self.config,
            incoming_connections: self.incoming,
            steps: &self.steps,
            status: &self.status,
            templates: &self.templates,
        }
    }
}
