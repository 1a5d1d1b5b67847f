//! Third-party provider integrations, consumed through [`ProviderGateway`].
//!
//! The executors own validation, templating, status reporting and step
//! wrapping; the gateway owns the provider APIs themselves.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::NodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    OpenAi,
    Gemini,
    DeepSeek,
}

impl AiProvider {
    /// Models a node of this provider may select.
    pub fn models(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["gpt-4o", "gpt-4.1-mini", "gpt-4"],
            Self::Gemini => &["gemini-2.0-flash", "gemini-2.5-flash", "gemini-2.5-pro"],
            Self::DeepSeek => &["deepseek-chat", "deepseek-reasoner"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRequest {
    pub provider: AiProvider,
    pub model: String,
    pub credential_id: Option<String>,
    pub system_prompt: String,
    pub user_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextResponse {
    pub text: String,
    /// Provider-specific token accounting.
    pub usage: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmailRequest {
    pub credential_id: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRequest {
    pub text: String,
    pub in_reply_to: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchPostsRequest {
    pub user_id: String,
    pub since_last_run: bool,
    pub max_results: u32,
}

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn generate_text(&self, request: TextRequest) -> Result<TextResponse, NodeError>;
    async fn send_email(&self, request: EmailRequest) -> Result<Value, NodeError>;
    async fn create_post(&self, request: PostRequest) -> Result<Value, NodeError>;
    async fn fetch_posts(&self, request: FetchPostsRequest) -> Result<Value, NodeError>;
}

/// Gateway used when no provider integrations are wired in.
///
/// Every call fails fatally so the run ends instead of retrying forever.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredGateway;

impl UnconfiguredGateway {
    fn unavailable(what: &str) -> NodeError {
        NodeError::fatal(format!("no provider integration configured for {what}"))
    }
}

#[async_trait]
impl ProviderGateway for UnconfiguredGateway {
    async fn generate_text(&self, request: TextRequest) -> Result<TextResponse, NodeError> {
        Err(Self::unavailable(&format!("{:?} text generation", request.provider)))
    }

    async fn send_email(&self, _request: EmailRequest) -> Result<Value, NodeError> {
        Err(Self::unavailable("email"))
    }

    async fn create_post(&self, _request: PostRequest) -> Result<Value, NodeError> {
        Err(Self::unavailable("social posts"))
    }

    async fn fetch_posts(&self, _request: FetchPostsRequest) -> Result<Value, NodeError> {
        Err(Self::unavailable("social timelines"))
    }
}
