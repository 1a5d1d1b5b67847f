//! X (Twitter) nodes: create a post, fetch a user's posts.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::integrations::{FetchPostsRequest, PostRequest, ProviderGateway};
use crate::traits::{Invocation, NodeHandler};
use crate::validate::{take, Violations};
use crate::{Context, NodeError, NodeType};

pub const MAX_POST_CHARS: usize = 300;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostConfig {
    pub variable_name: Option<String>,
    pub text: Option<String>,
    #[serde(alias = "in_reply_to_tweet_id")]
    pub in_reply_to_tweet_id: Option<String>,
}

pub struct CreatePostHandler {
    gateway: Arc<dyn ProviderGateway>,
}

impl CreatePostHandler {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl NodeHandler for CreatePostHandler {
    type Config = CreatePostConfig;

    fn node_type(&self) -> NodeType {
        NodeType::XCreatePost
    }

    fn validate(&self, config: &CreatePostConfig, v: &mut Violations) {
        v.variable_name(&config.variable_name);
        if let Some(text) = v.require_text("text", &config.text) {
            if text.chars().count() > MAX_POST_CHARS {
                v.push(format!("text must be at most {MAX_POST_CHARS} characters"));
            }
        }
    }

    async fn perform(
        &self,
        config: CreatePostConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let variable_name = take("variableName", config.variable_name)?;
        let text = invocation.render(&take("text", config.text)?, &context);
        if text.is_empty() || text.chars().count() > MAX_POST_CHARS {
            return Err(NodeError::fatal(format!(
                "rendered post must be between 1 and {MAX_POST_CHARS} characters"
            )));
        }
        let request = PostRequest {
            text,
            in_reply_to: config
                .in_reply_to_tweet_id
                .map(|id| invocation.render(&id, &context))
                .filter(|id| !id.is_empty()),
        };

        let gateway = Arc::clone(&self.gateway);
        let output = invocation
            .steps
            .run_step(
                &invocation.step_name("create-post"),
                Box::pin(async move { gateway.create_post(request).await }),
            )
            .await?;

        context.with_entry(variable_name, output)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPostsConfig {
    pub variable_name: Option<String>,
    pub user_id: Option<String>,
    /// Only fetch posts newer than the previous run.
    #[serde(default)]
    pub since: bool,
    pub max_tweets: Option<u32>,
}

pub struct GetPostsHandler {
    gateway: Arc<dyn ProviderGateway>,
}

impl GetPostsHandler {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl NodeHandler for GetPostsHandler {
    type Config = GetPostsConfig;

    fn node_type(&self) -> NodeType {
        NodeType::XGetTweet
    }

    fn validate(&self, config: &GetPostsConfig, v: &mut Violations) {
        v.variable_name(&config.variable_name);
        v.require_text("userId", &config.user_id);
        v.in_range("maxTweets", config.max_tweets, 5, 100);
    }

    async fn perform(
        &self,
        config: GetPostsConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let variable_name = take("variableName", config.variable_name)?;
        let request = FetchPostsRequest {
            user_id: invocation.render(&take("userId", config.user_id)?, &context),
            since_last_run: config.since,
            max_results: config.max_tweets.unwrap_or(10),
        };

        let gateway = Arc::clone(&self.gateway);
        let output = invocation
            .steps
            .run_step(
                &invocation.step_name("fetch-posts"),
                Box::pin(async move { gateway.fetch_posts(request).await }),
            )
            .await?;

        context.with_entry(variable_name, output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{FakeGateway, TestBench};
    use crate::traits::{Guarded, NodeExecutor};
    use serde_json::json;

    #[tokio::test]
    async fn long_posts_are_rejected_before_loading() {
        let gateway = Arc::new(FakeGateway::new());
        let config = json!({ "variableName": "post", "text": "y".repeat(301) });
        let bench = TestBench::new("x", config).with_incoming(1);

        let err = Guarded(CreatePostHandler::new(Arc::clone(&gateway) as Arc<dyn ProviderGateway>))
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(err.message().contains("text must be at most 300 characters"));
        assert!(gateway.posts().is_empty());
    }

    #[tokio::test]
    async fn creates_reply() {
        let gateway = Arc::new(FakeGateway::new());
        let config = json!({
            "variableName": "post",
            "text": "shipped {{version}}",
            "in_reply_to_tweet_id": "123"
        });
        let bench = TestBench::new("x", config).with_incoming(1);
        let seed = Context::from_value(json!({ "version": "1.2" })).unwrap();

        let ctx = Guarded(CreatePostHandler::new(Arc::clone(&gateway) as Arc<dyn ProviderGateway>))
            .execute(&bench.invocation(), seed)
            .await
            .unwrap();

        assert!(ctx.contains_key("post"));
        let posts = gateway.posts();
        assert_eq!(posts[0].text, "shipped 1.2");
        assert_eq!(posts[0].in_reply_to.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn max_tweets_range() {
        let gateway = Arc::new(FakeGateway::new());
        let config = json!({ "variableName": "feed", "userId": "u1", "maxTweets": 4 });
        let bench = TestBench::new("x", config).with_incoming(1);

        let err = Guarded(GetPostsHandler::new(Arc::clone(&gateway) as Arc<dyn ProviderGateway>))
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(err.message().contains("maxTweets must be between 5 and 100"));
    }
}
