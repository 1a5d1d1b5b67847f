//! Discord webhook node.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::http::{HttpClient, HttpMethod, HttpRequest};
use crate::template::is_templated;
use crate::traits::{Invocation, NodeHandler};
use crate::validate::{take, Violations};
use crate::{Context, NodeError, NodeType};

/// Discord rejects messages longer than this.
pub const MAX_CONTENT_CHARS: usize = 2000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscordConfig {
    pub variable_name: Option<String>,
    pub webhook_url: Option<String>,
    pub content: Option<String>,
    pub username: Option<String>,
}

pub struct DiscordHandler {
    client: Arc<dyn HttpClient>,
}

impl DiscordHandler {
    pub fn new(client: Arc<dyn HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeHandler for DiscordHandler {
    type Config = DiscordConfig;

    fn node_type(&self) -> NodeType {
        NodeType::Discord
    }

    fn validate(&self, config: &DiscordConfig, v: &mut Violations) {
        v.variable_name(&config.variable_name);
        if let Some(url) = v.require_text("webhookUrl", &config.webhook_url) {
            if !is_templated(url) && reqwest::Url::parse(url).is_err() {
                v.push("webhookUrl must be a valid URL");
            }
        }
        v.require_text("content", &config.content);
    }

    async fn perform(
        &self,
        config: DiscordConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let variable_name = take("variableName", config.variable_name)?;
        let url = invocation.render(&take("webhookUrl", config.webhook_url)?, &context);
        let content: String = invocation
            .render(&take("content", config.content)?, &context)
            .chars()
            .take(MAX_CONTENT_CHARS)
            .collect();
        let username = config
            .username
            .map(|name| invocation.render(&name, &context))
            .filter(|name| !name.is_empty());

        let client = Arc::clone(&self.client);
        invocation
            .steps
            .run_step(
                &invocation.step_name("discord-message"),
                Box::pin(async move {
                    let body = json!({ "content": content, "username": username });
                    client
                        .send(HttpRequest {
                            method: HttpMethod::Post,
                            url,
                            json_body: Some(body),
                        })
                        .await?;
                    Ok::<_, NodeError>(json!(true))
                }),
            )
            .await?;

        context.with_entry(variable_name, json!({ "discordMessage": true }))
    }
}
