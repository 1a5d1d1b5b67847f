//! OpenAI, Gemini and DeepSeek text generation nodes.
//!
//! One handler serves all three providers; they differ only in the model
//! list and the node type they report status under.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::integrations::{AiProvider, ProviderGateway, TextRequest};
use crate::traits::{Invocation, NodeHandler};
use crate::validate::{take, Violations};
use crate::{Context, NodeError, NodeType};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiConfig {
    pub variable_name: Option<String>,
    pub credential_id: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub user_prompt: Option<String>,
}

pub struct AiHandler {
    provider: AiProvider,
    gateway: Arc<dyn ProviderGateway>,
}

impl AiHandler {
    pub fn new(provider: AiProvider, gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { provider, gateway }
    }
}

#[async_trait]
impl NodeHandler for AiHandler {
    type Config = AiConfig;

    fn node_type(&self) -> NodeType {
        match self.provider {
            AiProvider::OpenAi => NodeType::OpenAi,
            AiProvider::Gemini => NodeType::Gemini,
            AiProvider::DeepSeek => NodeType::DeepSeek,
        }
    }

    fn validate(&self, config: &AiConfig, v: &mut Violations) {
        v.variable_name(&config.variable_name);
        if let Some(model) = v.require_text("model", &config.model) {
            let models = self.provider.models();
            if !models.contains(&model) {
                v.push(format!("model must be one of {}", models.join(", ")));
            }
        }
        v.require_text("userPrompt", &config.user_prompt);
    }

    async fn perform(
        &self,
        config: AiConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let variable_name = take("variableName", config.variable_name)?;
        let system_prompt = match config.system_prompt.as_deref().map(str::trim) {
            Some(prompt) if !prompt.is_empty() => invocation.render(prompt, &context),
            _ => DEFAULT_SYSTEM_PROMPT.to_owned(),
        };
        let request = TextRequest {
            provider: self.provider,
            model: take("model", config.model)?,
            credential_id: config.credential_id,
            system_prompt,
            user_prompt: invocation.render(&take("userPrompt", config.user_prompt)?, &context),
        };

        let gateway = Arc::clone(&self.gateway);
        let output = invocation
            .steps
            .run_step(
                &invocation.step_name("generate-text"),
                Box::pin(async move {
                    let response = gateway.generate_text(request).await?;
                    Ok::<_, NodeError>(json!({
                        "aiResponse": { "text": response.text },
                        "usage": response.usage,
                    }))
                }),
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
    use crate::NodeStatus;

    fn handler(provider: AiProvider, gateway: &Arc<FakeGateway>) -> Guarded<AiHandler> {
        Guarded(AiHandler::new(provider, Arc::clone(gateway) as Arc<dyn ProviderGateway>))
    }

    #[tokio::test]
    async fn renders_prompts_and_stores_text() {
        let gateway = Arc::new(FakeGateway::new().with_text("a haiku"));
        let config = json!({
            "variableName": "poem",
            "model": "gemini-2.0-flash",
            "userPrompt": "Write about {{topic}}"
        });
        let bench = TestBench::new("ai", config).with_incoming(1);
        let seed = Context::from_value(json!({ "topic": "rust" })).unwrap();

        let ctx = handler(AiProvider::Gemini, &gateway)
            .execute(&bench.invocation(), seed)
            .await
            .unwrap();

        assert_eq!(ctx.get("poem").unwrap()["aiResponse"]["text"], "a haiku");
        let sent = gateway.text_requests();
        assert_eq!(sent[0].user_prompt, "Write about rust");
        assert_eq!(sent[0].system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(bench.status.channels(), vec!["gemini-execution"; 2]);
    }

    #[tokio::test]
    async fn model_must_belong_to_provider() {
        let gateway = Arc::new(FakeGateway::new());
        let config = json!({ "variableName": "x", "model": "gpt-4o", "userPrompt": "hi" });
        let bench = TestBench::new("ai", config).with_incoming(1);

        let err = handler(AiProvider::DeepSeek, &gateway)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(err.message().contains("model must be one of deepseek-chat, deepseek-reasoner"));
        assert_eq!(bench.status.statuses_for("ai"), vec![NodeStatus::Error]);
        assert!(gateway.text_requests().is_empty());
    }

    #[tokio::test]
    async fn existing_key_is_a_conflict() {
        let gateway = Arc::new(FakeGateway::new().with_text("t"));
        let config = json!({ "variableName": "taken", "model": "gpt-4o", "userPrompt": "hi" });
        let bench = TestBench::new("ai", config).with_incoming(1);
        let seed = Context::from_value(json!({ "taken": 1 })).unwrap();

        let err = handler(AiProvider::OpenAi, &gateway)
            .execute(&bench.invocation(), seed)
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(bench.status.statuses_for("ai"), vec![NodeStatus::Loading, NodeStatus::Error]);
    }
}
