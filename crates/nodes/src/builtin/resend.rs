//! Resend email node.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::integrations::{EmailRequest, ProviderGateway};
use crate::template::is_templated;
use crate::traits::{Invocation, NodeHandler};
use crate::validate::{take, Violations};
use crate::{Context, NodeError, NodeType};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendConfig {
    pub variable_name: Option<String>,
    pub credential_id: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<Recipient>,
    pub subject: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Recipient {
    pub email: Option<String>,
}

/// Loose `local@domain.tld` shape check; templated addresses are checked
/// by the provider.
fn looks_like_email(address: &str) -> bool {
    if is_templated(address) {
        return true;
    }
    match address.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !address.contains(char::is_whitespace)
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

pub struct ResendHandler {
    gateway: Arc<dyn ProviderGateway>,
}

impl ResendHandler {
    pub fn new(gateway: Arc<dyn ProviderGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl NodeHandler for ResendHandler {
    type Config = ResendConfig;

    fn node_type(&self) -> NodeType {
        NodeType::Resend
    }

    fn validate(&self, config: &ResendConfig, v: &mut Violations) {
        v.variable_name(&config.variable_name);
        v.require_text("credentialId", &config.credential_id);
        if let Some(from) = v.require_text("from", &config.from) {
            if !looks_like_email(from) {
                v.push("from must be a valid email address");
            }
        }
        if config.to.is_empty() && !v.is_mistyped("to") {
            v.push("to must contain at least one recipient");
        }
        for (i, recipient) in config.to.iter().enumerate() {
            let field = format!("to[{i}].email");
            if let Some(email) = v.require_text(&field, &recipient.email) {
                if !looks_like_email(email) {
                    v.push(format!("{field} must be a valid email address"));
                }
            }
        }
        v.require_text("subject", &config.subject);
        v.require_text("content", &config.content);
    }

    async fn perform(
        &self,
        config: ResendConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let variable_name = take("variableName", config.variable_name)?;
        let request = EmailRequest {
            credential_id: take("credentialId", config.credential_id)?,
            from: invocation.render(&take("from", config.from)?, &context),
            to: config
                .to
                .into_iter()
                .filter_map(|r| r.email)
                .map(|email| invocation.render(&email, &context))
                .collect(),
            subject: invocation.render(&take("subject", config.subject)?, &context),
            content: invocation.render(&take("content", config.content)?, &context),
        };

        let gateway = Arc::clone(&self.gateway);
        let output = invocation
            .steps
            .run_step(
                &invocation.step_name("send-email"),
                Box::pin(async move { gateway.send_email(request).await }),
            )
            .await?;

        context.with_entry(variable_name, output)
    }
}
