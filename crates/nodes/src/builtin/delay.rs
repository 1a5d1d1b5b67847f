//! Delay node: a durable sleep through the step runner.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::traits::{Invocation, NodeHandler};
use crate::validate::Violations;
use crate::{Context, NodeError, NodeType};

/// One day, in milliseconds.
pub const MAX_DELAY_MS: u64 = 86_400_000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayConfig {
    /// Milliseconds.
    pub duration: Option<u64>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DelayHandler;

#[async_trait]
impl NodeHandler for DelayHandler {
    type Config = DelayConfig;

    fn node_type(&self) -> NodeType {
        NodeType::Delay
    }

    fn validate(&self, config: &DelayConfig, v: &mut Violations) {
        v.in_range("duration", config.duration, 0, MAX_DELAY_MS);
    }

    async fn perform(
        &self,
        config: DelayConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let duration = Duration::from_millis(config.duration.unwrap_or_default());
        debug!(node_id = invocation.node_id, ?duration, "delaying run");
        invocation
            .steps
            .sleep(&invocation.step_name("delay"), duration)
            .await?;
        Ok(context)
    }
}
