//! Trigger nodes. Their data arrives with the triggering event, so at run
//! time they only record a step and pass the context through.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::schedule::CronSchedule;
use crate::traits::{Invocation, NodeHandler};
use crate::validate::Violations;
use crate::{Context, NodeError, NodeType};

async fn pass_through(
    node_type: NodeType,
    invocation: &Invocation<'_>,
    context: Context,
) -> Result<Context, NodeError> {
    let snapshot = context.to_value();
    let recorded = invocation
        .steps
        .run_step(&invocation.step_name(node_type.slug()), Box::pin(async move { Ok(snapshot) }))
        .await?;
    Ok(context.absorb(Context::from_value(recorded)?))
}

/// Manual, form, payment and placeholder triggers.
#[derive(Debug, Clone, Copy)]
pub struct TriggerHandler {
    node_type: NodeType,
}

impl TriggerHandler {
    pub fn new(node_type: NodeType) -> Self {
        debug_assert!(node_type.is_trigger());
        Self { node_type }
    }
}

#[async_trait]
impl NodeHandler for TriggerHandler {
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
        pass_through(self.node_type, invocation, context).await
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronTriggerConfig {
    pub variable_name: Option<String>,
    pub cron_expression: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CronTriggerHandler;

#[async_trait]
impl NodeHandler for CronTriggerHandler {
    type Config = CronTriggerConfig;

    fn node_type(&self) -> NodeType {
        NodeType::CronTrigger
    }

    fn validate(&self, config: &CronTriggerConfig, v: &mut Violations) {
        if config.variable_name.is_some() {
            v.variable_name(&config.variable_name);
        }
        if let Some(expression) = v.require_text("cronExpression", &config.cron_expression) {
            let mut schedule = CronSchedule::new(expression);
            schedule.timezone = config.timezone.clone();
            if let Err(e) = schedule.validate() {
                v.push(e.to_string());
            }
        }
    }

    async fn perform(
        &self,
        _config: CronTriggerConfig,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        pass_through(NodeType::CronTrigger, invocation, context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::TestBench;
    use crate::traits::{Guarded, NodeExecutor};
    use crate::NodeStatus;
    use serde_json::json;

    #[tokio::test]
    async fn triggers_pass_the_context_through_without_incoming_edges() {
        let bench = TestBench::new("start", json!({ "anything": "goes" }));
        let seed = Context::from_value(json!({ "stripe": { "eventId": "evt_1" } })).unwrap();

        let ctx = Guarded(TriggerHandler::new(NodeType::StripeTrigger))
            .execute(&bench.invocation(), seed.clone())
            .await
            .unwrap();

        assert_eq!(ctx, seed);
        assert_eq!(bench.steps.executed_steps(), vec!["start:stripe-trigger".to_owned()]);
        assert_eq!(bench.status.channels()[0], "stripe-trigger-execution");
    }

    #[tokio::test]
    async fn cron_trigger_validates_expression_and_timezone() {
        let bench = TestBench::new(
            "tick",
            json!({ "cronExpression": "not a cron", "timezone": "Mars/Olympus" }),
        );
        let err = Guarded(CronTriggerHandler)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert!(err.message().starts_with("Invalid configuration for Cron Trigger node"));
        assert_eq!(bench.status.statuses_for("tick"), vec![NodeStatus::Error]);
    }

    #[tokio::test]
    async fn cron_trigger_accepts_a_zoned_five_field_expression() {
        let bench = TestBench::new(
            "tick",
            json!({ "cronExpression": "*/15 9-17 * * 1-5", "timezone": "Europe/Paris" }),
        );
        let ctx = Guarded(CronTriggerHandler)
            .execute(&bench.invocation(), Context::new())
            .await
            .unwrap();
        assert!(ctx.is_empty());
    }
}
