//! The node executor contract.
//!
//! Every node kind is dispatched through [`NodeExecutor`]. Built-in nodes
//! implement the narrower [`NodeHandler`] and are wrapped in [`Guarded`],
//! which owns the shared lifecycle: validate the configuration, check the
//! node may run, publish `loading`, perform the effect, then publish
//! `success`, `error` or `retrying` and hand the error back to the engine.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::step::StepRunner;
use crate::template::TemplateRenderer;
use crate::validate::{parse_config, Violations};
use crate::{Context, NodeError, NodeStatus, NodeType};

/// Receives node status transitions. Publishing is best effort: sinks log
/// their own failures and never surface them to the executor.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish(&self, node_type: NodeType, node_id: &str, status: NodeStatus);
}

/// Everything an executor needs besides the running context.
///
/// Built by the run controller from a node it loaded, so the node is known
/// to exist.
pub struct Invocation<'a> {
    pub node_id: &'a str,
    pub workflow_id: Option<Uuid>,
    pub execution_id: Uuid,
    /// Owner of the workflow, used for credential lookups.
    pub owner_id: &'a str,
    pub raw_config: &'a Value,
    /// Number of connections ending at this node.
    pub incoming_connections: usize,
    pub steps: &'a dyn StepRunner,
    pub status: &'a dyn StatusSink,
    pub templates: &'a dyn TemplateRenderer,
}

impl Invocation<'_> {
    /// Step names are scoped by node id so two nodes of one type never share
    /// a memoized result.
    pub fn step_name(&self, step: &str) -> String {
        format!("{}:{step}", self.node_id)
    }

    pub fn render(&self, template: &str, context: &Context) -> String {
        self.templates.render(template, context)
    }
}

/// The dispatch contract.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Consume the running context and return it with this node's output
    /// added.
    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError>;
}

/// A node kind's configuration schema and effect.
#[async_trait]
pub trait NodeHandler: Send + Sync {
    type Config: DeserializeOwned + Send;

    fn node_type(&self) -> NodeType;

    /// Record every violated field in `violations`.
    fn validate(&self, _config: &Self::Config, _violations: &mut Violations) {}

    /// Perform the node's effect through `invocation.steps`.
    async fn perform(
        &self,
        config: Self::Config,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError>;
}

/// Non-trigger nodes must have at least one incoming connection.
pub fn ensure_can_execute(node_type: NodeType, invocation: &Invocation<'_>) -> Result<(), NodeError> {
    if !node_type.is_trigger() && invocation.incoming_connections == 0 {
        return Err(NodeError::fatal(format!(
            "Node with id {} has no incoming connections",
            invocation.node_id
        )));
    }
    Ok(())
}

/// Wraps a [`NodeHandler`] with the status lifecycle.
#[derive(Debug, Clone)]
pub struct Guarded<H>(pub H);

#[async_trait]
impl<H: NodeHandler> NodeExecutor for Guarded<H> {
    async fn execute(
        &self,
        invocation: &Invocation<'_>,
        context: Context,
    ) -> Result<Context, NodeError> {
        let node_type = self.0.node_type();
        let node_id = invocation.node_id;

        let prepared = parse_config::<H::Config>(node_type, invocation.raw_config).and_then(
            |(config, mut violations)| {
                self.0.validate(&config, &mut violations);
                violations.into_result(node_type)?;
                ensure_can_execute(node_type, invocation)?;
                Ok(config)
            },
        );

        let config = match prepared {
            Ok(config) => config,
            Err(err) => {
                invocation.status.publish(node_type, node_id, NodeStatus::Error).await;
                return Err(err);
            }
        };

        invocation.status.publish(node_type, node_id, NodeStatus::Loading).await;

        match self.0.perform(config, invocation, context).await {
            Ok(context) => {
                invocation.status.publish(node_type, node_id, NodeStatus::Success).await;
                Ok(context)
            }
            Err(err) => {
                let status = if err.is_retryable() {
                    NodeStatus::Retrying
                } else {
                    NodeStatus::Error
                };
                debug!(node_id, %status, error = %err, "node effect failed");
                invocation.status.publish(node_type, node_id, status).await;
                Err(err)
            }
        }
    }
}
