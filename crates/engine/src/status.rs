//! Node status publishing.
//!
//! Every transition is broadcast on the node type's channel for live
//! subscribers and merged into the execution row's status map. The
//! broadcast is fire-and-forget; the row is the source of truth. Neither
//! path ever fails the node: errors are logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use nodes::{NodeStatus, NodeType, StatusSink};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::ExecutionStore;

/// Topic every status message is published under.
pub const STATUS_TOPIC: &str = "status";

/// One message on a status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    /// `<node-type-slug>-execution`
    pub channel: String,
    pub topic: String,
    pub execution_id: Uuid,
    pub node_id: String,
    pub status: NodeStatus,
}

#[derive(Clone)]
pub struct StatusPublisher {
    sender: broadcast::Sender<StatusEvent>,
    store: Arc<dyn ExecutionStore>,
}

impl StatusPublisher {
    /// `capacity` bounds the broadcast buffer; slow subscribers lag and
    /// miss messages rather than blocking runs.
    pub fn new(store: Arc<dyn ExecutionStore>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, store }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.sender.subscribe()
    }

    /// A sink that publishes on behalf of one execution.
    pub fn for_execution(&self, execution_id: Uuid) -> ExecutionStatusSink {
        ExecutionStatusSink {
            publisher: self.clone(),
            execution_id,
        }
    }

    /// Broadcast and persist one transition.
    pub async fn publish(&self, execution_id: Uuid, node_type: NodeType, node_id: &str, status: NodeStatus) {
        let event = StatusEvent {
            channel: node_type.channel(),
            topic: STATUS_TOPIC.to_owned(),
            execution_id,
            node_id: node_id.to_owned(),
            status,
        };
        if self.sender.send(event).is_err() {
            debug!(node_id, %status, "no live status subscribers");
        }

        if let Err(e) = self.store.merge_node_status(execution_id, node_id, status).await {
            warn!(%execution_id, node_id, %status, error = %e, "failed to persist node status");
        }
    }
}

/// [`StatusSink`] bound to one execution.
#[derive(Clone)]
pub struct ExecutionStatusSink {
    publisher: StatusPublisher,
    execution_id: Uuid,
}

#[async_trait]
impl StatusSink for ExecutionStatusSink {
    async fn publish(&self, node_type: NodeType, node_id: &str, status: NodeStatus) {
        self.publisher
            .publish(self.execution_id, node_type, node_id, status)
            .await;
    }
}
