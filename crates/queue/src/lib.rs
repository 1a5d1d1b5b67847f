//! `queue` crate: in-process delivery of trigger events to the run
//! controller.
//!
//! Producers (the API, the cron scheduler) hold a [`TriggerQueue`]; a single
//! [`Worker`] drains the matching [`TriggerReceiver`] and runs every event
//! on its own task.

pub mod error;
pub mod worker;

pub use error::QueueError;
pub use worker::Worker;

use async_trait::async_trait;
use engine::{EngineError, TriggerDispatcher, TriggerEvent};
use tokio::sync::mpsc;
use tracing::debug;

/// Create a bounded queue. Producers wait once `capacity` events are
/// pending.
pub fn channel(capacity: usize) -> (TriggerQueue, TriggerReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (TriggerQueue { tx }, TriggerReceiver { rx })
}

/// Producer half. Cheap to clone.
#[derive(Debug, Clone)]
pub struct TriggerQueue {
    tx: mpsc::Sender<TriggerEvent>,
}

impl TriggerQueue {
    /// Enqueue an event, waiting for room if the queue is full.
    ///
    /// # Errors
    /// [`QueueError::Closed`] once the worker is gone.
    pub async fn enqueue(&self, event: TriggerEvent) -> Result<(), QueueError> {
        let event_id = event.id.clone();
        self.tx.send(event).await.map_err(|_| QueueError::Closed)?;
        debug!(%event_id, "trigger event queued");
        Ok(())
    }
}

#[async_trait]
impl TriggerDispatcher for TriggerQueue {
    async fn dispatch(&self, event: TriggerEvent) -> Result<(), EngineError> {
        self.enqueue(event)
            .await
            .map_err(|e| EngineError::Dispatch(e.to_string()))
    }
}

/// Consumer half, owned by the [`Worker`].
#[derive(Debug)]
pub struct TriggerReceiver {
    rx: mpsc::Receiver<TriggerEvent>,
}

impl TriggerReceiver {
    pub async fn recv(&mut self) -> Option<TriggerEvent> {
        self.rx.recv().await
    }

    /// An event that is already waiting, if any.
    pub fn try_recv(&mut self) -> Option<TriggerEvent> {
        self.rx.try_recv().ok()
    }
}
