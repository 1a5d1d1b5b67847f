//! The queue worker: one task per trigger event.

use std::sync::Arc;

use engine::{EngineError, TriggerEvent, WorkflowExecutor};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::TriggerReceiver;

pub struct Worker {
    receiver: TriggerReceiver,
    executor: Arc<WorkflowExecutor>,
}

impl Worker {
    pub fn new(receiver: TriggerReceiver, executor: Arc<WorkflowExecutor>) -> Self {
        Self { receiver, executor }
    }

    /// Run events until `shutdown` fires or every producer is dropped, then
    /// wait for the runs already started.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut runs = JoinSet::new();
        info!("queue worker started");

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = self.receiver.recv() => event,
            };
            let Some(event) = event else {
                info!("all producers dropped");
                break;
            };
            runs.spawn(process(Arc::clone(&self.executor), event));

            while let Some(finished) = runs.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "run task panicked");
                }
            }
        }

        info!(in_flight = runs.len(), "queue worker draining");
        while let Some(finished) = runs.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "run task panicked");
            }
        }
        info!("queue worker stopped");
    }
}

#[instrument(skip_all, fields(event_id = %event.id, workflow_id = %event.workflow_id))]
async fn process(executor: Arc<WorkflowExecutor>, event: TriggerEvent) {
    match executor.run(&event).await {
        Ok(result) if result.replayed => info!(status = %result.status, "duplicate event ignored"),
        Ok(result) => info!(execution_id = %result.execution_id, "run finished"),
        Err(EngineError::AlreadyRunning(_)) => warn!("event is already running"),
        Err(e) => warn!(error = %e, "run failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use engine::models::{Connection, NodeDefinition, Workflow, WorkflowGraph};
    use engine::{ExecutionStatus, ExecutionStore, ExecutorRegistry, MemoryStore, StatusPublisher};
    use nodes::mock::{FakeGateway, FakeHttpClient, MockNode};
    use nodes::NodeType;
    use serde_json::json;

    use crate::channel;

    fn fixture() -> (Arc<MemoryStore>, Arc<WorkflowExecutor>, uuid::Uuid, Arc<nodes::Guarded<MockNode>>) {
        let store = Arc::new(MemoryStore::new());
        let mock = MockNode::returning("out", json!("done")).guarded();
        let registry = ExecutorRegistry::builtin(Arc::new(FakeHttpClient::new()), Arc::new(FakeGateway::new()))
            .with(NodeType::HttpRequest, mock.clone());
        let graph = WorkflowGraph::new(
            Workflow::new("queued", "owner-1"),
            vec![
                NodeDefinition::new("a", "MANUAL_TRIGGER", json!({})),
                NodeDefinition::new("b", "HTTP_REQUEST", json!({})),
            ],
            vec![Connection::new("a", "b")],
        );
        let wf = graph.workflow.id;
        store.insert_graph(graph);

        let publisher = StatusPublisher::new(store.clone(), 16);
        let executor = Arc::new(WorkflowExecutor::new(
            store.clone(),
            store.clone(),
            Arc::new(registry),
            publisher,
        ));
        (store, executor, wf, mock)
    }

    async fn wait_for_terminal(store: &MemoryStore, event_id: &str) -> ExecutionStatus {
        for _ in 0..200 {
            if let Some(row) = store.get_by_event(event_id).await.unwrap() {
                if row.status.is_terminal() {
                    return row.status;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("event {event_id} never finished");
    }

    #[tokio::test]
    async fn queued_events_are_run() {
        let (store, executor, wf, mock) = fixture();
        let (queue, rx) = channel(8);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(Worker::new(rx, executor).run(shutdown.clone()));

        queue.enqueue(TriggerEvent::new("evt-1", wf, json!({}))).await.unwrap();
        queue.enqueue(TriggerEvent::new("evt-1", wf, json!({}))).await.unwrap();
        queue.enqueue(TriggerEvent::new("evt-2", wf, json!({}))).await.unwrap();

        assert_eq!(wait_for_terminal(&store, "evt-1").await, ExecutionStatus::Success);
        assert_eq!(wait_for_terminal(&store, "evt-2").await, ExecutionStatus::Success);

        shutdown.cancel();
        worker.await.unwrap();

        // The duplicate delivery never produced a second effect.
        assert_eq!(store.executions().len(), 2);
        assert_eq!(mock.0.effect_count(), 2);
    }

    #[tokio::test]
    async fn cancelled_cron_chain_creates_no_more_executions() {
        let (store, executor, wf, _mock) = fixture();
        let (queue, rx) = channel(8);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(Worker::new(rx, executor).run(shutdown.clone()));

        let scheduler = engine::CronScheduler::new(store.clone(), Arc::new(queue));
        scheduler
            .schedule(engine::ScheduleRequest {
                workflow_id: wf,
                cron_expression: "* * * * * *".into(),
                timezone: None,
            })
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_300)).await;
        assert!(scheduler.cancel(wf));
        // Let any run dispatched just before the cancel finish.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let at_cancel = store.executions().len();
        assert!(at_cancel >= 1);

        tokio::time::sleep(Duration::from_millis(2_000)).await;
        assert_eq!(store.executions().len(), at_cancel);
        for row in store.executions() {
            assert!(row.event_id.starts_with(&format!("cron:{wf}:")));
            assert_eq!(row.status, ExecutionStatus::Success);
        }

        shutdown.cancel();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn worker_stops_when_producers_are_dropped() {
        let (_store, executor, _wf, _mock) = fixture();
        let (queue, rx) = channel(1);
        let worker = tokio::spawn(Worker::new(rx, executor).run(CancellationToken::new()));

        drop(queue);
        tokio::time::timeout(Duration::from_secs(1), worker)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
