pub mod executions;
pub mod schedules;
pub mod webhooks;

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use axum::Router;
    use engine::{CronScheduler, MemoryStore, Workflow, WorkflowGraph};
    use serde_json::Value;
    use tower::ServiceExt;
    use uuid::Uuid;

    use crate::{router, AppState};

    pub struct TestApp {
        pub router: Router,
        pub store: Arc<MemoryStore>,
        pub events: queue::TriggerReceiver,
        pub scheduler: CronScheduler,
    }

    impl TestApp {
        pub fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let (dispatcher, events) = queue::channel(16);
            let dispatcher = Arc::new(dispatcher);
            let scheduler = CronScheduler::new(store.clone(), dispatcher.clone());
            let state = AppState {
                dispatcher,
                graphs: store.clone(),
                executions: store.clone(),
                scheduler: scheduler.clone(),
            };
            Self {
                router: router(state),
                store,
                events,
                scheduler,
            }
        }

        pub fn workflow(&self, active: bool) -> Uuid {
            let mut graph = WorkflowGraph::new(Workflow::new("api", "owner-1"), vec![], vec![]);
            graph.workflow.active = active;
            let id = graph.workflow.id;
            self.store.insert_graph(graph);
            id
        }

        pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            let body = match body {
                Some(json) => {
                    request = request.header("content-type", "application/json");
                    Body::from(json.to_string())
                }
                None => Body::empty(),
            };
            let response = self
                .router
                .clone()
                .oneshot(request.body(body).unwrap())
                .await
                .unwrap();
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, json)
        }
    }
}
