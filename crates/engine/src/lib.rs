//! `engine` crate: workflow graphs, run control and cron scheduling.
//!
//! A run is driven by [`WorkflowExecutor`]: it orders the graph with
//! [`dag::topological_sort`], dispatches every node through the
//! [`ExecutorRegistry`], publishes node status via [`StatusPublisher`] and
//! records the outcome in an [`store::ExecutionStore`]. [`CronScheduler`]
//! turns cron triggers into a stream of [`TriggerEvent`]s.

pub mod dag;
pub mod error;
pub mod executor;
pub mod models;
pub mod registry;
pub mod scheduler;
pub mod status;
pub mod store;

pub use dag::{execution_order, topological_sort};
pub use error::{error_stack, EngineError};
pub use executor::{ExecutionResult, ExecutorConfig, WorkflowExecutor};
pub use models::{
    Connection, Execution, ExecutionStatus, NodeDefinition, TriggerEvent, Workflow, WorkflowGraph,
};
pub use registry::ExecutorRegistry;
pub use scheduler::{CronScheduler, ScheduleRequest, TriggerDispatcher};
pub use status::{StatusEvent, StatusPublisher};
pub use store::{ExecutionStore, GraphStore, MemoryStore, PgStore};
