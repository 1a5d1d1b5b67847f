//! Engine-level error types.

use nodes::{NodeError, ScheduleError};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the workflow engine (graph checks, runs, scheduling).
#[derive(Debug, Error)]
pub enum EngineError {
    // ------ Graph errors ------

    /// Two or more nodes share the same ID.
    #[error("duplicate node ID: '{0}'")]
    DuplicateNodeId(String),

    /// Topological sort detected a cycle.
    #[error("workflow graph contains a cycle")]
    CycleDetected,

    /// A node carries a type tag no executor is registered for.
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    // ------ Run errors ------

    #[error("workflow {0} not found")]
    WorkflowNotFound(Uuid),

    #[error("workflow {0} is not active")]
    WorkflowInactive(Uuid),

    #[error("workflow {0} has no owner")]
    MissingOwner(Uuid),

    #[error("invalid initial data: {0}")]
    InvalidInitialData(String),

    /// Another run for the same event is in progress in this process.
    #[error("event '{0}' is already being processed")]
    AlreadyRunning(String),

    /// A node failed. Retryable node errors may be retried by the run
    /// controller; fatal ones end the run.
    #[error("node '{node_id}' failed: {source}")]
    Node {
        node_id: String,
        #[source]
        source: NodeError,
    },

    /// An executor removed or rewrote a key that was already in the context.
    #[error("node '{node_id}' changed existing context key '{key}'")]
    ContextConflict { node_id: String, key: String },

    /// Every retry of a retryable failure failed.
    #[error("run failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<EngineError>,
    },

    // ------ Scheduling ------

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("cron expression '{0}' never fires again")]
    NoUpcomingFire(String),

    /// The trigger queue refused an event.
    #[error("dispatch failed: {0}")]
    Dispatch(String),

    // ------ Persistence ------

    /// Persistence error from the db crate.
    #[error("database error: {0}")]
    Database(#[from] db::DbError),

    /// A stored row could not be mapped onto the domain model.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
}

impl EngineError {
    /// True for failures a replay of the run might get past: retryable node
    /// errors and persistence errors.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Node { source, .. } => source.is_retryable(),
            Self::Database(_) => true,
            _ => false,
        }
    }

    /// The node this error is attributed to, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::Node { node_id, .. } | Self::ContextConflict { node_id, .. } => Some(node_id),
            Self::RetriesExhausted { source, .. } => source.node_id(),
            _ => None,
        }
    }
}

/// Render an error and its causes, outermost first, for the execution row's
/// `error_stack` column.
pub fn error_stack(err: &EngineError) -> String {
    let mut out = String::new();
    for (depth, cause) in anyhow::Chain::new(err).enumerate() {
        if depth == 0 {
            out.push_str(&cause.to_string());
        } else {
            if depth == 1 {
                out.push_str("\n\nCaused by:");
            }
            out.push_str(&format!("\n    {}: {cause}", depth - 1));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_follows_the_node_error() {
        let retryable = EngineError::Node {
            node_id: "b".into(),
            source: NodeError::retryable("503"),
        };
        let fatal = EngineError::Node {
            node_id: "b".into(),
            source: NodeError::fatal("bad config"),
        };
        assert!(retryable.is_retryable());
        assert!(!fatal.is_retryable());
        assert!(!EngineError::CycleDetected.is_retryable());
    }

    #[test]
    fn stack_lists_every_cause() {
        let err = EngineError::RetriesExhausted {
            attempts: 4,
            source: Box::new(EngineError::Node {
                node_id: "b".into(),
                source: NodeError::retryable("connection reset"),
            }),
        };
        let stack = error_stack(&err);
        assert!(stack.starts_with("run failed after 4 attempts"));
        assert!(stack.contains("0: node 'b' failed: retryable node error: connection reset"));
        assert!(stack.contains("1: retryable node error: connection reset"));
        assert_eq!(err.node_id(), Some("b"));
    }
}
