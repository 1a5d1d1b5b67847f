//! Node-level error type.

use thiserror::Error;

/// Errors returned by a node executor.
///
/// The engine uses the variant to decide retry behaviour:
/// - `Retryable`: the run is replayed with exponential back-off.
/// - `Fatal`: the execution is immediately marked as failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// Transient failure; the engine should re-try the run.
    #[error("retryable node error: {0}")]
    Retryable(String),

    /// Permanent failure; no retry should be attempted.
    #[error("fatal node error: {0}")]
    Fatal(String),
}

impl NodeError {
    pub fn retryable(msg: impl Into<String>) -> Self {
        Self::Retryable(msg.into())
    }

    pub fn fatal(msg: impl Into<String>) -> Self {
        Self::Fatal(msg.into())
    }

    /// Whether the step substrate may re-invoke the failed work.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable(_))
    }

    /// The bare message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable(msg) | Self::Fatal(msg) => msg,
        }
    }
}
