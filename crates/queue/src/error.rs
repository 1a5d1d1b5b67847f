use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The worker stopped and dropped its receiver.
    #[error("trigger queue is closed")]
    Closed,
}
