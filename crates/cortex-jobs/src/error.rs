//! Scheduler error types.

use thiserror::Error;

/// Errors raised by the job queue and by job handlers.
#[derive(Debug, Error)]
pub enum JobError {
    /// A handler is already registered for this job type.
    #[error("handler already registered for job type '{0}'")]
    HandlerExists(String),

    /// The dispatch loop has shut down.
    #[error("job queue is closed")]
    QueueClosed,

    /// Handler-reported failure; the message becomes the job's failure text.
    #[error("{0}")]
    Failed(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
