/// Crate-wide result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Typed queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue name is not in the registered set.
    #[error("unknown queue: {queue}")]
    QueueUnknown { queue: String },

    /// The queue's waiting backlog hit its configured bound.
    #[error("queue saturated: {queue} ({waiting} waiting)")]
    QueueSaturated { queue: String, waiting: usize },

    /// No job with this id is tracked.
    #[error("unknown job: {job_id}")]
    JobNotFound { job_id: String },

    /// The requested transition is not legal from the job's current status.
    #[error("invalid transition for job {job_id}: {detail}")]
    InvalidTransition { job_id: String, detail: String },
}

impl QueueError {
    #[must_use]
    pub fn unknown(queue: impl Into<String>) -> Self {
        Self::QueueUnknown {
            queue: queue.into(),
        }
    }

    #[must_use]
    pub fn saturated(queue: impl Into<String>, waiting: usize) -> Self {
        Self::QueueSaturated {
            queue: queue.into(),
            waiting,
        }
    }

    #[must_use]
    pub fn job_not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound {
            job_id: job_id.into(),
        }
    }

    #[must_use]
    pub fn invalid_transition(job_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::InvalidTransition {
            job_id: job_id.into(),
            detail: detail.into(),
        }
    }
}
