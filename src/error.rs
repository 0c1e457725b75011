use std::fmt;

use crate::types::job::JobId;
use crate::types::states::JobStatus;

/// Errors surfaced synchronously to callers of the queue.
///
/// Failures inside a running job never appear here: they're reported through
/// the job's status and the queue's log events instead.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueError {
    /// The job was already handed to a queue, so it isn't in `New`.
    InvalidJob { id: JobId, status: JobStatus },
    /// The queue was constructed outside of a tokio runtime.
    NoRuntime,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidJob { id, status } => {
                write!(f, "job {id} can't be enqueued from status {status}")
            },
            Self::NoRuntime => f.write_str("no tokio runtime available"),
        }
    }
}

impl std::error::Error for QueueError {}
