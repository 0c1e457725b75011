use std::fmt;

use serde::Serialize;

/// Lifecycle of a job. Transitions only ever move forward:
///
/// `New -> InQueue -> Waiting -> Running -> Complete | Error`
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum JobStatus {
    /// Constructed, not yet enqueued.
    New = 0,
    /// Accepted into the waiting list.
    InQueue = 1,
    /// Admitted into the working set, about to start.
    Waiting = 2,
    /// The worker has been invoked and has not yet returned.
    Running = 3,
    /// The worker returned `Ok`.
    Complete = 4,
    /// The worker returned `Err` or panicked.
    Error = 5,
}

impl JobStatus {
    /// Complete and Error are terminal: no further transitions happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    pub fn as_str(self) -> &'static str {
        use JobStatus::*;

        match self {
            New => "new",
            InQueue => "in-queue",
            Waiting => "waiting",
            Running => "running",
            Complete => "complete",
            Error => "error",
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        use JobStatus::*;

        match value {
            0 => New,
            1 => InQueue,
            2 => Waiting,
            3 => Running,
            4 => Complete,
            // Only values written through `as u8` are ever stored.
            _ => Error,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// This impl is used to allow QueueStats and status events to be serialised.
impl Serialize for JobStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}
