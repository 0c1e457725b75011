//! Observer lists and the events delivered through them.
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{warn, Level};

use crate::types::job::{Job, JobId};
use crate::types::states::JobStatus;

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// A list of synchronous listeners for events of type `E`.
///
/// Listeners run on the thread that emits the event, in subscription order,
/// before `emit` returns. A panicking listener is caught and logged so it
/// can't take down the emitter or starve the listeners after it.
pub struct Listeners<E> {
    listeners: RwLock<Vec<Listener<E>>>,
}

impl<E> Listeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.listeners.write().push(Arc::new(listener));
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: &E) {
        // Clone the list out so listeners may subscribe further listeners
        // without deadlocking on the lock.
        let listeners = self.listeners.read().clone();

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event)))
                .is_err()
            {
                warn!("event listener panicked");
            }
        }
    }
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for Listeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}

/// A job moved from `old` to `new`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct StatusChange {
    pub job_id: JobId,
    pub old: JobStatus,
    pub new: JobStatus,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum QueueAction {
    Enqueue,
    Dequeue,
}

/// Raised by the waiting list for every successful enqueue or dequeue.
pub struct QueueChange<T> {
    pub action: QueueAction,
    pub job: Arc<Job<T>>,
}

/// A lifecycle message intended for external telemetry.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogEvent {
    pub level: Level,
    pub message: String,
}
