use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::states::JobStatus;
use crate::events::{Listeners, StatusChange};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique job identity, assigned when the job is constructed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    fn next() -> Self {
        Self(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work: an opaque payload plus a lifecycle status.
///
/// The status is readable by anyone holding the job but only the queue that
/// owns it writes to it. Every write that changes the value notifies the
/// job's status listeners with the old and new values.
pub struct Job<T> {
    id: JobId,
    payload: T,
    status: AtomicU8,
    created: Instant,
    status_changed: Listeners<StatusChange>,
}

impl<T> Job<T> {
    pub fn new(payload: T) -> Self {
        Self {
            id: JobId::next(),
            payload,
            status: AtomicU8::new(JobStatus::New as u8),
            created: Instant::now(),
            status_changed: Listeners::new(),
        }
    }

    /// Builds a job reusing an existing identity, to provoke collisions.
    #[cfg(test)]
    pub(crate) fn with_id(id: JobId, payload: T) -> Self {
        Self { id, ..Self::new(payload) }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn status(&self) -> JobStatus {
        JobStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    pub fn created(&self) -> Instant {
        self.created
    }

    /// Time since the job was constructed.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Registers a listener for this job's status changes.
    pub fn on_status_changed<F>(&self, listener: F)
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.status_changed.subscribe(listener);
    }

    /// Writes `new`, notifying listeners if the value actually changed.
    /// Returns whether it changed.
    pub(crate) fn set_status(&self, new: JobStatus) -> bool {
        let old =
            JobStatus::from_u8(self.status.swap(new as u8, Ordering::SeqCst));

        if old == new {
            return false;
        }

        self.status_changed.emit(&StatusChange {
            job_id: self.id,
            old,
            new,
        });

        true
    }

    /// Moves from `from` to `to` only if the job is currently in `from`,
    /// without notifying anyone. On failure, returns the status the job was
    /// actually in.
    ///
    /// The caller owns the transition and reports it with [`Self::announce`]
    /// once it is ready to be observed.
    pub(crate) fn claim(
        &self,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<(), JobStatus> {
        self.status
            .compare_exchange(
                from as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(JobStatus::from_u8)
    }

    /// Notifies status listeners of a transition made by [`Self::claim`].
    pub(crate) fn announce(&self, old: JobStatus, new: JobStatus) {
        if old != new {
            self.status_changed.emit(&StatusChange {
                job_id: self.id,
                old,
                new,
            });
        }
    }

    #[cfg(test)]
    pub(crate) fn status_listener_count(&self) -> usize {
        self.status_changed.len()
    }
}

impl<T: fmt::Debug> fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("payload", &self.payload)
            .field("status", &self.status())
            .finish()
    }
}
