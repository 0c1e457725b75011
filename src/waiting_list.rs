//! The FIFO holding area for jobs not yet admitted to run.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::events::{Listeners, QueueAction, QueueChange};
use crate::types::job::{Job, JobId};

/// An observable FIFO of jobs.
///
/// Every successful enqueue and dequeue raises a [`QueueChange`] to all
/// listeners before the call returns. Events are raised after the internal
/// lock is released, so listeners may call back into the list.
pub struct WaitingList<T> {
    jobs: Mutex<VecDeque<Arc<Job<T>>>>,
    /// Mirrors `jobs.len()` so it can be read without taking the lock.
    len: AtomicUsize,
    changed: Listeners<QueueChange<T>>,
}

impl<T> WaitingList<T> {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(VecDeque::new()),
            len: AtomicUsize::new(0),
            changed: Listeners::new(),
        }
    }

    pub fn on_changed<F>(&self, listener: F)
    where
        F: Fn(&QueueChange<T>) + Send + Sync + 'static,
    {
        self.changed.subscribe(listener);
    }

    /// Appends `job` to the tail, returning the new length.
    pub fn enqueue(&self, job: Arc<Job<T>>) -> usize {
        let len = {
            let mut jobs = self.jobs.lock();
            jobs.push_back(job.clone());
            self.len.store(jobs.len(), Ordering::SeqCst);
            jobs.len()
        };

        self.changed.emit(&QueueChange {
            action: QueueAction::Enqueue,
            job,
        });

        len
    }

    /// Removes and returns the head without blocking, or `None` if empty.
    pub fn try_dequeue(&self) -> Option<Arc<Job<T>>> {
        let job = {
            let mut jobs = self.jobs.lock();
            let job = jobs.pop_front()?;
            self.len.store(jobs.len(), Ordering::SeqCst);
            job
        };

        self.changed.emit(&QueueChange {
            action: QueueAction::Dequeue,
            job: job.clone(),
        });

        Some(job)
    }

    /// Approximate length: exact when read, but may be stale by the time the
    /// caller acts on it.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 1-based position of the job with `id`, if it is still waiting.
    pub fn position(&self, id: JobId) -> Option<usize> {
        self.jobs
            .lock()
            .iter()
            .position(|job| job.id() == id)
            .map(|idx| idx + 1)
    }

    /// Head-to-tail copy of the current contents.
    pub fn snapshot(&self) -> Vec<Arc<Job<T>>> {
        self.jobs.lock().iter().cloned().collect()
    }
}

impl<T> Default for WaitingList<T> {
    fn default() -> Self {
        Self::new()
    }
}
