//! The public face of the scheduler.
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::Level;

use crate::error::QueueError;
use crate::events::{LogEvent, QueueAction, QueueChange, StatusChange};
use crate::options::QueueOptions;
use crate::populator::{Populator, WorkFuture, Worker};
use crate::types::job::{Job, JobId};
use crate::types::states::JobStatus;
use crate::types::stats::QueueStats;

/// Buffered status events per subscriber before it starts lagging.
const STATUS_CHANNEL_CAPACITY: usize = 1024;

/// A bounded-concurrency job queue.
///
/// Jobs wait in FIFO order and are admitted into a working set of at most
/// [`QueueOptions::max_concurrent_jobs`] jobs, each of which is handed to the
/// worker on its own tokio task. Finished jobs leave the working set and
/// free their slot for the next waiting job.
///
/// Cloning a `JobQueue` yields another handle to the same queue.
pub struct JobQueue<T> {
    populator: Arc<Populator<T>>,
    status_tx: broadcast::Sender<StatusChange>,
}

impl<T: Send + Sync + 'static> JobQueue<T> {
    /// Creates a queue that runs its jobs on the current tokio runtime.
    pub fn new(options: QueueOptions) -> Result<Self, QueueError> {
        let runtime =
            Handle::try_current().map_err(|_| QueueError::NoRuntime)?;

        Ok(Self::with_runtime(options, runtime))
    }

    /// Creates a queue that runs its jobs on `runtime`.
    pub fn with_runtime(options: QueueOptions, runtime: Handle) -> Self {
        let populator = Arc::new(Populator::new(options, runtime));
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);

        // Listeners hold a weak reference so the waiting list doesn't keep its
        // owner alive.
        let weak = Arc::downgrade(&populator);
        populator.waiting.on_changed(move |change: &QueueChange<T>| {
            let Some(populator) = weak.upgrade() else {
                return;
            };

            match change.action {
                QueueAction::Enqueue => {
                    populator.log(
                        Level::DEBUG,
                        format!("job {} enqueued", change.job.id()),
                    );
                    // An active pass re-checks the backlog before it
                    // finishes, and its own collision re-enqueues must not
                    // spin up another pass.
                    if !populator.is_populating() {
                        populator.trigger();
                    }
                },
                QueueAction::Dequeue => populator.log(
                    Level::DEBUG,
                    format!("job {} dequeued", change.job.id()),
                ),
            }
        });

        Self {
            populator,
            status_tx,
        }
    }

    /// Accepts `job` into the waiting list, returning the new waiting count.
    ///
    /// Fails without touching the queue if the job isn't in `New`, i.e. it
    /// has already been enqueued.
    pub fn enqueue(&self, job: Arc<Job<T>>) -> Result<usize, QueueError> {
        // Claims the job atomically, so racing enqueues of one job admit it
        // once and only the winner attaches its listener. The status is
        // InQueue before the populator can see it.
        job.claim(JobStatus::New, JobStatus::InQueue)
            .map_err(|status| QueueError::InvalidJob {
                id: job.id(),
                status,
            })?;

        {
            let weak = Arc::downgrade(&self.populator);
            let status_tx = self.status_tx.clone();
            job.on_status_changed(move |change| {
                if let Some(populator) = weak.upgrade() {
                    populator.log(
                        Level::DEBUG,
                        format!(
                            "job {} status changed {} -> {}",
                            change.job_id, change.old, change.new
                        ),
                    );
                }
                // No subscribers is fine.
                let _ = status_tx.send(*change);
            });
        }
        job.announce(JobStatus::New, JobStatus::InQueue);

        self.populator.record_enqueue();

        Ok(self.populator.waiting.enqueue(job))
    }

    /// Wraps `payload` in a fresh job and enqueues it.
    pub fn enqueue_payload(
        &self,
        payload: T,
    ) -> Result<(Arc<Job<T>>, usize), QueueError> {
        let job = Arc::new(Job::new(payload));
        let len = self.enqueue(job.clone())?;
        Ok((job, len))
    }

    /// Sets the function run for every admitted job. A returned `Err` or a
    /// panic marks the job `Error`; neither affects other jobs.
    ///
    /// Only jobs admitted after this call are dispatched to the new worker.
    pub fn set_worker<F, Fut>(&self, worker: F)
    where
        F: Fn(Arc<Job<T>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let worker: Worker<T> =
            Arc::new(move |job: Arc<Job<T>>| -> WorkFuture {
                Box::pin(worker(job))
            });

        *self.populator.worker.write() = Some(worker);
    }

    /// 1-based position of the job in the waiting list, or `None` once it
    /// has been admitted, finished, or was never enqueued here.
    pub fn job_order(&self, id: JobId) -> Option<usize> {
        self.populator.waiting.position(id)
    }

    pub fn waiting_count(&self) -> usize {
        self.populator.waiting.len()
    }

    pub fn working_count(&self) -> usize {
        self.populator.working.len()
    }

    /// Waiting plus working jobs.
    pub fn count(&self) -> usize {
        self.waiting_count() + self.working_count()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn options(&self) -> QueueOptions {
        self.populator.options
    }

    /// A best-effort snapshot of every job the queue holds: waiting jobs in
    /// order, then working jobs.
    ///
    /// The working set is read first; jobs only move from waiting to
    /// working, so no job appears twice.
    pub fn jobs(&self) -> Vec<Arc<Job<T>>> {
        let working = self.populator.working.snapshot();
        let mut jobs = self.populator.waiting.snapshot();
        jobs.extend(working);
        jobs
    }

    /// Receives status changes emitted after the call, for every job this
    /// queue has accepted.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.status_tx.subscribe()
    }

    /// Registers a listener for lifecycle log messages.
    pub fn on_log<F>(&self, listener: F)
    where
        F: Fn(&LogEvent) + Send + Sync + 'static,
    {
        self.populator.log.subscribe(listener);
    }

    /// Registers a listener for waiting-list enqueues and dequeues.
    pub fn on_queue_changed<F>(&self, listener: F)
    where
        F: Fn(&QueueChange<T>) + Send + Sync + 'static,
    {
        self.populator.waiting.on_changed(listener);
    }

    /// Resolves once nothing is waiting or working. Jobs left in `Waiting`
    /// for lack of a worker keep this pending.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.populator.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.populator.is_idle() {
                return;
            }

            notified.await;
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            max_concurrent_jobs: self.populator.options.max_concurrent_jobs(),
            current_jobs_waiting: self.waiting_count(),
            current_jobs_working: self.working_count(),
            total_jobs: self.populator.total_jobs(),
            total_complete: self.populator.total_complete(),
            total_error: self.populator.total_error(),
        }
    }
}

impl<T> Clone for JobQueue<T> {
    fn clone(&self) -> Self {
        Self {
            populator: self.populator.clone(),
            status_tx: self.status_tx.clone(),
        }
    }
}

impl<T> fmt::Debug for JobQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("options", &self.populator.options)
            .field("waiting", &self.populator.waiting.len())
            .field("working", &self.populator.working.len())
            .finish()
    }
}
