//! Admission control: moves jobs from the waiting list into the working set
//! and dispatches them to the worker.
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn, Level};

use crate::events::{Listeners, LogEvent};
use crate::options::QueueOptions;
use crate::types::job::Job;
use crate::types::states::JobStatus;
use crate::waiting_list::WaitingList;
use crate::working_set::WorkingSet;

/// The future returned by a worker for a single job.
pub type WorkFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub(crate) type Worker<T> =
    Arc<dyn Fn(Arc<Job<T>>) -> WorkFuture + Send + Sync>;

/// State shared between the queue facade, populate passes, and running jobs.
pub(crate) struct Populator<T> {
    pub(crate) options: QueueOptions,
    pub(crate) waiting: WaitingList<T>,
    pub(crate) working: WorkingSet<T>,
    pub(crate) worker: RwLock<Option<Worker<T>>>,
    pub(crate) log: Listeners<LogEvent>,
    pub(crate) runtime: Handle,
    /// Fast-path guard: set while a pass is admitting jobs.
    populating: AtomicBool,
    /// Critical section around the admission loop.
    admission: Mutex<()>,
    /// Woken when a populate call finds nothing waiting, working, or in
    /// transit.
    pub(crate) idle: Notify,
    total_jobs: AtomicU64,
    total_complete: AtomicU64,
    total_error: AtomicU64,
}

impl<T: Send + Sync + 'static> Populator<T> {
    pub(crate) fn new(options: QueueOptions, runtime: Handle) -> Self {
        Self {
            options,
            waiting: WaitingList::new(),
            working: WorkingSet::new(),
            worker: RwLock::new(None),
            log: Listeners::new(),
            runtime,
            populating: AtomicBool::new(false),
            admission: Mutex::new(()),
            idle: Notify::new(),
            total_jobs: AtomicU64::new(0),
            total_complete: AtomicU64::new(0),
            total_error: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_enqueue(&self) {
        self.total_jobs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn total_jobs(&self) -> u64 {
        self.total_jobs.load(Ordering::Relaxed)
    }

    pub(crate) fn total_complete(&self) -> u64 {
        self.total_complete.load(Ordering::Relaxed)
    }

    pub(crate) fn total_error(&self) -> u64 {
        self.total_error.load(Ordering::Relaxed)
    }

    /// Sends `message` to `tracing` and to every log listener.
    pub(crate) fn log(&self, level: Level, message: String) {
        match level {
            Level::ERROR => error!("{message}"),
            Level::WARN => warn!("{message}"),
            Level::INFO => info!("{message}"),
            Level::DEBUG => debug!("{message}"),
            Level::TRACE => trace!("{message}"),
        }

        if !self.log.is_empty() {
            self.log.emit(&LogEvent { level, message });
        }
    }

    /// Requests a populate pass on the runtime without waiting for it.
    pub(crate) fn trigger(self: &Arc<Self>) {
        let populator = Arc::clone(self);
        self.runtime.spawn(async move { populator.populate() });
    }

    /// Admits waiting jobs until the waiting list is empty or the working set
    /// is full. Concurrent calls collapse into a single active pass.
    pub(crate) fn populate(self: &Arc<Self>) {
        self.run_passes();

        // Whichever call ends the last active pass sees the queue go idle.
        if self.is_idle() {
            self.idle.notify_waiters();
        }
    }

    fn run_passes(self: &Arc<Self>) {
        let mut collided = false;

        loop {
            if self.populating.load(Ordering::SeqCst) {
                return;
            }

            let resumable = {
                let _section = self.admission.lock();

                if self.populating.load(Ordering::SeqCst) {
                    return;
                }
                self.populating.store(true, Ordering::SeqCst);

                let resumable = self.admit();

                self.populating.store(false, Ordering::SeqCst);
                resumable
            };

            // A trigger arriving between the end of admit() and clearing the
            // flag will have bailed on the fast path, so look again. After a
            // collision that happens at most once, or the pass would spin on
            // the same id.
            if !resumable {
                if collided {
                    return;
                }
                collided = true;
            }
            if !self.has_backlog() {
                return;
            }
        }
    }

    pub(crate) fn is_populating(&self) -> bool {
        self.populating.load(Ordering::SeqCst)
    }

    fn has_backlog(&self) -> bool {
        !self.waiting.is_empty()
            && self.working.len() < self.options.max_concurrent_jobs()
    }

    /// The admission loop. Runs inside the critical section. Returns false if
    /// the pass stopped on an id collision, which is retried once and
    /// otherwise waits for a fresh trigger.
    fn admit(self: &Arc<Self>) -> bool {
        while self.has_backlog() {
            let Some(job) = self.waiting.try_dequeue() else {
                continue;
            };

            if self.working.try_add(job.id(), job.clone()) {
                job.set_status(JobStatus::Waiting);
                self.log(Level::DEBUG, format!("job {} scheduled", job.id()));
                self.dispatch(job);
            } else {
                self.log(
                    Level::WARN,
                    format!("job {} collides with a working job", job.id()),
                );
                self.waiting.enqueue(job);
                return false;
            }
        }

        true
    }

    /// Hands an admitted job to the worker on its own task. With no worker
    /// set the job stays admitted in `Waiting`.
    fn dispatch(self: &Arc<Self>, job: Arc<Job<T>>) {
        let Some(worker) = self.worker.read().clone() else {
            self.log(
                Level::WARN,
                format!("no worker set, job {} will not run", job.id()),
            );
            return;
        };

        let populator = Arc::clone(self);
        self.runtime.spawn(async move { populator.run(job, worker).await });
    }

    async fn run(self: Arc<Self>, job: Arc<Job<T>>, worker: Worker<T>) {
        job.set_status(JobStatus::Running);

        // The worker gets its own task so that a panic, including one raised
        // while building the future, comes back as a JoinError.
        let outcome = {
            let job = job.clone();
            self.runtime.spawn(async move { worker(job).await }).await
        };

        match outcome {
            Ok(Ok(())) => {
                self.total_complete.fetch_add(1, Ordering::Relaxed);
                self.log(
                    Level::DEBUG,
                    format!("job {} complete after {:?}", job.id(), job.age()),
                );
                job.set_status(JobStatus::Complete);
            },
            Ok(Err(err)) => {
                self.total_error.fetch_add(1, Ordering::Relaxed);
                self.log(
                    Level::ERROR,
                    format!(
                        "job {} failed after {:?}: {err:#}",
                        job.id(),
                        job.age()
                    ),
                );
                job.set_status(JobStatus::Error);
            },
            Err(err) => {
                self.total_error.fetch_add(1, Ordering::Relaxed);
                self.log(
                    Level::ERROR,
                    format!("job {} worker aborted: {err}", job.id()),
                );
                job.set_status(JobStatus::Error);
            },
        }

        self.working.try_remove(job.id());
        self.populate();
    }

    /// True when no job is waiting, working, or in transit between the two.
    pub(crate) fn is_idle(&self) -> bool {
        // A job in transit has left the waiting list but isn't yet in the
        // working set; that only happens while the flag is set, so the flag
        // must be read last.
        self.waiting.is_empty()
            && self.working.is_empty()
            && !self.populating.load(Ordering::SeqCst)
    }
}
