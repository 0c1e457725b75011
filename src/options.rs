use std::num::NonZeroUsize;
use std::thread;

/// Construction-time settings for a [`JobQueue`](crate::JobQueue).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct QueueOptions {
    max_concurrent_jobs: usize,
}

impl QueueOptions {
    /// Builds options admitting at most `max_concurrent_jobs` jobs at once.
    /// Values below 1 are clamped to 1.
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            max_concurrent_jobs: max_concurrent_jobs.max(1),
        }
    }

    pub fn max_concurrent_jobs(&self) -> usize {
        self.max_concurrent_jobs
    }

    /// Values below 1 are clamped to 1.
    pub fn set_max_concurrent_jobs(&mut self, max_concurrent_jobs: usize) {
        self.max_concurrent_jobs = max_concurrent_jobs.max(1);
    }
}

impl Default for QueueOptions {
    /// One job per available CPU, or 1 if that can't be determined.
    fn default() -> Self {
        Self::new(
            thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        )
    }
}
