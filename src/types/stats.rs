use serde::Serialize;

/// A point-in-time summary of a queue, serialisable to YAML.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct QueueStats {
    /// upper bound on concurrently admitted jobs
    #[serde(rename = "max-concurrent-jobs")]
    pub max_concurrent_jobs: usize,
    /// number of jobs in the waiting list
    #[serde(rename = "current-jobs-waiting")]
    pub current_jobs_waiting: usize,
    /// number of jobs in the working set
    #[serde(rename = "current-jobs-working")]
    pub current_jobs_working: usize,

    /// cumulative count of accepted enqueues
    #[serde(rename = "total-jobs")]
    pub total_jobs: u64,
    /// cumulative count of jobs whose worker returned Ok
    #[serde(rename = "total-complete")]
    pub total_complete: u64,
    /// cumulative count of jobs whose worker failed or panicked
    #[serde(rename = "total-error")]
    pub total_error: u64,
}
