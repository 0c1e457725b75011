//! A bounded-concurrency job scheduler.
//!
//! Jobs are enqueued into a FIFO waiting list, admitted into a working set of
//! at most `max_concurrent_jobs` entries, and handed to a caller-supplied
//! async worker. Each job publishes its status transitions
//! (`New -> InQueue -> Waiting -> Running -> Complete | Error`) as they
//! happen; a failing worker only ever affects its own job.
pub mod error;
pub mod events;
pub mod line_reader;
pub mod options;
mod populator;
pub mod queue;
pub mod types;
pub mod waiting_list;
pub mod working_set;

pub use error::QueueError;
pub use events::{LogEvent, QueueAction, QueueChange, StatusChange};
pub use options::QueueOptions;
pub use populator::WorkFuture;
pub use queue::JobQueue;
pub use types::job::{Job, JobId};
pub use types::states::JobStatus;
pub use types::stats::QueueStats;
