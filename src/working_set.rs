//! Jobs currently admitted for execution, keyed by id.
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::types::job::{Job, JobId};

/// A concurrent map of admitted jobs.
///
/// It doesn't enforce a capacity itself: the populator checks `len()` before
/// each admission while holding its critical section.
pub struct WorkingSet<T> {
    jobs: DashMap<JobId, Arc<Job<T>>>,
}

impl<T> WorkingSet<T> {
    pub fn new() -> Self {
        Self {
            jobs: DashMap::new(),
        }
    }

    /// Inserts `job` under `id`. Returns false, leaving the existing entry in
    /// place, if `id` is already present.
    pub fn try_add(&self, id: JobId, job: Arc<Job<T>>) -> bool {
        match self.jobs.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(job);
                true
            },
        }
    }

    pub fn try_remove(&self, id: JobId) -> Option<Arc<Job<T>>> {
        self.jobs.remove(&id).map(|(_, job)| job)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<Job<T>>> {
        self.jobs.iter().map(|entry| entry.value().clone()).collect()
    }
}

impl<T> Default for WorkingSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
