//! In-memory tracking set of production jobs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::launcher::JobHandle;
use crate::metrics;

/// A production job believed to be running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedJob {
    pub handle: JobHandle,
    /// Puzzles requested. `None` for jobs recovered after a restart.
    pub size: Option<u64>,
    pub started_at: DateTime<Utc>,
}

/// Jobs shared by one scheduler and its monitor.
///
/// Advisory only: losing it causes at worst a redundant launch.
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<RwLock<HashMap<JobHandle, TrackedJob>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, job: TrackedJob) {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.handle.clone(), job);
        metrics::JOBS_TRACKED.set(jobs.len() as i64);
    }

    pub async fn remove(&self, handle: &JobHandle) -> Option<TrackedJob> {
        let mut jobs = self.jobs.write().await;
        let removed = jobs.remove(handle);
        metrics::JOBS_TRACKED.set(jobs.len() as i64);
        removed
    }

    pub async fn contains(&self, handle: &JobHandle) -> bool {
        self.jobs.read().await.contains_key(handle)
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Tracked jobs ordered by start time.
    pub async fn snapshot(&self) -> Vec<TrackedJob> {
        let mut jobs: Vec<TrackedJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        jobs
    }
}
