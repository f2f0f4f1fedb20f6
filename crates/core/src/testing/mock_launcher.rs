//! Mock job launcher for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::launcher::{JobHandle, JobLauncher, JobStatus, LauncherError, RemoveOutcome};

/// Mock implementation of the JobLauncher trait.
///
/// Provides controllable behavior for testing:
/// - Record started jobs and removals for assertions
/// - Drive job status by hand
/// - Simulate setup, start, inspect and removal failures
///
/// # Example
///
/// ```rust,ignore
/// let launcher = MockJobLauncher::new();
/// let handle = launcher.start_job(40).await?.unwrap();
///
/// launcher.finish_job(&handle, 0).await;
/// assert!(matches!(launcher.inspect(&handle).await?, JobStatus::Exited { .. }));
/// ```
#[derive(Debug, Default)]
pub struct MockJobLauncher {
    /// Known jobs and their current status.
    jobs: Arc<RwLock<HashMap<JobHandle, JobStatus>>>,
    /// Sizes passed to start_job, in call order.
    started: Arc<RwLock<Vec<u64>>>,
    /// Handles passed to remove, in call order.
    removed: Arc<RwLock<Vec<JobHandle>>>,
    setup_calls: Arc<RwLock<usize>>,
    setup_delay_ms: Arc<RwLock<u64>>,
    fail_setup: Arc<RwLock<bool>>,
    fail_start: Arc<RwLock<bool>>,
    return_no_handle: Arc<RwLock<bool>>,
    start_delay_ms: Arc<RwLock<u64>>,
    inspect_errors: Arc<RwLock<HashSet<JobHandle>>>,
    remove_results: Arc<RwLock<HashMap<JobHandle, Result<RemoveOutcome, LauncherError>>>>,
    counter: Arc<RwLock<u32>>,
}

impl MockJobLauncher {
    /// Create a new mock launcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of start_job calls.
    pub async fn start_count(&self) -> usize {
        self.started.read().await.len()
    }

    /// Sizes passed to start_job.
    pub async fn started_sizes(&self) -> Vec<u64> {
        self.started.read().await.clone()
    }

    /// Number of ensure_image_available calls.
    pub async fn setup_count(&self) -> usize {
        *self.setup_calls.read().await
    }

    /// Handles passed to remove.
    pub async fn removed_jobs(&self) -> Vec<JobHandle> {
        self.removed.read().await.clone()
    }

    pub async fn set_fail_setup(&self, fail: bool) {
        *self.fail_setup.write().await = fail;
    }

    /// Make ensure_image_available take this long, like a slow pull.
    pub async fn set_setup_delay_ms(&self, delay_ms: u64) {
        *self.setup_delay_ms.write().await = delay_ms;
    }

    pub async fn set_fail_start(&self, fail: bool) {
        *self.fail_start.write().await = fail;
    }

    /// Make start_job return `Ok(None)`.
    pub async fn set_return_no_handle(&self, no_handle: bool) {
        *self.return_no_handle.write().await = no_handle;
    }

    /// Delay every start_job call.
    pub async fn set_start_delay_ms(&self, delay_ms: u64) {
        *self.start_delay_ms.write().await = delay_ms;
    }

    /// Register a running job that this launcher did not start.
    pub async fn add_existing_job(&self, name: &str) -> JobHandle {
        let handle = JobHandle::new(name);
        self.jobs
            .write()
            .await
            .insert(handle.clone(), JobStatus::Running);
        handle
    }

    /// Set a job's status directly.
    pub async fn set_status(&self, handle: &JobHandle, status: JobStatus) {
        self.jobs.write().await.insert(handle.clone(), status);
    }

    /// Mark a job as exited with `exit_code`.
    pub async fn finish_job(&self, handle: &JobHandle, exit_code: i64) {
        self.set_status(
            handle,
            JobStatus::Exited {
                exit_code: Some(exit_code),
                oom_killed: false,
            },
        )
        .await;
    }

    /// Make inspect fail for `handle`.
    pub async fn set_inspect_error(&self, handle: &JobHandle) {
        self.inspect_errors.write().await.insert(handle.clone());
    }

    /// Override the result of removing `handle`.
    pub async fn set_remove_result(
        &self,
        handle: &JobHandle,
        result: Result<RemoveOutcome, LauncherError>,
    ) {
        self.remove_results
            .write()
            .await
            .insert(handle.clone(), result);
    }

    /// Drop a removal override.
    pub async fn clear_remove_result(&self, handle: &JobHandle) {
        self.remove_results.write().await.remove(handle);
    }
}

#[async_trait]
impl JobLauncher for MockJobLauncher {
    fn name(&self) -> &str {
        "mock"
    }

    async fn ensure_image_available(&self) -> Result<(), LauncherError> {
        *self.setup_calls.write().await += 1;
        let delay = *self.setup_delay_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if *self.fail_setup.read().await {
            return Err(LauncherError::ImageUnavailable(
                "mock setup failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn start_job(&self, size: u64) -> Result<Option<JobHandle>, LauncherError> {
        let delay = *self.start_delay_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.started.write().await.push(size);

        if *self.fail_start.read().await {
            return Err(LauncherError::CommandFailed {
                command: "mock start".to_string(),
                stderr: "mock start failure".to_string(),
            });
        }
        if *self.return_no_handle.read().await {
            return Ok(None);
        }

        let mut counter = self.counter.write().await;
        *counter += 1;
        let handle = JobHandle::new(format!("mock-job-{}", *counter));
        self.jobs
            .write()
            .await
            .insert(handle.clone(), JobStatus::Running);
        Ok(Some(handle))
    }

    async fn inspect(&self, handle: &JobHandle) -> Result<JobStatus, LauncherError> {
        if self.inspect_errors.read().await.contains(handle) {
            return Err(LauncherError::Io("mock inspect failure".to_string()));
        }
        Ok(self
            .jobs
            .read()
            .await
            .get(handle)
            .cloned()
            .unwrap_or(JobStatus::Missing))
    }

    async fn remove(&self, handle: &JobHandle) -> Result<RemoveOutcome, LauncherError> {
        self.removed.write().await.push(handle.clone());

        if let Some(result) = self.remove_results.read().await.get(handle) {
            return result.clone();
        }

        self.jobs.write().await.remove(handle);
        Ok(RemoveOutcome::Removed)
    }

    async fn list_jobs(&self) -> Result<Vec<JobHandle>, LauncherError> {
        let mut handles: Vec<JobHandle> = self.jobs.read().await.keys().cloned().collect();
        handles.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(handles)
    }
}
