//! Trait definitions for the job launcher module.

use async_trait::async_trait;

use super::types::{JobHandle, JobStatus, LauncherError, RemoveOutcome};

/// Starts, observes and removes background production jobs.
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Returns the name of this launcher implementation.
    fn name(&self) -> &str;

    /// Make the job image runnable (pull if missing). Idempotent.
    async fn ensure_image_available(&self) -> Result<(), LauncherError>;

    /// Start a job producing `size` puzzles.
    ///
    /// `Ok(None)` means the substrate accepted the call but returned no handle.
    async fn start_job(&self, size: u64) -> Result<Option<JobHandle>, LauncherError>;

    /// Current state of a job.
    async fn inspect(&self, handle: &JobHandle) -> Result<JobStatus, LauncherError>;

    /// Release a terminal job's resources.
    async fn remove(&self, handle: &JobHandle) -> Result<RemoveOutcome, LauncherError>;

    /// Every job carrying this launcher's label, running or not.
    async fn list_jobs(&self) -> Result<Vec<JobHandle>, LauncherError>;
}
