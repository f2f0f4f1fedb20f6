//! Production job launcher.
//!
//! The `JobLauncher` trait is the minimal capability set the replenishment
//! scheduler and job monitor need from an execution substrate. `DockerLauncher`
//! drives the local docker CLI.

mod config;
mod docker;
mod traits;
mod types;

pub use config::{DockerConfig, LauncherBackend, LauncherConfig};
pub use docker::{DockerLauncher, JOB_SIZE_ENV};
pub use traits::JobLauncher;
pub use types::{JobHandle, JobStatus, LauncherError, RemoveOutcome, Termination};

use std::sync::Arc;

/// Build the launcher selected by `config.backend`.
pub fn create_launcher(config: &LauncherConfig) -> Arc<dyn JobLauncher> {
    match config.backend {
        LauncherBackend::Docker => Arc::new(DockerLauncher::new(config.docker.clone())),
    }
}
