//! Docker CLI job launcher.

use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::config::DockerConfig;
use super::traits::JobLauncher;
use super::types::{JobHandle, JobStatus, LauncherError, RemoveOutcome};

/// Environment variable carrying the number of puzzles a job should produce.
pub const JOB_SIZE_ENV: &str = "DEPOT_JOB_SIZE";

const INSPECT_FORMAT: &str = "{{.State.Status}} {{.State.ExitCode}} {{.State.OOMKilled}}";

/// Launches production jobs as detached docker containers.
pub struct DockerLauncher {
    config: DockerConfig,
}

impl DockerLauncher {
    pub fn new(config: DockerConfig) -> Self {
        Self { config }
    }

    async fn docker(&self, args: &[String]) -> Result<Output, LauncherError> {
        debug!(binary = %self.config.binary.display(), ?args, "Running docker command");
        let output = Command::new(&self.config.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;
        Ok(output)
    }

    fn command_failed(args: &[String], output: &Output) -> LauncherError {
        LauncherError::CommandFailed {
            command: format!("docker {}", args.first().map(String::as_str).unwrap_or("")),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// Arguments for `docker run` of a job named `name` producing `size` puzzles.
    fn run_args(&self, name: &str, size: u64) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--label".to_string(),
            self.config.label.clone(),
            "--name".to_string(),
            name.to_string(),
        ];
        if let Some(network) = &self.config.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for volume in &self.config.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        args.push("-e".to_string());
        args.push(format!("{}={}", JOB_SIZE_ENV, size));
        for (key, value) in &self.config.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.config.image.clone());
        args
    }
}

#[async_trait]
impl JobLauncher for DockerLauncher {
    fn name(&self) -> &str {
        "docker"
    }

    async fn ensure_image_available(&self) -> Result<(), LauncherError> {
        let inspect = vec![
            "image".to_string(),
            "inspect".to_string(),
            self.config.image.clone(),
        ];
        if self.docker(&inspect).await?.status.success() {
            debug!(image = %self.config.image, "Producer image present");
            return Ok(());
        }

        info!(image = %self.config.image, "Pulling producer image");
        let pull = vec!["pull".to_string(), self.config.image.clone()];
        let output = self.docker(&pull).await?;
        if !output.status.success() {
            return Err(LauncherError::ImageUnavailable(format!(
                "{}: {}",
                self.config.image,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        info!(image = %self.config.image, "Producer image pulled");
        Ok(())
    }

    async fn start_job(&self, size: u64) -> Result<Option<JobHandle>, LauncherError> {
        let name = format!("{}-{}", self.config.name_prefix, uuid::Uuid::new_v4().simple());
        let args = self.run_args(&name, size);
        let output = self.docker(&args).await?;
        if !output.status.success() {
            return Err(Self::command_failed(&args, &output));
        }

        // `run -d` prints the container id; without it nothing was started.
        if String::from_utf8_lossy(&output.stdout).trim().is_empty() {
            warn!(%name, "docker run returned no container id");
            return Ok(None);
        }
        Ok(Some(JobHandle::new(name)))
    }

    async fn inspect(&self, handle: &JobHandle) -> Result<JobStatus, LauncherError> {
        let args = vec![
            "inspect".to_string(),
            "--format".to_string(),
            INSPECT_FORMAT.to_string(),
            handle.to_string(),
        ];
        let output = self.docker(&args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if is_no_such(&stderr) {
                return Ok(JobStatus::Missing);
            }
            return Err(Self::command_failed(&args, &output));
        }
        parse_inspect(&String::from_utf8_lossy(&output.stdout))
    }

    async fn remove(&self, handle: &JobHandle) -> Result<RemoveOutcome, LauncherError> {
        let args = vec!["rm".to_string(), handle.to_string()];
        let output = self.docker(&args).await?;
        if output.status.success() {
            return Ok(RemoveOutcome::Removed);
        }
        classify_remove_failure(&String::from_utf8_lossy(&output.stderr))
            .ok_or_else(|| Self::command_failed(&args, &output))
    }

    async fn list_jobs(&self) -> Result<Vec<JobHandle>, LauncherError> {
        let args = vec![
            "ps".to_string(),
            "-a".to_string(),
            "--filter".to_string(),
            format!("label={}", self.config.label),
            "--format".to_string(),
            "{{.Names}}".to_string(),
        ];
        let output = self.docker(&args).await?;
        if !output.status.success() {
            return Err(Self::command_failed(&args, &output));
        }
        Ok(parse_names(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn is_no_such(stderr: &str) -> bool {
    stderr.contains("No such container") || stderr.contains("No such object")
}

/// Parse `docker inspect --format` output in [`INSPECT_FORMAT`].
fn parse_inspect(stdout: &str) -> Result<JobStatus, LauncherError> {
    let mut fields = stdout.split_whitespace();
    let status = fields
        .next()
        .ok_or_else(|| LauncherError::Parse("empty inspect output".to_string()))?;
    let exit_code = fields.next().and_then(|code| code.parse::<i64>().ok());
    let oom_killed = fields.next() == Some("true");

    match status {
        "created" | "running" | "restarting" | "paused" => Ok(JobStatus::Running),
        // "removing" is terminal: the follow-up rm reports it as in progress.
        "exited" | "dead" | "removing" => Ok(JobStatus::Exited {
            exit_code,
            oom_killed,
        }),
        other => Err(LauncherError::Parse(format!(
            "unknown container status: {}",
            other
        ))),
    }
}

/// Map a failed `docker rm` to an outcome, or `None` for a real error.
fn classify_remove_failure(stderr: &str) -> Option<RemoveOutcome> {
    if stderr.contains("already in progress") {
        Some(RemoveOutcome::InProgress)
    } else if is_no_such(stderr) {
        Some(RemoveOutcome::Removed)
    } else {
        None
    }
}

fn parse_names(stdout: &str) -> Vec<JobHandle> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(JobHandle::new)
        .collect()
}
