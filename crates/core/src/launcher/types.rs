//! Types for the job launcher module.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit codes of a process killed by SIGKILL / SIGTERM.
const SIGKILL_EXIT: i64 = 137;
const SIGTERM_EXIT: i64 = 143;

/// Opaque identifier of a production job (container name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(pub String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Observed state of a production job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, running, restarting or paused.
    Running,
    /// Reached a terminal state.
    Exited {
        exit_code: Option<i64>,
        /// The substrate killed the job for memory or eviction.
        oom_killed: bool,
    },
    /// The launcher has no job under this handle.
    Missing,
}

/// Classification of a terminal job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Completed,
    /// Killed by a signal or evicted by the substrate.
    Preempted,
    Failed,
}

impl Termination {
    pub fn classify(exit_code: Option<i64>, oom_killed: bool) -> Self {
        if oom_killed {
            return Termination::Preempted;
        }
        match exit_code {
            Some(0) => Termination::Completed,
            Some(SIGKILL_EXIT) | Some(SIGTERM_EXIT) => Termination::Preempted,
            _ => Termination::Failed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Termination::Completed => "completed",
            Termination::Preempted => "preempted",
            Termination::Failed => "failed",
        }
    }
}

/// Result of a removal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoveOutcome {
    Removed,
    /// The substrate is already removing the job; ask again later.
    InProgress,
}

/// Errors from the job launcher.
#[derive(Debug, Clone, Error)]
pub enum LauncherError {
    /// The job image could not be found or pulled.
    #[error("image unavailable: {0}")]
    ImageUnavailable(String),

    /// A launcher command exited unsuccessfully.
    #[error("{command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    /// The launcher binary could not be run.
    #[error("I/O error: {0}")]
    Io(String),

    /// Launcher output could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<std::io::Error> for LauncherError {
    fn from(e: std::io::Error) -> Self {
        LauncherError::Io(e.to_string())
    }
}
