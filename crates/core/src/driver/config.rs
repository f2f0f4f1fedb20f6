//! Driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the depot driver loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Enable/disable the background loops.
    /// When disabled, ticks only run when triggered through the API.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Interval of the main tick: inventory, replenishment, assignment and
    /// fulfillment (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// How often tracked production jobs are checked (milliseconds).
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_ms: u64,

    /// How often the retention reaper runs (milliseconds).
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_ms: u64,

    /// Grace period between marking a puzzle completed and deleting it.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Publications in flight at once, across both phases.
    #[serde(default = "default_max_outstanding_fulfillments")]
    pub max_outstanding_fulfillments: usize,

    /// Production jobs outstanding at once. Only 1 is supported.
    #[serde(default = "default_max_outstanding_jobs")]
    pub max_outstanding_jobs: usize,

    /// Re-seed the job tracking set from the launcher on start.
    #[serde(default = "default_enabled")]
    pub recover_jobs_on_start: bool,
}

fn default_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    5000 // 5 seconds
}

fn default_monitor_interval() -> u64 {
    10_000 // 10 seconds
}

fn default_reaper_interval() -> u64 {
    60_000 // 1 minute
}

fn default_retention_secs() -> u64 {
    86_400 // 1 day
}

fn default_max_outstanding_fulfillments() -> usize {
    16
}

fn default_max_outstanding_jobs() -> usize {
    1
}

impl DriverConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            poll_interval_ms: default_poll_interval(),
            monitor_interval_ms: default_monitor_interval(),
            reaper_interval_ms: default_reaper_interval(),
            retention_secs: default_retention_secs(),
            max_outstanding_fulfillments: default_max_outstanding_fulfillments(),
            max_outstanding_jobs: default_max_outstanding_jobs(),
            recover_jobs_on_start: default_enabled(),
        }
    }
}
