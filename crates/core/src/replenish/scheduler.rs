//! Replenishment scheduler.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::audit::{record_opt, AuditEvent, AuditHandle};
use crate::inventory::InventoryTracker;
use crate::launcher::{JobHandle, JobLauncher, LauncherError};
use crate::metrics;
use crate::single_flight::SingleFlight;

use super::tracker::{JobTracker, TrackedJob};

const IMAGE_SETUP: &str = "ensure_image_available";

/// Result of one replenishment decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplenishOutcome {
    /// Inventory is at or above the minimum.
    NoDeficit,
    /// A tracked job is assumed to cover the deficit.
    AlreadyRunning { tracked: usize },
    /// Another caller is launching right now.
    LaunchInProgress,
    /// One-time image setup failed; retried on the next call.
    SetupFailed { reason: String },
    LaunchFailed { reason: String },
    Launched { handle: JobHandle, size: u64 },
}

impl ReplenishOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoDeficit => "no_deficit",
            Self::AlreadyRunning { .. } => "already_running",
            Self::LaunchInProgress => "launch_in_progress",
            Self::SetupFailed { .. } => "setup_failed",
            Self::LaunchFailed { .. } => "launch_failed",
            Self::Launched { .. } => "launched",
        }
    }
}

/// Launches one production job at a time, sized to the deficit.
///
/// `max_outstanding_jobs` is carried through from configuration, which only
/// accepts 1.
pub struct ReplenishmentScheduler {
    launcher: Arc<dyn JobLauncher>,
    inventory: Arc<InventoryTracker>,
    tracker: JobTracker,
    max_outstanding_jobs: usize,
    launch_gate: Semaphore,
    setup: SingleFlight<(), LauncherError>,
    audit: Option<AuditHandle>,
}

impl ReplenishmentScheduler {
    pub fn new(
        launcher: Arc<dyn JobLauncher>,
        inventory: Arc<InventoryTracker>,
        tracker: JobTracker,
        max_outstanding_jobs: usize,
        audit: Option<AuditHandle>,
    ) -> Self {
        debug_assert_eq!(
            max_outstanding_jobs, 1,
            "only one outstanding production job is supported"
        );
        Self {
            launcher,
            inventory,
            tracker,
            max_outstanding_jobs,
            launch_gate: Semaphore::new(max_outstanding_jobs),
            setup: SingleFlight::new(),
            audit,
        }
    }

    /// The tracking set shared with the job monitor.
    pub fn tracker(&self) -> &JobTracker {
        &self.tracker
    }

    /// Make the job image available, once per scheduler.
    ///
    /// Concurrent callers share one attempt; a failed attempt is retried by
    /// the next call.
    pub async fn prepare(&self) -> Result<(), LauncherError> {
        let launcher = Arc::clone(&self.launcher);
        self.setup
            .memoize(IMAGE_SETUP, move || async move {
                launcher.ensure_image_available().await
            })
            .await
    }

    /// Re-seed the tracking set from jobs the launcher still knows about.
    pub async fn recover(&self) -> Result<usize, LauncherError> {
        let handles = self.launcher.list_jobs().await?;
        let mut recovered = 0;
        for handle in handles {
            if self.tracker.contains(&handle).await {
                continue;
            }
            info!(job = %handle, "Recovered production job");
            self.tracker
                .insert(TrackedJob {
                    handle,
                    size: None,
                    started_at: Utc::now(),
                })
                .await;
            recovered += 1;
        }
        Ok(recovered)
    }

    /// Launch a job sized to the deficit if none is outstanding.
    pub async fn maybe_replenish(&self, current_count: u64) -> ReplenishOutcome {
        let outcome = self.decide(current_count).await;
        metrics::REPLENISH_DECISIONS
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn decide(&self, current_count: u64) -> ReplenishOutcome {
        let deficit = self.inventory.deficit(current_count);
        if deficit == 0 {
            debug!(current_count, "Inventory sufficient");
            return ReplenishOutcome::NoDeficit;
        }

        // Held until the handle is tracked, so a concurrent caller never
        // sees an empty tracker while a launch is under way.
        let _permit = match self.launch_gate.try_acquire() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(current_count, "Replenishment launch already in progress");
                return ReplenishOutcome::LaunchInProgress;
            }
        };

        let tracked = self.tracker.len().await;
        if tracked >= self.max_outstanding_jobs {
            info!(
                current_count,
                deficit, tracked, "Production job outstanding, not launching another"
            );
            return ReplenishOutcome::AlreadyRunning { tracked };
        }

        if let Err(e) = self.prepare().await {
            warn!(error = %e, "Producer image setup failed");
            record_opt(
                &self.audit,
                AuditEvent::JobSetupFailed {
                    reason: e.to_string(),
                },
            )
            .await;
            return ReplenishOutcome::SetupFailed {
                reason: e.to_string(),
            };
        }

        let reason = match self.launcher.start_job(deficit).await {
            Ok(Some(handle)) => {
                info!(job = %handle, size = deficit, current_count, "Launched production job");
                self.tracker
                    .insert(TrackedJob {
                        handle: handle.clone(),
                        size: Some(deficit),
                        started_at: Utc::now(),
                    })
                    .await;
                metrics::JOBS_STARTED.inc();
                metrics::JOB_SIZE
                    .with_label_values(&[])
                    .observe(deficit as f64);
                record_opt(
                    &self.audit,
                    AuditEvent::JobLaunched {
                        job_id: handle.to_string(),
                        size: deficit,
                        usable_count: current_count,
                    },
                )
                .await;
                return ReplenishOutcome::Launched {
                    handle,
                    size: deficit,
                };
            }
            Ok(None) => "launcher returned no job handle".to_string(),
            Err(e) => e.to_string(),
        };

        warn!(size = deficit, %reason, "Failed to launch production job");
        record_opt(
            &self.audit,
            AuditEvent::JobLaunchFailed {
                size: deficit,
                reason: reason.clone(),
            },
        )
        .await;
        ReplenishOutcome::LaunchFailed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::InventoryConfig;
    use crate::store::{PuzzleStore, SqlitePuzzleStore};
    use crate::testing::MockJobLauncher;

    fn scheduler(launcher: Arc<MockJobLauncher>) -> ReplenishmentScheduler {
        let store: Arc<dyn PuzzleStore> = Arc::new(SqlitePuzzleStore::in_memory().unwrap());
        let inventory = Arc::new(InventoryTracker::new(
            store,
            &InventoryConfig { minimum_entries: 50 },
        ));
        ReplenishmentScheduler::new(launcher, inventory, JobTracker::new(), 1, None)
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "only one outstanding production job is supported")]
    fn test_parallel_jobs_rejected() {
        let store: Arc<dyn PuzzleStore> = Arc::new(SqlitePuzzleStore::in_memory().unwrap());
        let inventory = Arc::new(InventoryTracker::new(
            store,
            &InventoryConfig { minimum_entries: 50 },
        ));
        ReplenishmentScheduler::new(
            Arc::new(MockJobLauncher::new()),
            inventory,
            JobTracker::new(),
            2,
            None,
        );
    }

    #[tokio::test]
    async fn test_no_deficit_is_noop() {
        let launcher = Arc::new(MockJobLauncher::new());
        let scheduler = scheduler(Arc::clone(&launcher));

        assert_eq!(scheduler.maybe_replenish(50).await, ReplenishOutcome::NoDeficit);
        assert_eq!(scheduler.maybe_replenish(70).await, ReplenishOutcome::NoDeficit);
        assert_eq!(launcher.start_count().await, 0);
        assert_eq!(launcher.setup_count().await, 0);
    }

    #[tokio::test]
    async fn test_launch_sized_to_deficit() {
        let launcher = Arc::new(MockJobLauncher::new());
        let scheduler = scheduler(Arc::clone(&launcher));

        let outcome = scheduler.maybe_replenish(10).await;
        match outcome {
            ReplenishOutcome::Launched { size, ref handle } => {
                assert_eq!(size, 40);
                assert!(scheduler.tracker().contains(handle).await);
            }
            other => panic!("expected launch, got {:?}", other),
        }
        assert_eq!(launcher.started_sizes().await, vec![40]);
    }

    #[tokio::test]
    async fn test_outstanding_job_blocks_launch() {
        let launcher = Arc::new(MockJobLauncher::new());
        let scheduler = scheduler(Arc::clone(&launcher));

        scheduler.maybe_replenish(10).await;
        let outcome = scheduler.maybe_replenish(0).await;

        assert_eq!(outcome, ReplenishOutcome::AlreadyRunning { tracked: 1 });
        assert_eq!(launcher.start_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_start_one_job() {
        let launcher = Arc::new(MockJobLauncher::new());
        launcher.set_start_delay_ms(50).await;
        let scheduler = Arc::new(scheduler(Arc::clone(&launcher)));

        let a = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.maybe_replenish(10).await })
        };
        let b = {
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move { scheduler.maybe_replenish(10).await })
        };

        let outcomes = [a.await.unwrap(), b.await.unwrap()];
        let launched = outcomes
            .iter()
            .filter(|o| matches!(o, ReplenishOutcome::Launched { .. }))
            .count();
        assert_eq!(launched, 1);
        assert_eq!(launcher.start_count().await, 1);
    }

    #[tokio::test]
    async fn test_setup_runs_once() {
        let launcher = Arc::new(MockJobLauncher::new());
        let scheduler = scheduler(Arc::clone(&launcher));

        scheduler.prepare().await.unwrap();
        scheduler.maybe_replenish(10).await;

        assert_eq!(launcher.setup_count().await, 1);
    }

    #[tokio::test]
    async fn test_setup_failure_is_retried() {
        let launcher = Arc::new(MockJobLauncher::new());
        launcher.set_fail_setup(true).await;
        let scheduler = scheduler(Arc::clone(&launcher));

        let outcome = scheduler.maybe_replenish(10).await;
        assert!(matches!(outcome, ReplenishOutcome::SetupFailed { .. }));
        assert_eq!(launcher.start_count().await, 0);

        launcher.set_fail_setup(false).await;
        let outcome = scheduler.maybe_replenish(10).await;
        assert!(matches!(outcome, ReplenishOutcome::Launched { .. }));
        assert_eq!(launcher.setup_count().await, 2);
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_tracker_empty() {
        let launcher = Arc::new(MockJobLauncher::new());
        launcher.set_fail_start(true).await;
        let scheduler = scheduler(Arc::clone(&launcher));

        let outcome = scheduler.maybe_replenish(10).await;
        assert!(matches!(outcome, ReplenishOutcome::LaunchFailed { .. }));
        assert!(scheduler.tracker().is_empty().await);
    }

    #[tokio::test]
    async fn test_missing_handle_is_launch_failure() {
        let launcher = Arc::new(MockJobLauncher::new());
        launcher.set_return_no_handle(true).await;
        let scheduler = scheduler(Arc::clone(&launcher));

        let outcome = scheduler.maybe_replenish(10).await;
        assert!(matches!(outcome, ReplenishOutcome::LaunchFailed { .. }));
        assert!(scheduler.tracker().is_empty().await);
    }

    #[tokio::test]
    async fn test_recover_seeds_tracker() {
        let launcher = Arc::new(MockJobLauncher::new());
        launcher.add_existing_job("depot-producer-old").await;
        let scheduler = scheduler(Arc::clone(&launcher));

        assert_eq!(scheduler.recover().await.unwrap(), 1);
        assert_eq!(scheduler.recover().await.unwrap(), 0);

        let outcome = scheduler.maybe_replenish(0).await;
        assert_eq!(outcome, ReplenishOutcome::AlreadyRunning { tracked: 1 });
        assert_eq!(launcher.start_count().await, 0);
    }
}
