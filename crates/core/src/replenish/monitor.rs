//! Job monitor: releases tracking slots of finished production jobs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::audit::{record_opt, AuditEvent, AuditHandle};
use crate::launcher::{JobHandle, JobLauncher, JobStatus, RemoveOutcome, Termination};
use crate::metrics;

use super::tracker::JobTracker;

/// A job released from the tracking set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapedJob {
    pub handle: JobHandle,
    /// `None` when the job vanished or could not be inspected.
    pub termination: Option<Termination>,
    pub exit_code: Option<i64>,
}

impl ReapedJob {
    fn label(&self) -> &'static str {
        self.termination.map(|t| t.as_str()).unwrap_or("missing")
    }
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub checked: usize,
    pub still_running: usize,
    /// Terminal jobs kept because their removal is in progress.
    pub removal_pending: usize,
    pub reaped: Vec<ReapedJob>,
}

/// Polls tracked jobs and drops the ones that are gone.
pub struct JobMonitor {
    launcher: Arc<dyn JobLauncher>,
    tracker: JobTracker,
    audit: Option<AuditHandle>,
}

impl JobMonitor {
    pub fn new(
        launcher: Arc<dyn JobLauncher>,
        tracker: JobTracker,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            launcher,
            tracker,
            audit,
        }
    }

    /// Check every tracked job once. Never fails: each job either stays
    /// tracked for the next pass or is dropped.
    pub async fn reconcile(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for job in self.tracker.snapshot().await {
            report.checked += 1;
            let handle = job.handle;

            let (termination, exit_code) = match self.launcher.inspect(&handle).await {
                Ok(JobStatus::Running) => {
                    debug!(job = %handle, "Production job still running");
                    report.still_running += 1;
                    continue;
                }
                Ok(JobStatus::Missing) => {
                    warn!(job = %handle, "Tracked production job no longer exists");
                    (None, None)
                }
                Err(e) => {
                    warn!(job = %handle, error = %e, "Failed to inspect production job, dropping it");
                    (None, None)
                }
                Ok(JobStatus::Exited {
                    exit_code,
                    oom_killed,
                }) => {
                    let termination = Termination::classify(exit_code, oom_killed);
                    match self.launcher.remove(&handle).await {
                        Ok(RemoveOutcome::InProgress) => {
                            debug!(job = %handle, "Removal in progress, retrying next pass");
                            report.removal_pending += 1;
                            continue;
                        }
                        Ok(RemoveOutcome::Removed) => {}
                        Err(e) => {
                            warn!(
                                job = %handle,
                                error = %e,
                                "Failed to remove production job, leaving cleanup to the launcher"
                            );
                        }
                    }
                    (Some(termination), exit_code)
                }
            };

            self.tracker.remove(&handle).await;
            let reaped = ReapedJob {
                handle,
                termination,
                exit_code,
            };

            match reaped.termination {
                Some(Termination::Completed) => {
                    info!(job = %reaped.handle, "Production job completed")
                }
                Some(Termination::Preempted) => {
                    warn!(job = %reaped.handle, ?exit_code, "Production job was preempted")
                }
                Some(Termination::Failed) => {
                    warn!(job = %reaped.handle, ?exit_code, "Production job failed")
                }
                None => {}
            }

            metrics::JOBS_REAPED
                .with_label_values(&[reaped.label()])
                .inc();
            record_opt(
                &self.audit,
                AuditEvent::JobReaped {
                    job_id: reaped.handle.to_string(),
                    termination: reaped.label().to_string(),
                    exit_code,
                },
            )
            .await;
            report.reaped.push(reaped);
        }

        report
    }
}
