//! Depot driver implementation.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assignment::AssignmentEngine;
use crate::audit::AuditHandle;
use crate::fulfillment::FulfillmentPipeline;
use crate::inventory::{InventoryConfig, InventoryTracker};
use crate::launcher::JobLauncher;
use crate::reaper::{ReclaimReport, RetentionReaper};
use crate::replenish::{JobMonitor, JobTracker, ReconcileReport, ReplenishmentScheduler};
use crate::request_source::RequestSource;
use crate::single_flight::OperationGate;
use crate::store::PuzzleStore;

use super::config::DriverConfig;
use super::types::{DriverError, DriverStatus, TickReport};

const TICK: &str = "tick";
const MONITOR: &str = "monitor";
const REAPER: &str = "reaper";

/// Components shared by the loops.
struct DriverInner {
    provider_id: String,
    retention: Duration,
    inventory: Arc<InventoryTracker>,
    scheduler: ReplenishmentScheduler,
    monitor: JobMonitor,
    assignment: AssignmentEngine,
    fulfillment: FulfillmentPipeline,
    reaper: RetentionReaper,
    source: Arc<dyn RequestSource>,
    gate: OperationGate,
}

/// The depot driver - runs the tick, monitor and reaper loops.
pub struct Driver {
    config: DriverConfig,
    inner: Arc<DriverInner>,

    // Runtime state
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Driver {
    /// Create a new driver. Nothing runs until [`Driver::start`] or one of
    /// the `run_*` methods is called.
    pub fn new(
        config: DriverConfig,
        provider_id: impl Into<String>,
        inventory_config: &InventoryConfig,
        store: Arc<dyn PuzzleStore>,
        launcher: Arc<dyn JobLauncher>,
        source: Arc<dyn RequestSource>,
        audit: Option<AuditHandle>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let inventory = Arc::new(InventoryTracker::new(Arc::clone(&store), inventory_config));
        let tracker = JobTracker::new();
        let scheduler = ReplenishmentScheduler::new(
            Arc::clone(&launcher),
            Arc::clone(&inventory),
            tracker.clone(),
            config.max_outstanding_jobs,
            audit.clone(),
        );
        let monitor = JobMonitor::new(launcher, tracker, audit.clone());
        let assignment = AssignmentEngine::new(Arc::clone(&store), audit.clone());
        let fulfillment = FulfillmentPipeline::new(
            Arc::clone(&store),
            Arc::clone(&source),
            config.max_outstanding_fulfillments,
            audit.clone(),
        );
        let reaper = RetentionReaper::new(store, audit);

        let inner = DriverInner {
            provider_id: provider_id.into(),
            retention: config.retention(),
            inventory,
            scheduler,
            monitor,
            assignment,
            fulfillment,
            reaper,
            source,
            gate: OperationGate::new(),
        };

        Self {
            config,
            inner: Arc::new(inner),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start the driver (spawns background tasks).
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Driver already running");
            return;
        }

        info!(provider = %self.inner.provider_id, "Starting depot driver");

        if self.config.recover_jobs_on_start {
            match self.inner.scheduler.recover().await {
                Ok(0) => debug!("No production jobs to recover"),
                Ok(recovered) => info!(recovered, "Recovered production jobs"),
                Err(e) => warn!(error = %e, "Failed to recover production jobs"),
            }
        }

        // Image warm-up runs beside the loops; a launch that needs the image
        // first joins the same attempt.
        {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                if let Err(e) = inner.scheduler.prepare().await {
                    warn!(error = %e, "Producer image setup failed, retrying on next launch");
                }
            });
        }

        let tick = {
            let inner = Arc::clone(&self.inner);
            self.spawn_loop("Tick", self.config.poll_interval_ms, move || {
                let inner = Arc::clone(&inner);
                async move {
                    match inner.tick().await {
                        Ok(report) => debug!(
                            usable_count = report.usable_count,
                            replenish = report.replenish.label(),
                            open_challenge = report.open_challenge,
                            open_output = report.open_output,
                            "Tick complete"
                        ),
                        Err(DriverError::Busy(_)) => debug!("Previous tick still running"),
                        Err(e) => warn!(error = %e, "Tick failed"),
                    }
                }
            })
        };

        let monitor = {
            let inner = Arc::clone(&self.inner);
            self.spawn_loop("Monitor", self.config.monitor_interval_ms, move || {
                let inner = Arc::clone(&inner);
                async move {
                    if let Err(e) = inner.reconcile().await {
                        debug!(error = %e, "Skipping monitor pass");
                    }
                }
            })
        };

        let reaper = {
            let inner = Arc::clone(&self.inner);
            self.spawn_loop("Reaper", self.config.reaper_interval_ms, move || {
                let inner = Arc::clone(&inner);
                async move {
                    if let Err(e) = inner.reclaim().await {
                        warn!(error = %e, "Reclamation pass skipped");
                    }
                }
            })
        };

        self.tasks.lock().await.extend([tick, monitor, reaper]);

        info!("Depot driver started");
    }

    /// Stop the driver, waiting for every loop to finish its current pass.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Driver not running");
            return;
        }

        info!("Stopping depot driver");

        // Signal shutdown to all loops
        let _ = self.shutdown_tx.send(());

        let tasks = std::mem::take(&mut *self.tasks.lock().await);
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Driver loop ended abnormally");
            }
        }

        info!("Depot driver stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current driver status.
    pub async fn status(&self) -> DriverStatus {
        let usable_count = match self.inner.inventory.usable_count() {
            Ok(count) => Some(count),
            Err(e) => {
                warn!(error = %e, "Failed to count usable puzzles");
                None
            }
        };

        DriverStatus {
            running: self.is_running(),
            usable_count,
            minimum_entries: self.inner.inventory.minimum_entries(),
            tracked_jobs: self.inner.scheduler.tracker().snapshot().await,
        }
    }

    /// Run one main tick now.
    pub async fn run_tick(&self) -> Result<TickReport, DriverError> {
        self.inner.tick().await
    }

    /// Run one job monitor pass now.
    pub async fn run_monitor(&self) -> Result<ReconcileReport, DriverError> {
        self.inner.reconcile().await
    }

    /// Run one reclamation pass now.
    pub async fn run_reaper(&self) -> Result<ReclaimReport, DriverError> {
        self.inner.reclaim().await
    }

    fn spawn_loop<F, Fut>(&self, name: &'static str, interval_ms: u64, mut body: F) -> JoinHandle<()>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        tokio::spawn(async move {
            info!("{} loop started", name);
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("{} loop received shutdown signal", name);
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(interval_ms)) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        body().await;
                    }
                }
            }
            info!("{} loop stopped", name);
        })
    }
}

impl DriverInner {
    async fn tick(&self) -> Result<TickReport, DriverError> {
        let _ticket = self.gate.try_enter(TICK).ok_or(DriverError::Busy(TICK))?;

        let usable_count = self.inventory.usable_count()?;
        let replenish = self.scheduler.maybe_replenish(usable_count).await;

        let supply_reported = match self
            .source
            .report_available_supply(&self.provider_id, usable_count)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, usable_count, "Failed to report available supply");
                false
            }
        };

        let open = self.source.list_open_requests(&self.provider_id).await?;

        // Only the challenge phase binds; output requests were bound earlier.
        let assignment = match self.assignment.assign(&open.challenge_request_ids).await {
            Ok(assignment) => Some(assignment),
            Err(e) => {
                warn!(error = %e, "Assignment failed, publishing for already bound requests");
                None
            }
        };

        let fulfillment = self.fulfillment.run(&open).await;

        Ok(TickReport {
            usable_count,
            replenish,
            supply_reported,
            open_challenge: open.challenge_request_ids.len(),
            open_output: open.output_request_ids.len(),
            assignment,
            fulfillment,
        })
    }

    async fn reconcile(&self) -> Result<ReconcileReport, DriverError> {
        let _ticket = self.gate.try_enter(MONITOR).ok_or(DriverError::Busy(MONITOR))?;
        Ok(self.monitor.reconcile().await)
    }

    async fn reclaim(&self) -> Result<ReclaimReport, DriverError> {
        let _ticket = self.gate.try_enter(REAPER).ok_or(DriverError::Busy(REAPER))?;

        // Reclaiming against a partial view would mark live requests.
        let open = self.source.list_open_requests(&self.provider_id).await?;

        let report = self
            .reaper
            .reclaim(
                &open.challenge_request_ids,
                &open.output_request_ids,
                self.retention,
            )
            .await?;
        Ok(report)
    }
}
