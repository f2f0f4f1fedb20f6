//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Inventory and replenishment (usable puzzles, job launches, reaped jobs)
//! - Assignment and fulfillment (bindings, publications)
//! - Reclamation (marked, revived and deleted puzzles)
//! - Request source calls

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Inventory & Replenishment
// =============================================================================

/// Unassigned puzzles at the last inventory check.
pub static USABLE_PUZZLES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "depot_usable_puzzles",
        "Unassigned puzzles at the last inventory check",
    )
    .unwrap()
});

/// Replenishment decisions by outcome.
pub static REPLENISH_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_replenish_decisions_total",
            "Replenishment decisions by outcome",
        ),
        &["outcome"], // "no_deficit", "already_running", "launched", ...
    )
    .unwrap()
});

/// Production jobs started.
pub static JOBS_STARTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("depot_jobs_started_total", "Total production jobs started").unwrap()
});

/// Puzzles requested from production jobs.
pub static JOB_SIZE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new("depot_job_size", "Puzzles requested per production job")
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0]),
        &[],
    )
    .unwrap()
});

/// Production jobs released from tracking, by termination.
pub static JOBS_REAPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_jobs_reaped_total",
            "Production jobs released from tracking",
        ),
        &["termination"], // "completed", "preempted", "failed", "missing"
    )
    .unwrap()
});

/// Production jobs currently tracked.
pub static JOBS_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("depot_jobs_tracked", "Production jobs currently tracked").unwrap()
});

// =============================================================================
// Assignment & Fulfillment
// =============================================================================

/// Puzzles bound to requests.
pub static ASSIGNMENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "depot_assignments_total",
        "Total puzzles bound to requests",
    )
    .unwrap()
});

/// Requests left unmapped for lack of inventory.
pub static UNMAPPED_REQUESTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "depot_unmapped_requests_total",
        "Requests left unmapped for lack of inventory",
    )
    .unwrap()
});

/// Publications by phase and result.
pub static PUBLICATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("depot_publications_total", "Publications to the request source"),
        &["phase", "result"], // phase: "challenge"/"output"; result: "published", "failed", "skipped", "deferred"
    )
    .unwrap()
});

// =============================================================================
// Reclamation
// =============================================================================

/// Reclaim actions by kind.
pub static RECLAIMED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("depot_reclaimed_total", "Reclamation actions on puzzles"),
        &["action"], // "marked", "revived", "deleted"
    )
    .unwrap()
});

// =============================================================================
// External Services
// =============================================================================

/// Request source call duration.
pub static REQUEST_SOURCE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "depot_request_source_duration_seconds",
            "Duration of request source calls",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["operation"],
    )
    .unwrap()
});

/// Request source calls by operation and status.
pub static REQUEST_SOURCE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "depot_request_source_requests_total",
            "Total request source calls",
        ),
        &["operation", "status"], // status: "success", "error"
    )
    .unwrap()
});

/// Returns all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Inventory & replenishment
        Box::new(USABLE_PUZZLES.clone()),
        Box::new(REPLENISH_DECISIONS.clone()),
        Box::new(JOBS_STARTED.clone()),
        Box::new(JOB_SIZE.clone()),
        Box::new(JOBS_REAPED.clone()),
        Box::new(JOBS_TRACKED.clone()),
        // Assignment & fulfillment
        Box::new(ASSIGNMENTS.clone()),
        Box::new(UNMAPPED_REQUESTS.clone()),
        Box::new(PUBLICATIONS.clone()),
        // Reclamation
        Box::new(RECLAIMED.clone()),
        // External services
        Box::new(REQUEST_SOURCE_DURATION.clone()),
        Box::new(REQUEST_SOURCE_REQUESTS.clone()),
    ]
}
