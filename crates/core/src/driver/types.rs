//! Types for the depot driver.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assignment::Assignment;
use crate::fulfillment::FulfillmentReport;
use crate::replenish::{ReplenishOutcome, TrackedJob};
use crate::request_source::RequestSourceError;
use crate::store::StoreError;

/// Errors that can end a single driver operation.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The same operation family is already running.
    #[error("operation already in progress: {0}")]
    Busy(&'static str),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("request source error: {0}")]
    RequestSource(#[from] RequestSourceError),
}

/// What one main tick did.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub usable_count: u64,
    pub replenish: ReplenishOutcome,
    /// Whether the supply report reached the request source.
    pub supply_reported: bool,
    pub open_challenge: usize,
    pub open_output: usize,
    /// `None` when assignment failed; fulfillment still runs for requests
    /// bound earlier.
    pub assignment: Option<Assignment>,
    pub fulfillment: FulfillmentReport,
}

/// Current status of the driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriverStatus {
    /// Whether the background loops are running.
    pub running: bool,
    /// Unassigned puzzles, `None` if the store could not be read.
    pub usable_count: Option<u64>,
    pub minimum_entries: u64,
    /// Production jobs currently tracked.
    pub tracked_jobs: Vec<TrackedJob>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_status_default() {
        let status = DriverStatus::default();
        assert!(!status.running);
        assert!(status.usable_count.is_none());
        assert!(status.tracked_jobs.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = DriverError::Busy("tick");
        assert_eq!(err.to_string(), "operation already in progress: tick");

        let err = DriverError::from(StoreError::Database("locked".to_string()));
        assert_eq!(err.to_string(), "store error: Database error: locked");
    }
}
