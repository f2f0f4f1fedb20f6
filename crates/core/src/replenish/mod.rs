//! Inventory replenishment.
//!
//! - `ReplenishmentScheduler`: launches one production job sized to the
//!   deficit when inventory is low, never more than one outstanding.
//! - `JobMonitor`: polls tracked jobs and releases their slots once they end.
//!
//! Both share one `JobTracker`, handed to them at construction.

mod monitor;
mod scheduler;
mod tracker;

pub use monitor::{JobMonitor, ReapedJob, ReconcileReport};
pub use scheduler::{ReplenishOutcome, ReplenishmentScheduler};
pub use tracker::{JobTracker, TrackedJob};
