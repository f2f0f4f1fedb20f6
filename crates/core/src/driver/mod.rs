//! Depot driver: fixed-interval loops wiring the components together.
//!
//! - **Tick**: inventory check, replenishment, supply report, open-request
//!   fetch, assignment, fulfillment - in that order.
//! - **Monitor**: reconciles tracked production jobs.
//! - **Reaper**: reclaims puzzles whose requests have left the open set.
//!
//! Each loop family runs at most once at a time; an overlapping call is
//! rejected, not queued.

mod config;
mod runner;
mod types;

pub use config::DriverConfig;
pub use runner::Driver;
pub use types::{DriverError, DriverStatus, TickReport};
