//! Inventory tracking.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::store::{PuzzleStore, StoreError};

/// Inventory configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryConfig {
    /// Unassigned puzzles to keep on hand.
    #[serde(default = "default_minimum_entries")]
    pub minimum_entries: u64,
}

fn default_minimum_entries() -> u64 {
    50
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            minimum_entries: default_minimum_entries(),
        }
    }
}

/// Counts unassigned puzzles and computes the replenishment deficit.
pub struct InventoryTracker {
    store: Arc<dyn PuzzleStore>,
    minimum_entries: u64,
}

impl InventoryTracker {
    pub fn new(store: Arc<dyn PuzzleStore>, config: &InventoryConfig) -> Self {
        Self {
            store,
            minimum_entries: config.minimum_entries,
        }
    }

    /// Count puzzles with no bound request.
    pub fn usable_count(&self) -> Result<u64, StoreError> {
        let count = self.store.usable_count()?;
        metrics::USABLE_PUZZLES.set(count as i64);
        Ok(count)
    }

    /// Puzzles missing to reach the minimum, saturating at zero.
    pub fn deficit(&self, current_count: u64) -> u64 {
        self.minimum_entries.saturating_sub(current_count)
    }

    pub fn minimum_entries(&self) -> u64 {
        self.minimum_entries
    }
}
