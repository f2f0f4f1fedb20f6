//! Persistent entities for the puzzle inventory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One precomputed time-lock puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Puzzle {
    pub id: i64,
    /// Puzzle input (decimal).
    pub x: String,
    /// Puzzle output (decimal).
    pub y: String,
    /// Number of sequential squarings.
    pub t: u64,
    /// Modulus the puzzle was built under (decimal).
    pub modulus: String,
    /// Request this puzzle is bound to. `None` means unassigned.
    pub request_id: Option<String>,
    /// Owning reference to the key material row.
    pub keymaterial_id: i64,
    /// Set when the bound request was first seen inactive.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Puzzle {
    /// Whether the puzzle is bound to a request.
    pub fn is_assigned(&self) -> bool {
        self.request_id.is_some()
    }

    /// Whether the puzzle has been marked for deletion.
    pub fn is_pending_deletion(&self) -> bool {
        self.completed_at.is_some()
    }
}

/// A puzzle and its key material as emitted by a producer job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPuzzle {
    pub x: String,
    pub y: String,
    pub t: u64,
    pub p: String,
    pub q: String,
    pub modulus: String,
    pub phi: String,
}

/// Fields published during the challenge phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeRecord {
    pub puzzle_id: i64,
    pub modulus: String,
    pub input: String,
}

/// Fields published during the output phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub puzzle_id: i64,
    pub output: String,
    pub p: String,
    pub q: String,
}
