//! Puzzle storage traits and errors.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::{ChallengeRecord, NewPuzzle, OutputRecord, Puzzle};

/// Error type for puzzle storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure (connection loss, busy timeout, constraint).
    #[error("Database error: {0}")]
    Database(String),

    /// A row that must exist alongside another one is missing.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Caller-initiated abort of a transaction.
    #[error("Transaction aborted: {0}")]
    Aborted(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Row-level operations available inside a storage transaction.
///
/// The `lock_*` reads take exclusive ownership of the returned rows for the
/// rest of the transaction and never return rows owned by a concurrent
/// transaction.
pub trait PuzzleTx {
    /// Lock puzzles already bound to any of `request_ids`, ordered by id.
    fn lock_bound(&mut self, request_ids: &[String]) -> Result<Vec<Puzzle>, StoreError>;

    /// Lock up to `limit` unassigned puzzles, ordered by ascending id.
    fn lock_unassigned(&mut self, limit: usize) -> Result<Vec<Puzzle>, StoreError>;

    /// Bind an unassigned puzzle to a request.
    fn bind(&mut self, puzzle_id: i64, request_id: &str) -> Result<(), StoreError>;

    /// Lock every assigned puzzle.
    fn lock_assigned(&mut self) -> Result<Vec<Puzzle>, StoreError>;

    /// Set or clear the completion marker.
    fn set_completed_at(
        &mut self,
        puzzle_id: i64,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;

    /// Delete a puzzle's key material, then the puzzle itself.
    fn delete_puzzle(&mut self, puzzle: &Puzzle) -> Result<(), StoreError>;
}

/// Unit of work run inside [`PuzzleStore::transaction`].
pub type TxWork<'a> = dyn FnMut(&mut dyn PuzzleTx) -> Result<(), StoreError> + 'a;

/// Trait for puzzle storage backends.
pub trait PuzzleStore: Send + Sync {
    /// Count puzzles with no bound request (committed state only).
    fn usable_count(&self) -> Result<u64, StoreError>;

    /// Run `work` in a single atomic transaction.
    ///
    /// Commits when `work` returns `Ok`; any error rolls back every change
    /// made inside the closure.
    fn transaction(&self, work: &mut TxWork<'_>) -> Result<(), StoreError>;

    /// Challenge-phase fields for the puzzle bound to `request_id`.
    fn challenge_for(&self, request_id: &str) -> Result<Option<ChallengeRecord>, StoreError>;

    /// Output-phase fields for the puzzle bound to `request_id`.
    ///
    /// Returns [`StoreError::Integrity`] when the puzzle exists but its key
    /// material does not.
    fn output_for(&self, request_id: &str) -> Result<Option<OutputRecord>, StoreError>;

    /// Insert a puzzle together with its key material.
    fn insert_puzzle(&self, puzzle: NewPuzzle) -> Result<Puzzle, StoreError>;

    /// Get a puzzle by id.
    fn get(&self, puzzle_id: i64) -> Result<Option<Puzzle>, StoreError>;

    /// Get the puzzle bound to a request.
    fn find_by_request(&self, request_id: &str) -> Result<Option<Puzzle>, StoreError>;

    /// Whether key material with the given id still exists.
    fn key_material_exists(&self, keymaterial_id: i64) -> Result<bool, StoreError>;
}
