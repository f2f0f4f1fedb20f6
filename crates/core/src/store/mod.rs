//! Durable puzzle inventory.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqlitePuzzleStore;
pub use store::{PuzzleStore, PuzzleTx, StoreError, TxWork};
pub use types::{ChallengeRecord, NewPuzzle, OutputRecord, Puzzle};
