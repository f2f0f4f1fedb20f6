//! SQLite-backed puzzle store implementation.
//!
//! SQLite has no row locks, so every transaction is opened with
//! `BEGIN IMMEDIATE`: the database write lock is taken before the first read,
//! and overlapping transactions (in this process or another one sharing the
//! file) run one after the other. A `lock_*` read therefore only ever sees
//! committed rows that no other transaction can touch until commit, which
//! gives the same disjoint-partition outcome as `FOR UPDATE SKIP LOCKED`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params, TransactionBehavior};

use super::{
    ChallengeRecord, NewPuzzle, OutputRecord, Puzzle, PuzzleStore, PuzzleTx, StoreError, TxWork,
};

/// How long a connection waits for the write lock before failing.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PUZZLE_COLUMNS: &str = "id, x, y, t, modulus, request_id, keymaterial_id, completed_at";

/// SQLite-backed puzzle store.
pub struct SqlitePuzzleStore {
    conn: Mutex<Connection>,
}

impl SqlitePuzzleStore {
    /// Open (or create) the puzzle database at `path`.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        Self::with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open the puzzle database with a custom busy timeout.
    pub fn with_busy_timeout(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS keymaterial (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                p TEXT NOT NULL,
                q TEXT NOT NULL,
                modulus TEXT NOT NULL UNIQUE,
                phi TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS puzzles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                x TEXT NOT NULL,
                y TEXT NOT NULL,
                t INTEGER NOT NULL,
                modulus TEXT NOT NULL,
                request_id TEXT UNIQUE,
                keymaterial_id INTEGER NOT NULL UNIQUE
                    REFERENCES keymaterial(id) ON DELETE CASCADE,
                completed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_puzzles_completed_at ON puzzles(completed_at);
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    /// Drop a key material row while its puzzle stays, leaving the puzzle
    /// without a counterpart.
    #[cfg(test)]
    pub(crate) fn orphan_puzzle(&self, keymaterial_id: i64) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = OFF;").unwrap();
        conn.execute(
            "DELETE FROM keymaterial WHERE id = ?1",
            params![keymaterial_id],
        )
        .unwrap();
    }
}

fn row_to_puzzle(row: &rusqlite::Row) -> rusqlite::Result<Puzzle> {
    let completed_at: Option<String> = row.get(7)?;
    let completed_at = completed_at
        .map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))
        })
        .transpose()?;

    Ok(Puzzle {
        id: row.get(0)?,
        x: row.get(1)?,
        y: row.get(2)?,
        t: row.get::<_, i64>(3)? as u64,
        modulus: row.get(4)?,
        request_id: row.get(5)?,
        keymaterial_id: row.get(6)?,
        completed_at,
    })
}

fn query_puzzles<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<Puzzle>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, row_to_puzzle)?;
    let puzzles = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(puzzles)
}

/// Transaction handle handed to [`TxWork`] closures.
struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl PuzzleTx for SqliteTx<'_> {
    fn lock_bound(&mut self, request_ids: &[String]) -> Result<Vec<Puzzle>, StoreError> {
        if request_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; request_ids.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM puzzles WHERE request_id IN ({}) ORDER BY id ASC",
            PUZZLE_COLUMNS, placeholders
        );
        query_puzzles(self.conn, &sql, params_from_iter(request_ids.iter()))
    }

    fn lock_unassigned(&mut self, limit: usize) -> Result<Vec<Puzzle>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM puzzles WHERE request_id IS NULL ORDER BY id ASC LIMIT ?",
            PUZZLE_COLUMNS
        );
        query_puzzles(self.conn, &sql, params![limit as i64])
    }

    fn bind(&mut self, puzzle_id: i64, request_id: &str) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE puzzles SET request_id = ?1 WHERE id = ?2 AND request_id IS NULL",
            params![request_id, puzzle_id],
        )?;
        if changed != 1 {
            return Err(StoreError::Integrity(format!(
                "puzzle {} is not available for request {}",
                puzzle_id, request_id
            )));
        }
        Ok(())
    }

    fn lock_assigned(&mut self) -> Result<Vec<Puzzle>, StoreError> {
        let sql = format!(
            "SELECT {} FROM puzzles WHERE request_id IS NOT NULL ORDER BY id ASC",
            PUZZLE_COLUMNS
        );
        query_puzzles(self.conn, &sql, [])
    }

    fn set_completed_at(
        &mut self,
        puzzle_id: i64,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE puzzles SET completed_at = ?1 WHERE id = ?2",
            params![completed_at.map(|at| at.to_rfc3339()), puzzle_id],
        )?;
        Ok(())
    }

    fn delete_puzzle(&mut self, puzzle: &Puzzle) -> Result<(), StoreError> {
        self.conn.execute(
            "DELETE FROM keymaterial WHERE id = ?1",
            params![puzzle.keymaterial_id],
        )?;
        self.conn
            .execute("DELETE FROM puzzles WHERE id = ?1", params![puzzle.id])?;
        Ok(())
    }
}

impl PuzzleStore for SqlitePuzzleStore {
    fn usable_count(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM puzzles WHERE request_id IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn transaction(&self, work: &mut TxWork<'_>) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut handle = SqliteTx { conn: &tx };
            work(&mut handle)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn challenge_for(&self, request_id: &str) -> Result<Option<ChallengeRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT id, modulus, x FROM puzzles WHERE request_id = ?1",
                params![request_id],
                |row| {
                    Ok(ChallengeRecord {
                        puzzle_id: row.get(0)?,
                        modulus: row.get(1)?,
                        input: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn output_for(&self, request_id: &str) -> Result<Option<OutputRecord>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT pz.id, pz.y, km.p, km.q FROM puzzles pz \
                 LEFT JOIN keymaterial km ON km.id = pz.keymaterial_id \
                 WHERE pz.request_id = ?1",
                params![request_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((puzzle_id, output, Some(p), Some(q))) => Ok(Some(OutputRecord {
                puzzle_id,
                output,
                p,
                q,
            })),
            Some((puzzle_id, ..)) => Err(StoreError::Integrity(format!(
                "puzzle {} has no key material",
                puzzle_id
            ))),
        }
    }

    fn insert_puzzle(&self, puzzle: NewPuzzle) -> Result<Puzzle, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO keymaterial (p, q, modulus, phi) VALUES (?1, ?2, ?3, ?4)",
            params![puzzle.p, puzzle.q, puzzle.modulus, puzzle.phi],
        )?;
        let keymaterial_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO puzzles (x, y, t, modulus, keymaterial_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                puzzle.x,
                puzzle.y,
                puzzle.t as i64,
                puzzle.modulus,
                keymaterial_id
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Puzzle {
            id,
            x: puzzle.x,
            y: puzzle.y,
            t: puzzle.t,
            modulus: puzzle.modulus,
            request_id: None,
            keymaterial_id,
            completed_at: None,
        })
    }

    fn get(&self, puzzle_id: i64) -> Result<Option<Puzzle>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM puzzles WHERE id = ?1", PUZZLE_COLUMNS);
        let puzzle = conn
            .query_row(&sql, params![puzzle_id], row_to_puzzle)
            .optional()?;
        Ok(puzzle)
    }

    fn find_by_request(&self, request_id: &str) -> Result<Option<Puzzle>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {} FROM puzzles WHERE request_id = ?1", PUZZLE_COLUMNS);
        let puzzle = conn
            .query_row(&sql, params![request_id], row_to_puzzle)
            .optional()?;
        Ok(puzzle)
    }

    fn key_material_exists(&self, keymaterial_id: i64) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM keymaterial WHERE id = ?1",
            params![keymaterial_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
