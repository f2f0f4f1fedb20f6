use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{AuditError, AuditEvent, AuditEventEnvelope, AuditRecord, AuditStore, AuditSubject};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        recorded_at TEXT NOT NULL,
        kind TEXT NOT NULL,
        subject_kind TEXT NOT NULL,
        subject_id TEXT,
        puzzle_id INTEGER,
        payload TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_audit_log_subject ON audit_log(subject_kind, subject_id, id);
    CREATE INDEX IF NOT EXISTS idx_audit_log_puzzle ON audit_log(puzzle_id) WHERE puzzle_id IS NOT NULL;
"#;

/// Shares the database file with the puzzle store and its write transactions.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const COLUMNS: &str = "id, recorded_at, subject_kind, subject_id, payload";

/// Audit log in the depot's SQLite database.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

struct RawRow {
    id: i64,
    recorded_at: String,
    subject_kind: String,
    subject_id: Option<String>,
    payload: String,
}

impl RawRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            recorded_at: row.get(1)?,
            subject_kind: row.get(2)?,
            subject_id: row.get(3)?,
            payload: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<AuditRecord, AuditError> {
        let id = self.id;
        let recorded_at = DateTime::parse_from_rfc3339(&self.recorded_at)
            .map_err(|e| AuditError::Corrupt {
                id,
                reason: e.to_string(),
            })?
            .with_timezone(&Utc);
        let subject = AuditSubject::from_columns(&self.subject_kind, self.subject_id).ok_or_else(
            || AuditError::Corrupt {
                id,
                reason: format!("unknown subject kind {:?}", self.subject_kind),
            },
        )?;
        let event: AuditEvent = serde_json::from_str(&self.payload)?;

        Ok(AuditRecord {
            id,
            recorded_at,
            subject,
            event,
        })
    }
}

impl SqliteAuditStore {
    pub fn new(path: &Path) -> Result<Self, AuditError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self, AuditError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, AuditError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, AuditError> {
        self.conn.lock().map_err(|_| AuditError::Poisoned)
    }

    fn collect(
        conn: &Connection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut stmt = conn.prepare(sql)?;
        let records = stmt
            .query_map(params, RawRow::read)?
            .map(|row| row?.into_record())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, batch: &[AuditEventEnvelope]) -> Result<usize, AuditError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO audit_log (recorded_at, kind, subject_kind, subject_id, puzzle_id, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for envelope in batch {
                let subject = envelope.event.subject();
                let (subject_kind, subject_id) = subject.as_columns();
                stmt.execute(params![
                    envelope.timestamp.to_rfc3339(),
                    envelope.event.kind(),
                    subject_kind,
                    subject_id,
                    envelope.event.puzzle_id(),
                    serde_json::to_string(&envelope.event)?,
                ])?;
            }
        }
        tx.commit()?;
        Ok(batch.len())
    }

    fn for_subject(&self, subject: &AuditSubject) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.lock()?;
        let (subject_kind, subject_id) = subject.as_columns();
        Self::collect(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM audit_log
                 WHERE subject_kind = ?1 AND subject_id IS ?2
                 ORDER BY id"
            ),
            params![subject_kind, subject_id],
        )
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        Self::collect(
            &conn,
            &format!("SELECT {COLUMNS} FROM audit_log ORDER BY id DESC LIMIT ?1"),
            params![limit],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(event: AuditEvent) -> AuditEventEnvelope {
        AuditEventEnvelope {
            timestamp: Utc::now(),
            event,
        }
    }

    fn assigned(request_id: &str, puzzle_id: i64) -> AuditEventEnvelope {
        envelope(AuditEvent::PuzzleAssigned {
            request_id: request_id.to_string(),
            puzzle_id,
        })
    }

    fn started() -> AuditEventEnvelope {
        envelope(AuditEvent::ServiceStarted {
            version: "0.1.0".to_string(),
            config_hash: "abc123".to_string(),
        })
    }

    #[test]
    fn test_append_and_read_subject() {
        let store = SqliteAuditStore::in_memory().unwrap();

        let written = store
            .append(&[
                started(),
                assigned("A", 1),
                assigned("B", 2),
                envelope(AuditEvent::ChallengePublished {
                    request_id: "A".to_string(),
                    puzzle_id: 1,
                }),
            ])
            .unwrap();
        assert_eq!(written, 4);

        let records = store
            .for_subject(&AuditSubject::Request("A".to_string()))
            .unwrap();
        let kinds: Vec<_> = records.iter().map(|r| r.event.kind()).collect();
        assert_eq!(kinds, vec!["puzzle_assigned", "challenge_published"]);
        assert!(records[0].id < records[1].id);

        let service = store.for_subject(&AuditSubject::Service).unwrap();
        assert_eq!(service.len(), 1);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let store = SqliteAuditStore::in_memory().unwrap();
        store.append(&[assigned("A", 1)]).unwrap();
        store.append(&[assigned("B", 2)]).unwrap();
        store.append(&[assigned("C", 3)]).unwrap();

        let recent = store.recent(2).unwrap();
        let subjects: Vec<_> = recent.iter().map(|r| r.subject.clone()).collect();
        assert_eq!(
            subjects,
            vec![
                AuditSubject::Request("C".to_string()),
                AuditSubject::Request("B".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_timeline_from_store() {
        let store = SqliteAuditStore::in_memory().unwrap();
        store
            .append(&[
                assigned("A", 5),
                envelope(AuditEvent::PuzzleMarkedCompleted {
                    request_id: "A".to_string(),
                    puzzle_id: 5,
                }),
            ])
            .unwrap();

        let timeline = store.request_timeline("A").unwrap().unwrap();
        assert_eq!(timeline.puzzle_id, Some(5));
        assert_eq!(timeline.records.len(), 2);

        assert!(store.request_timeline("missing").unwrap().is_none());
    }

    #[test]
    fn test_job_history_from_store() {
        let store = SqliteAuditStore::in_memory().unwrap();
        store
            .append(&[
                envelope(AuditEvent::JobLaunched {
                    job_id: "job-1".to_string(),
                    size: 40,
                    usable_count: 10,
                }),
                envelope(AuditEvent::JobLaunchFailed {
                    size: 40,
                    reason: "daemon down".to_string(),
                }),
            ])
            .unwrap();

        let history = store.job_history("job-1").unwrap().unwrap();
        assert_eq!(history.size, Some(40));
        assert_eq!(history.records.len(), 1);
    }

    #[test]
    fn test_corrupt_subject_is_reported() {
        let store = SqliteAuditStore::in_memory().unwrap();
        store.append(&[assigned("A", 1)]).unwrap();
        store
            .lock()
            .unwrap()
            .execute("UPDATE audit_log SET subject_id = NULL", [])
            .unwrap();

        let err = store.recent(10).unwrap_err();
        assert!(matches!(err, AuditError::Corrupt { .. }));
    }

    #[test]
    fn test_file_based_store_persists() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("audit.db");

        SqliteAuditStore::new(&db_path)
            .unwrap()
            .append(&[started()])
            .unwrap();

        let reopened = SqliteAuditStore::new(&db_path).unwrap();
        assert_eq!(reopened.recent(10).unwrap().len(), 1);
    }
}
