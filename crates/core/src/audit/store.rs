use thiserror::Error;

use super::{AuditEventEnvelope, AuditRecord, AuditSubject, JobHistory, RequestTimeline};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("audit payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("corrupt audit row {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("audit connection poisoned")]
    Poisoned,
}

/// Append-only event log keyed by subject.
pub trait AuditStore: Send + Sync {
    /// Store a batch atomically, returning how many rows were written.
    fn append(&self, batch: &[AuditEventEnvelope]) -> Result<usize, AuditError>;

    /// Every record filed under `subject`, oldest first.
    fn for_subject(&self, subject: &AuditSubject) -> Result<Vec<AuditRecord>, AuditError>;

    /// The `limit` newest records across all subjects, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>, AuditError>;

    fn request_timeline(&self, request_id: &str) -> Result<Option<RequestTimeline>, AuditError> {
        let records = self.for_subject(&AuditSubject::Request(request_id.to_string()))?;
        Ok(RequestTimeline::fold(request_id, records))
    }

    fn job_history(&self, job_id: &str) -> Result<Option<JobHistory>, AuditError> {
        let records = self.for_subject(&AuditSubject::Job(job_id.to_string()))?;
        Ok(JobHistory::fold(job_id, records))
    }
}
