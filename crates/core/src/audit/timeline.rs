//! Lifecycle views folded from a subject's audit records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AuditEvent, AuditRecord};

/// Furthest lifecycle point a request has reached, in lifecycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Assigned,
    ChallengePublished,
    OutputPublished,
    /// Gone from the open lists, waiting out retention.
    MarkedCompleted,
    Deleted,
}

/// Everything the depot did for one request, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestTimeline {
    pub request_id: String,
    /// Puzzle bound to the request, if assignment was recorded.
    pub puzzle_id: Option<i64>,
    pub stage: Option<RequestStage>,
    pub publication_failures: u32,
    /// How often a pending deletion was cancelled by the request reappearing.
    pub revivals: u32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub records: Vec<AuditRecord>,
}

impl RequestTimeline {
    /// Fold `records` (ascending id). `None` if there are none.
    pub fn fold(request_id: &str, records: Vec<AuditRecord>) -> Option<Self> {
        let first_seen = records.first()?.recorded_at;
        let last_seen = records.last()?.recorded_at;

        let mut puzzle_id = None;
        let mut stage = None;
        let mut before_mark = None;
        let mut publication_failures = 0;
        let mut revivals = 0;

        for record in &records {
            if let Some(id) = record.event.puzzle_id() {
                puzzle_id = Some(id);
            }
            match &record.event {
                AuditEvent::PuzzleAssigned { .. } => stage = Some(RequestStage::Assigned),
                AuditEvent::ChallengePublished { .. } => {
                    stage = stage.max(Some(RequestStage::ChallengePublished))
                }
                AuditEvent::OutputPublished { .. } => {
                    stage = stage.max(Some(RequestStage::OutputPublished))
                }
                AuditEvent::PublicationFailed { .. } => publication_failures += 1,
                AuditEvent::PuzzleMarkedCompleted { .. } => {
                    before_mark = stage;
                    stage = Some(RequestStage::MarkedCompleted);
                }
                AuditEvent::PuzzleRevived { .. } => {
                    revivals += 1;
                    stage = before_mark.take();
                }
                AuditEvent::PuzzleDeleted { .. } => stage = Some(RequestStage::Deleted),
                _ => {}
            }
        }

        Some(Self {
            request_id: request_id.to_string(),
            puzzle_id,
            stage,
            publication_failures,
            revivals,
            first_seen,
            last_seen,
            records,
        })
    }
}

/// Launch and release of one production job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistory {
    pub job_id: String,
    /// Puzzles the job was asked to produce.
    pub size: Option<u64>,
    /// Usable inventory when the job was launched.
    pub usable_at_launch: Option<u64>,
    pub launched_at: Option<DateTime<Utc>>,
    pub reaped_at: Option<DateTime<Utc>>,
    pub termination: Option<String>,
    pub exit_code: Option<i64>,
    /// Seconds from launch to release, once both are recorded.
    pub tracked_secs: Option<i64>,
    pub records: Vec<AuditRecord>,
}

impl JobHistory {
    pub fn fold(job_id: &str, records: Vec<AuditRecord>) -> Option<Self> {
        if records.is_empty() {
            return None;
        }

        let mut history = Self {
            job_id: job_id.to_string(),
            size: None,
            usable_at_launch: None,
            launched_at: None,
            reaped_at: None,
            termination: None,
            exit_code: None,
            tracked_secs: None,
            records: Vec::new(),
        };

        for record in &records {
            match &record.event {
                AuditEvent::JobLaunched {
                    size, usable_count, ..
                } => {
                    history.size = Some(*size);
                    history.usable_at_launch = Some(*usable_count);
                    history.launched_at = Some(record.recorded_at);
                }
                AuditEvent::JobReaped {
                    termination,
                    exit_code,
                    ..
                } => {
                    history.termination = Some(termination.clone());
                    history.exit_code = *exit_code;
                    history.reaped_at = Some(record.recorded_at);
                }
                _ => {}
            }
        }

        if let (Some(launched), Some(reaped)) = (history.launched_at, history.reaped_at) {
            history.tracked_secs = Some((reaped - launched).num_seconds());
        }
        history.records = records;
        Some(history)
    }
}
