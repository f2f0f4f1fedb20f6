use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Replenishment
    JobLaunched {
        job_id: String,
        size: u64,
        usable_count: u64,
    },
    JobLaunchFailed {
        size: u64,
        reason: String,
    },
    /// One-time image setup failed; the next tick retries it.
    JobSetupFailed {
        reason: String,
    },
    /// A tracked job was released from the tracking set.
    JobReaped {
        job_id: String,
        /// "completed", "preempted", "failed" or "missing".
        termination: String,
        exit_code: Option<i64>,
    },

    // Assignment
    PuzzleAssigned {
        request_id: String,
        puzzle_id: i64,
    },

    // Fulfillment
    ChallengePublished {
        request_id: String,
        puzzle_id: i64,
    },
    OutputPublished {
        request_id: String,
        puzzle_id: i64,
    },
    PublicationFailed {
        request_id: String,
        phase: String,
        error: String,
    },

    // Reclamation
    PuzzleMarkedCompleted {
        request_id: String,
        puzzle_id: i64,
    },
    /// A marked puzzle's request became active again.
    PuzzleRevived {
        request_id: String,
        puzzle_id: i64,
    },
    PuzzleDeleted {
        request_id: String,
        puzzle_id: i64,
        keymaterial_id: i64,
    },
}

impl AuditEvent {
    /// Stable snake_case name, matching the serde tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ServiceStarted { .. } => "service_started",
            Self::ServiceStopped { .. } => "service_stopped",
            Self::JobLaunched { .. } => "job_launched",
            Self::JobLaunchFailed { .. } => "job_launch_failed",
            Self::JobSetupFailed { .. } => "job_setup_failed",
            Self::JobReaped { .. } => "job_reaped",
            Self::PuzzleAssigned { .. } => "puzzle_assigned",
            Self::ChallengePublished { .. } => "challenge_published",
            Self::OutputPublished { .. } => "output_published",
            Self::PublicationFailed { .. } => "publication_failed",
            Self::PuzzleMarkedCompleted { .. } => "puzzle_marked_completed",
            Self::PuzzleRevived { .. } => "puzzle_revived",
            Self::PuzzleDeleted { .. } => "puzzle_deleted",
        }
    }

    /// What the event is about.
    ///
    /// Launch and setup failures never produced a job, so they belong to
    /// the service together with start and stop.
    pub fn subject(&self) -> AuditSubject {
        match self {
            Self::PuzzleAssigned { request_id, .. }
            | Self::ChallengePublished { request_id, .. }
            | Self::OutputPublished { request_id, .. }
            | Self::PublicationFailed { request_id, .. }
            | Self::PuzzleMarkedCompleted { request_id, .. }
            | Self::PuzzleRevived { request_id, .. }
            | Self::PuzzleDeleted { request_id, .. } => AuditSubject::Request(request_id.clone()),
            Self::JobLaunched { job_id, .. } | Self::JobReaped { job_id, .. } => {
                AuditSubject::Job(job_id.clone())
            }
            Self::ServiceStarted { .. }
            | Self::ServiceStopped { .. }
            | Self::JobLaunchFailed { .. }
            | Self::JobSetupFailed { .. } => AuditSubject::Service,
        }
    }

    pub fn puzzle_id(&self) -> Option<i64> {
        match self {
            Self::PuzzleAssigned { puzzle_id, .. }
            | Self::ChallengePublished { puzzle_id, .. }
            | Self::OutputPublished { puzzle_id, .. }
            | Self::PuzzleMarkedCompleted { puzzle_id, .. }
            | Self::PuzzleRevived { puzzle_id, .. }
            | Self::PuzzleDeleted { puzzle_id, .. } => Some(*puzzle_id),
            _ => None,
        }
    }
}

/// The entity an audit event is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum AuditSubject {
    Service,
    Request(String),
    Job(String),
}

impl AuditSubject {
    /// Storage columns `(subject_kind, subject_id)`.
    pub fn as_columns(&self) -> (&'static str, Option<&str>) {
        match self {
            Self::Service => ("service", None),
            Self::Request(id) => ("request", Some(id)),
            Self::Job(id) => ("job", Some(id)),
        }
    }

    pub fn from_columns(kind: &str, id: Option<String>) -> Option<Self> {
        match (kind, id) {
            ("service", None) => Some(Self::Service),
            ("request", Some(id)) => Some(Self::Request(id)),
            ("job", Some(id)) => Some(Self::Job(id)),
            _ => None,
        }
    }
}

/// A stored event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub recorded_at: DateTime<Utc>,
    pub subject: AuditSubject,
    pub event: AuditEvent,
}
