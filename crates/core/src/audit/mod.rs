//! Audit trail.
//!
//! Components record [`AuditEvent`]s through a cloneable [`AuditHandle`]; an
//! [`AuditWriter`] task appends them in batches to an [`AuditStore`]. Records
//! are filed by [`AuditSubject`] so a request's or a job's lifecycle can be
//! read back as a [`RequestTimeline`] or [`JobHistory`].

mod events;
mod handle;
mod sqlite;
mod store;
mod timeline;
mod writer;

pub use events::{AuditEvent, AuditRecord, AuditSubject};
pub(crate) use handle::record_opt;
pub use handle::{AuditEventEnvelope, AuditHandle};
pub use sqlite::SqliteAuditStore;
pub use store::{AuditError, AuditStore};
pub use timeline::{JobHistory, RequestStage, RequestTimeline};
pub use writer::{create_audit_system, AuditWriter};
