//! Retention reaper: two-phase reclamation of puzzles whose request has left
//! the open set.
//!
//! A bound puzzle whose request is no longer active is first marked with
//! `completed_at`; it is deleted, key material first, only once the mark is
//! older than the retention window. A marked puzzle whose request shows up as
//! active again has its mark cleared.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audit::{record_opt, AuditEvent, AuditHandle};
use crate::metrics;
use crate::store::{Puzzle, PuzzleStore, StoreError};

/// A puzzle touched by a reclamation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimedPuzzle {
    pub request_id: String,
    pub puzzle_id: i64,
    pub keymaterial_id: i64,
}

impl ReclaimedPuzzle {
    fn from_puzzle(puzzle: &Puzzle, request_id: &str) -> Self {
        Self {
            request_id: request_id.to_string(),
            puzzle_id: puzzle.id,
            keymaterial_id: puzzle.keymaterial_id,
        }
    }
}

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimReport {
    /// Newly marked with `completed_at`.
    pub marked_completed: Vec<ReclaimedPuzzle>,
    /// Deleted together with their key material.
    pub deleted: Vec<ReclaimedPuzzle>,
    /// Marks cleared because the request is active again.
    pub revived: Vec<ReclaimedPuzzle>,
    /// Marked puzzles still inside the retention window.
    pub retained: usize,
}

impl ReclaimReport {
    pub fn is_noop(&self) -> bool {
        self.marked_completed.is_empty() && self.deleted.is_empty() && self.revived.is_empty()
    }
}

/// Runs reclamation passes against the store.
pub struct RetentionReaper {
    store: Arc<dyn PuzzleStore>,
    audit: Option<AuditHandle>,
}

impl RetentionReaper {
    pub fn new(store: Arc<dyn PuzzleStore>, audit: Option<AuditHandle>) -> Self {
        Self { store, audit }
    }

    /// Reclaim against the current time.
    ///
    /// The active sets must come from a successful fetch of open requests.
    pub async fn reclaim(
        &self,
        active_challenge: &[String],
        active_output: &[String],
        retention: Duration,
    ) -> Result<ReclaimReport, StoreError> {
        self.reclaim_at(active_challenge, active_output, retention, Utc::now())
            .await
    }

    /// Reclaim as if the current time were `now`.
    ///
    /// The whole pass is one transaction: on any error nothing is marked,
    /// cleared or deleted.
    pub async fn reclaim_at(
        &self,
        active_challenge: &[String],
        active_output: &[String],
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<ReclaimReport, StoreError> {
        let active: HashSet<String> = active_challenge
            .iter()
            .chain(active_output.iter())
            .cloned()
            .collect();

        let store = Arc::clone(&self.store);
        let report = tokio::task::spawn_blocking(move || {
            reclaim_pass(store.as_ref(), &active, retention, now)
        })
        .await
        .map_err(|e| StoreError::Aborted(format!("reclamation task failed: {}", e)))??;

        metrics::RECLAIMED
            .with_label_values(&["marked"])
            .inc_by(report.marked_completed.len() as u64);
        metrics::RECLAIMED
            .with_label_values(&["revived"])
            .inc_by(report.revived.len() as u64);
        metrics::RECLAIMED
            .with_label_values(&["deleted"])
            .inc_by(report.deleted.len() as u64);

        if report.is_noop() {
            debug!(retained = report.retained, "Reclamation pass found nothing to do");
        } else {
            info!(
                marked = report.marked_completed.len(),
                deleted = report.deleted.len(),
                revived = report.revived.len(),
                retained = report.retained,
                "Reclamation pass complete"
            );
        }

        for p in &report.marked_completed {
            record_opt(
                &self.audit,
                AuditEvent::PuzzleMarkedCompleted {
                    request_id: p.request_id.clone(),
                    puzzle_id: p.puzzle_id,
                },
            )
            .await;
        }
        for p in &report.revived {
            record_opt(
                &self.audit,
                AuditEvent::PuzzleRevived {
                    request_id: p.request_id.clone(),
                    puzzle_id: p.puzzle_id,
                },
            )
            .await;
        }
        for p in &report.deleted {
            record_opt(
                &self.audit,
                AuditEvent::PuzzleDeleted {
                    request_id: p.request_id.clone(),
                    puzzle_id: p.puzzle_id,
                    keymaterial_id: p.keymaterial_id,
                },
            )
            .await;
        }

        Ok(report)
    }
}

fn reclaim_pass(
    store: &dyn PuzzleStore,
    active: &HashSet<String>,
    retention: Duration,
    now: DateTime<Utc>,
) -> Result<ReclaimReport, StoreError> {
    // Marks at or after the cutoff are still retained.
    let cutoff = chrono::Duration::from_std(retention)
        .ok()
        .and_then(|d| now.checked_sub_signed(d));

    let mut report = ReclaimReport::default();

    store.transaction(&mut |tx| {
        let mut pass = ReclaimReport::default();

        for puzzle in tx.lock_assigned()? {
            let Some(request_id) = puzzle.request_id.as_deref() else {
                continue;
            };

            if active.contains(request_id) {
                if puzzle.completed_at.is_some() {
                    tx.set_completed_at(puzzle.id, None)?;
                    pass.revived.push(ReclaimedPuzzle::from_puzzle(&puzzle, request_id));
                }
                continue;
            }

            match puzzle.completed_at {
                None => {
                    tx.set_completed_at(puzzle.id, Some(now))?;
                    pass.marked_completed
                        .push(ReclaimedPuzzle::from_puzzle(&puzzle, request_id));
                }
                Some(marked) if cutoff.is_some_and(|cutoff| marked < cutoff) => {
                    tx.delete_puzzle(&puzzle)?;
                    pass.deleted.push(ReclaimedPuzzle::from_puzzle(&puzzle, request_id));
                }
                Some(_) => pass.retained += 1,
            }
        }

        report = pass;
        Ok(())
    })?;

    Ok(report)
}
