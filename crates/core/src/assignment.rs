//! Assignment engine: binds unassigned puzzles to open requests.
//!
//! One storage transaction per call:
//! 1. lock puzzles already bound to any requested id (reported, not mutated),
//! 2. lock up to one unassigned puzzle per remaining request, lowest id first,
//! 3. pair them in request order and bind.
//!
//! A request holds at most one puzzle and a puzzle serves at most one request,
//! however many callers overlap. Requests beyond the available inventory stay
//! unmapped until a later call.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::audit::{record_opt, AuditEvent, AuditHandle};
use crate::metrics;
use crate::store::{PuzzleStore, StoreError};

/// A request bound to a puzzle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub request_id: String,
    pub puzzle_id: i64,
}

/// Outcome of one `assign` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Requests bound in an earlier call, untouched by this one.
    pub already_bound: Vec<Binding>,
    /// Requests bound by this call.
    pub newly_bound: Vec<Binding>,
    /// Requests left without a puzzle, in input order.
    pub unmapped: Vec<String>,
}

impl Assignment {
    /// Every bound request mapped to its puzzle.
    pub fn mapping(&self) -> BTreeMap<String, i64> {
        self.already_bound
            .iter()
            .chain(self.newly_bound.iter())
            .map(|b| (b.request_id.clone(), b.puzzle_id))
            .collect()
    }

    pub fn puzzle_for(&self, request_id: &str) -> Option<i64> {
        self.already_bound
            .iter()
            .chain(self.newly_bound.iter())
            .find(|b| b.request_id == request_id)
            .map(|b| b.puzzle_id)
    }
}

/// Binds puzzles to request ids.
pub struct AssignmentEngine {
    store: Arc<dyn PuzzleStore>,
    audit: Option<AuditHandle>,
}

impl AssignmentEngine {
    pub fn new(store: Arc<dyn PuzzleStore>, audit: Option<AuditHandle>) -> Self {
        Self { store, audit }
    }

    /// Bind every unbound request in `request_ids` to an unassigned puzzle,
    /// as far as inventory allows.
    ///
    /// Duplicate ids are collapsed; the first occurrence fixes the order.
    /// Any storage failure rolls the whole call back.
    pub async fn assign(&self, request_ids: &[String]) -> Result<Assignment, StoreError> {
        let requested = dedup(request_ids);
        if requested.is_empty() {
            return Ok(Assignment::default());
        }

        let store = Arc::clone(&self.store);
        let assignment = tokio::task::spawn_blocking(move || bind_requests(store.as_ref(), &requested))
            .await
            .map_err(|e| StoreError::Aborted(format!("assignment task failed: {}", e)))??;

        metrics::ASSIGNMENTS.inc_by(assignment.newly_bound.len() as u64);
        metrics::UNMAPPED_REQUESTS.inc_by(assignment.unmapped.len() as u64);

        if !assignment.newly_bound.is_empty() || !assignment.unmapped.is_empty() {
            info!(
                already_bound = assignment.already_bound.len(),
                newly_bound = assignment.newly_bound.len(),
                unmapped = assignment.unmapped.len(),
                "Assignment pass complete"
            );
        } else {
            debug!(
                already_bound = assignment.already_bound.len(),
                "All requests already bound"
            );
        }

        for binding in &assignment.newly_bound {
            record_opt(
                &self.audit,
                AuditEvent::PuzzleAssigned {
                    request_id: binding.request_id.clone(),
                    puzzle_id: binding.puzzle_id,
                },
            )
            .await;
        }

        Ok(assignment)
    }
}

fn dedup(request_ids: &[String]) -> Vec<String> {
    let mut seen: HashSet<&String> = HashSet::new();
    request_ids
        .iter()
        .filter(|id| seen.insert(*id))
        .cloned()
        .collect()
}

fn bind_requests(store: &dyn PuzzleStore, requested: &[String]) -> Result<Assignment, StoreError> {
    let mut assignment = Assignment::default();

    store.transaction(&mut |tx| {
        let bound: HashMap<String, i64> = tx
            .lock_bound(requested)?
            .into_iter()
            .filter_map(|puzzle| puzzle.request_id.map(|request_id| (request_id, puzzle.id)))
            .collect();

        let mut already_bound = Vec::new();
        let mut unmapped = Vec::new();
        for request_id in requested {
            match bound.get(request_id) {
                Some(&puzzle_id) => already_bound.push(Binding {
                    request_id: request_id.clone(),
                    puzzle_id,
                }),
                None => unmapped.push(request_id.clone()),
            }
        }

        let candidates = tx.lock_unassigned(unmapped.len())?;
        let paired = candidates.len().min(unmapped.len());

        let mut newly_bound = Vec::with_capacity(paired);
        for (request_id, puzzle) in unmapped.drain(..paired).zip(candidates) {
            tx.bind(puzzle.id, &request_id)?;
            newly_bound.push(Binding {
                request_id,
                puzzle_id: puzzle.id,
            });
        }

        assignment = Assignment {
            already_bound,
            newly_bound,
            unmapped,
        };
        Ok(())
    })?;

    Ok(assignment)
}
