//! Fulfillment pipeline: publishes challenges and outputs for bound requests.
//!
//! Both phases read what they publish from storage and never write to it. A
//! failed or skipped request is retried simply by appearing in the next
//! poll's open set.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, SemaphorePermit};
use tracing::{debug, error, info, warn};

use crate::audit::{record_opt, AuditEvent, AuditHandle};
use crate::metrics;
use crate::request_source::{
    ChallengePayload, OpenRequests, OutputPayload, Proof, RequestSource,
};
use crate::store::{PuzzleStore, StoreError};

/// Fulfillment phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Publish `(puzzle_id, modulus, input)`.
    Challenge,
    /// Publish `(puzzle_id, output, proof)`.
    Output,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Challenge => "challenge",
            Phase::Output => "output",
        }
    }
}

/// Per-phase outcome of one run, by request id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    pub published: Vec<String>,
    pub failed: Vec<String>,
    /// Unbound requests, or bound ones whose data is incomplete.
    pub skipped: Vec<String>,
    /// Left for the next run because the outstanding limit was reached.
    pub deferred: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentReport {
    pub challenge: PhaseReport,
    pub output: PhaseReport,
}

impl FulfillmentReport {
    fn phase_mut(&mut self, phase: Phase) -> &mut PhaseReport {
        match phase {
            Phase::Challenge => &mut self.challenge,
            Phase::Output => &mut self.output,
        }
    }
}

enum Outcome {
    Published,
    Skipped,
    Failed,
}

/// Drives both fulfillment phases against the request source.
pub struct FulfillmentPipeline {
    store: Arc<dyn PuzzleStore>,
    source: Arc<dyn RequestSource>,
    permits: Semaphore,
    audit: Option<AuditHandle>,
}

impl FulfillmentPipeline {
    pub fn new(
        store: Arc<dyn PuzzleStore>,
        source: Arc<dyn RequestSource>,
        max_outstanding: usize,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            store,
            source,
            permits: Semaphore::new(max_outstanding.max(1)),
            audit,
        }
    }

    /// Publish for every open request, at most `max_outstanding` at a time.
    ///
    /// Requests that find no free slot are deferred, not queued. Slots are
    /// handed out alternating between phases so neither starves the other.
    pub async fn run(&self, open: &OpenRequests) -> FulfillmentReport {
        let mut report = FulfillmentReport::default();
        let mut work = Vec::new();

        for (phase, request_id) in interleave(
            dedup(&open.challenge_request_ids),
            dedup(&open.output_request_ids),
        ) {
            match self.permits.try_acquire() {
                Ok(permit) => work.push(self.fulfill(phase, request_id, permit)),
                Err(_) => {
                    metrics::PUBLICATIONS
                        .with_label_values(&[phase.as_str(), "deferred"])
                        .inc();
                    report.phase_mut(phase).deferred.push(request_id);
                }
            }
        }

        for (phase, request_id, outcome) in join_all(work).await {
            let phase_report = report.phase_mut(phase);
            match outcome {
                Outcome::Published => phase_report.published.push(request_id),
                Outcome::Skipped => phase_report.skipped.push(request_id),
                Outcome::Failed => phase_report.failed.push(request_id),
            }
        }

        let deferred = report.challenge.deferred.len() + report.output.deferred.len();
        if deferred > 0 {
            info!(deferred, "Outstanding fulfillment limit reached, deferring to next tick");
        }

        report
    }

    async fn fulfill(
        &self,
        phase: Phase,
        request_id: String,
        _permit: SemaphorePermit<'_>,
    ) -> (Phase, String, Outcome) {
        let outcome = match phase {
            Phase::Challenge => self.publish_challenge(&request_id).await,
            Phase::Output => self.publish_output(&request_id).await,
        };
        let label = match outcome {
            Outcome::Published => "published",
            Outcome::Skipped => "skipped",
            Outcome::Failed => "failed",
        };
        metrics::PUBLICATIONS
            .with_label_values(&[phase.as_str(), label])
            .inc();
        (phase, request_id, outcome)
    }

    async fn publish_challenge(&self, request_id: &str) -> Outcome {
        let record = match self.store.challenge_for(request_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(request_id, "Request not bound yet, awaiting assignment");
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!(request_id, error = %e, "Failed to read challenge");
                return Outcome::Failed;
            }
        };

        let payload = ChallengePayload {
            puzzle_id: record.puzzle_id,
            modulus: record.modulus,
            input: record.input,
        };
        match self.source.publish_challenge(request_id, &payload).await {
            Ok(()) => {
                info!(request_id, puzzle_id = payload.puzzle_id, "Published challenge");
                record_opt(
                    &self.audit,
                    AuditEvent::ChallengePublished {
                        request_id: request_id.to_string(),
                        puzzle_id: payload.puzzle_id,
                    },
                )
                .await;
                Outcome::Published
            }
            Err(e) => {
                self.publication_failed(Phase::Challenge, request_id, &e.to_string())
                    .await;
                Outcome::Failed
            }
        }
    }

    async fn publish_output(&self, request_id: &str) -> Outcome {
        let record = match self.store.output_for(request_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                debug!(request_id, "No puzzle bound for output request");
                return Outcome::Skipped;
            }
            Err(StoreError::Integrity(reason)) => {
                error!(request_id, %reason, "Data integrity violation, skipping request");
                return Outcome::Skipped;
            }
            Err(e) => {
                warn!(request_id, error = %e, "Failed to read output");
                return Outcome::Failed;
            }
        };

        let payload = OutputPayload {
            puzzle_id: record.puzzle_id,
            output: record.output,
            proof: Proof {
                p: record.p,
                q: record.q,
            },
        };
        match self.source.publish_output(request_id, &payload).await {
            Ok(()) => {
                info!(request_id, puzzle_id = payload.puzzle_id, "Published output");
                record_opt(
                    &self.audit,
                    AuditEvent::OutputPublished {
                        request_id: request_id.to_string(),
                        puzzle_id: payload.puzzle_id,
                    },
                )
                .await;
                Outcome::Published
            }
            Err(e) => {
                self.publication_failed(Phase::Output, request_id, &e.to_string())
                    .await;
                Outcome::Failed
            }
        }
    }

    async fn publication_failed(&self, phase: Phase, request_id: &str, error: &str) {
        warn!(request_id, phase = phase.as_str(), error, "Publication failed, will retry on next poll");
        record_opt(
            &self.audit,
            AuditEvent::PublicationFailed {
                request_id: request_id.to_string(),
                phase: phase.as_str().to_string(),
                error: error.to_string(),
            },
        )
        .await;
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

fn interleave(challenge: Vec<String>, output: Vec<String>) -> Vec<(Phase, String)> {
    let mut merged = Vec::with_capacity(challenge.len() + output.len());
    let mut challenge = challenge.into_iter();
    let mut output = output.into_iter();
    loop {
        let c = challenge.next();
        let o = output.next();
        if c.is_none() && o.is_none() {
            break;
        }
        merged.extend(c.map(|id| (Phase::Challenge, id)));
        merged.extend(o.map(|id| (Phase::Output, id)));
    }
    merged
}
