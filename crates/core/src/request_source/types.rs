//! Types for the request source module.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Requests currently open for a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenRequests {
    /// Requests waiting for a challenge.
    #[serde(default)]
    pub challenge_request_ids: Vec<String>,
    /// Requests waiting for an output and proof.
    #[serde(default)]
    pub output_request_ids: Vec<String>,
}

impl OpenRequests {
    pub fn is_empty(&self) -> bool {
        self.challenge_request_ids.is_empty() && self.output_request_ids.is_empty()
    }

    /// Whether `request_id` is open in either phase.
    pub fn contains(&self, request_id: &str) -> bool {
        self.challenge_request_ids.iter().any(|id| id == request_id)
            || self.output_request_ids.iter().any(|id| id == request_id)
    }

    /// Every open request id in either phase, challenge ids first, without duplicates.
    pub fn all_request_ids(&self) -> Vec<String> {
        let mut seen: HashSet<&String> = HashSet::new();
        self.challenge_request_ids
            .iter()
            .chain(self.output_request_ids.iter())
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect()
    }
}

/// Challenge-phase publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengePayload {
    pub puzzle_id: i64,
    pub modulus: String,
    pub input: String,
}

/// Factorization proving the output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub p: String,
    pub q: String,
}

/// Output-phase publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPayload {
    pub puzzle_id: i64,
    pub output: String,
    pub proof: Proof,
}

/// Body of a supply report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyReport {
    pub available: u64,
}

/// Errors from the request source.
#[derive(Debug, Error)]
pub enum RequestSourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request source returned an error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Client not configured (missing URL, etc.).
    #[error("Client not configured: {0}")]
    NotConfigured(String),

    /// Error raised by a test double.
    #[error("{0}")]
    Other(String),
}

/// Remote service listing open requests and accepting publications.
#[async_trait]
pub trait RequestSource: Send + Sync {
    /// Returns the name of this request source implementation.
    fn name(&self) -> &str;

    async fn list_open_requests(&self, provider_id: &str)
        -> Result<OpenRequests, RequestSourceError>;

    async fn publish_challenge(
        &self,
        request_id: &str,
        payload: &ChallengePayload,
    ) -> Result<(), RequestSourceError>;

    async fn publish_output(
        &self,
        request_id: &str,
        payload: &OutputPayload,
    ) -> Result<(), RequestSourceError>;

    async fn report_available_supply(
        &self,
        provider_id: &str,
        count: u64,
    ) -> Result<(), RequestSourceError>;
}
