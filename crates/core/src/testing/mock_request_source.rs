//! Mock request source for testing.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::request_source::{
    ChallengePayload, OpenRequests, OutputPayload, RequestSource, RequestSourceError,
};

/// Mock implementation of the RequestSource trait.
///
/// Provides controllable behavior for testing:
/// - Set the open request lists returned by list_open_requests
/// - Record publications and supply reports for assertions
/// - Simulate listing and per-request publication failures
/// - Measure publication concurrency
#[derive(Debug, Default)]
pub struct MockRequestSource {
    open: Arc<RwLock<OpenRequests>>,
    challenges: Arc<RwLock<Vec<(String, ChallengePayload)>>>,
    outputs: Arc<RwLock<Vec<(String, OutputPayload)>>>,
    supply_reports: Arc<RwLock<Vec<(String, u64)>>>,
    fail_list: Arc<RwLock<bool>>,
    failing_requests: Arc<RwLock<HashSet<String>>>,
    publish_delay_ms: Arc<RwLock<u64>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockRequestSource {
    /// Create a new mock request source with no open requests.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the open request lists.
    pub async fn set_open(&self, challenge: &[&str], output: &[&str]) {
        *self.open.write().await = OpenRequests {
            challenge_request_ids: challenge.iter().map(|s| s.to_string()).collect(),
            output_request_ids: output.iter().map(|s| s.to_string()).collect(),
        };
    }

    /// Make list_open_requests fail.
    pub async fn set_fail_list(&self, fail: bool) {
        *self.fail_list.write().await = fail;
    }

    /// Make every publication for `request_id` fail.
    pub async fn fail_request(&self, request_id: &str) {
        self.failing_requests
            .write()
            .await
            .insert(request_id.to_string());
    }

    /// Delay every publication.
    pub async fn set_publish_delay_ms(&self, delay_ms: u64) {
        *self.publish_delay_ms.write().await = delay_ms;
    }

    /// Recorded challenge publications.
    pub async fn challenges(&self) -> Vec<(String, ChallengePayload)> {
        self.challenges.read().await.clone()
    }

    /// Recorded output publications.
    pub async fn outputs(&self) -> Vec<(String, OutputPayload)> {
        self.outputs.read().await.clone()
    }

    /// Recorded supply reports as `(provider_id, count)`.
    pub async fn supply_reports(&self) -> Vec<(String, u64)> {
        self.supply_reports.read().await.clone()
    }

    /// Highest number of publications observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn begin_publish(&self, request_id: &str) -> Result<(), RequestSourceError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.publish_delay_ms.read().await;
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let failing = self.failing_requests.read().await.contains(request_id);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if failing {
            return Err(RequestSourceError::Api {
                status: 500,
                message: format!("mock failure for {}", request_id),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestSource for MockRequestSource {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_open_requests(
        &self,
        _provider_id: &str,
    ) -> Result<OpenRequests, RequestSourceError> {
        if *self.fail_list.read().await {
            return Err(RequestSourceError::Other("mock list failure".to_string()));
        }
        Ok(self.open.read().await.clone())
    }

    async fn publish_challenge(
        &self,
        request_id: &str,
        payload: &ChallengePayload,
    ) -> Result<(), RequestSourceError> {
        self.begin_publish(request_id).await?;
        self.challenges
            .write()
            .await
            .push((request_id.to_string(), payload.clone()));
        Ok(())
    }

    async fn publish_output(
        &self,
        request_id: &str,
        payload: &OutputPayload,
    ) -> Result<(), RequestSourceError> {
        self.begin_publish(request_id).await?;
        self.outputs
            .write()
            .await
            .push((request_id.to_string(), payload.clone()));
        Ok(())
    }

    async fn report_available_supply(
        &self,
        provider_id: &str,
        count: u64,
    ) -> Result<(), RequestSourceError> {
        self.supply_reports
            .write()
            .await
            .push((provider_id.to_string(), count));
        Ok(())
    }
}
