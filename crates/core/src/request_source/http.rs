//! HTTP/JSON request source client.
//!
//! Endpoints, relative to the configured base URL:
//! - `GET  /providers/{provider}/requests` → [`OpenRequests`]
//! - `POST /requests/{id}/challenge` with [`ChallengePayload`]
//! - `POST /requests/{id}/proof` with [`OutputPayload`]
//! - `PUT  /providers/{provider}/supply` with [`SupplyReport`]

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::metrics;

use super::types::{
    ChallengePayload, OpenRequests, OutputPayload, RequestSource, RequestSourceError,
    SupplyReport,
};

/// Request source client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSourceConfig {
    /// Base URL of the request source API.
    #[serde(default)]
    pub url: String,

    /// Bearer token sent with every call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Per-call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    30
}

impl Default for RequestSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_token: None,
            timeout_secs: default_timeout(),
        }
    }
}

/// Request source over HTTP.
pub struct HttpRequestSource {
    client: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpRequestSource {
    /// Create a new client.
    pub fn new(config: RequestSourceConfig) -> Result<Self, RequestSourceError> {
        if config.url.is_empty() {
            return Err(RequestSourceError::NotConfigured(
                "request source url is required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        })
    }

    fn requests_url(&self, provider_id: &str) -> String {
        format!(
            "{}/providers/{}/requests",
            self.base_url,
            urlencoding::encode(provider_id)
        )
    }

    fn supply_url(&self, provider_id: &str) -> String {
        format!(
            "{}/providers/{}/supply",
            self.base_url,
            urlencoding::encode(provider_id)
        )
    }

    fn request_url(&self, request_id: &str, action: &str) -> String {
        format!(
            "{}/requests/{}/{}",
            self.base_url,
            urlencoding::encode(request_id),
            action
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send `request`, recording metrics under `operation`, and fail on non-2xx.
    async fn send(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Response, RequestSourceError> {
        let started = Instant::now();
        let result = self.authorize(request).send().await;
        metrics::REQUEST_SOURCE_DURATION
            .with_label_values(&[operation])
            .observe(started.elapsed().as_secs_f64());

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                metrics::REQUEST_SOURCE_REQUESTS
                    .with_label_values(&[operation, "error"])
                    .inc();
                return Err(e.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            metrics::REQUEST_SOURCE_REQUESTS
                .with_label_values(&[operation, "error"])
                .inc();
            let body = response.text().await.unwrap_or_default();
            return Err(RequestSourceError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        metrics::REQUEST_SOURCE_REQUESTS
            .with_label_values(&[operation, "success"])
            .inc();
        Ok(response)
    }
}

#[async_trait]
impl RequestSource for HttpRequestSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn list_open_requests(
        &self,
        provider_id: &str,
    ) -> Result<OpenRequests, RequestSourceError> {
        let url = self.requests_url(provider_id);
        debug!("Listing open requests: {}", url);

        let response = self.send("list_open_requests", self.client.get(&url)).await?;
        response.json().await.map_err(|e| {
            RequestSourceError::Parse(format!("Failed to parse open requests: {}", e))
        })
    }

    async fn publish_challenge(
        &self,
        request_id: &str,
        payload: &ChallengePayload,
    ) -> Result<(), RequestSourceError> {
        let url = self.request_url(request_id, "challenge");
        debug!("Publishing challenge for {}: puzzle {}", request_id, payload.puzzle_id);

        self.send("publish_challenge", self.client.post(&url).json(payload))
            .await?;
        Ok(())
    }

    async fn publish_output(
        &self,
        request_id: &str,
        payload: &OutputPayload,
    ) -> Result<(), RequestSourceError> {
        let url = self.request_url(request_id, "proof");
        debug!("Publishing output for {}: puzzle {}", request_id, payload.puzzle_id);

        self.send("publish_output", self.client.post(&url).json(payload))
            .await?;
        Ok(())
    }

    async fn report_available_supply(
        &self,
        provider_id: &str,
        count: u64,
    ) -> Result<(), RequestSourceError> {
        let url = self.supply_url(provider_id);

        self.send(
            "report_available_supply",
            self.client
                .put(&url)
                .json(&SupplyReport { available: count }),
        )
        .await?;
        Ok(())
    }
}
