//! Common test utilities for API testing with mocks.
//!
//! This module provides a test fixture that creates an in-process router
//! with mock collaborators injected, so the driver endpoints can be
//! exercised without docker or a live request source.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use depot_core::{
    create_audit_system, load_config_from_str, AuditHandle, AuditStore, Driver,
    JobLauncher, PuzzleStore, RequestSource, SqliteAuditStore, SqlitePuzzleStore,
    testing::{MockJobLauncher, MockRequestSource},
};

/// Re-export fixtures for test convenience
pub use depot_core::testing::fixtures;

/// Test fixture for API testing with mock collaborators.
///
/// Provides an in-process router with fully controllable mocks for:
/// - Production jobs (MockJobLauncher)
/// - The request source (MockRequestSource)
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// Puzzle store shared with the driver
    pub store: Arc<SqlitePuzzleStore>,
    /// Audit store the API reads from
    pub audit_store: Arc<SqliteAuditStore>,
    /// Mock launcher - control production jobs
    pub launcher: Arc<MockJobLauncher>,
    /// Mock request source - configure open requests, inspect publications
    pub source: Arc<MockRequestSource>,
    /// Handle shared with the driver
    pub audit: AuditHandle,
    /// Temporary directory for the test database
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture keeping `minimum_entries` puzzles on hand.
    pub async fn new(minimum_entries: u64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");

        let config = load_config_from_str(&format!(
            r#"
[provider]
id = "provider-1"

[database]
path = "{}"

[inventory]
minimum_entries = {}

[driver]
enabled = false
retention_secs = 0

[request_source]
url = "http://127.0.0.1:9"
api_token = "hidden-token"
"#,
            db_path.display(),
            minimum_entries
        ))
        .expect("Failed to parse test config");

        // Create stores
        let store =
            Arc::new(SqlitePuzzleStore::new(&db_path).expect("Failed to create puzzle store"));
        let audit_store =
            Arc::new(SqliteAuditStore::new(&db_path).expect("Failed to create audit store"));

        // Create mocks
        let launcher = Arc::new(MockJobLauncher::new());
        let source = Arc::new(MockRequestSource::new());

        // Create audit system
        let (audit, audit_writer) =
            create_audit_system(Arc::clone(&audit_store) as Arc<dyn AuditStore>, 100);
        tokio::spawn(audit_writer.run());

        let driver = Arc::new(Driver::new(
            config.driver.clone(),
            config.provider.id.clone(),
            &config.inventory,
            Arc::clone(&store) as Arc<dyn PuzzleStore>,
            Arc::clone(&launcher) as Arc<dyn JobLauncher>,
            Arc::clone(&source) as Arc<dyn RequestSource>,
            Some(audit.clone()),
        ));

        let state = Arc::new(depot_server::state::AppState::new(
            config,
            Arc::clone(&audit_store) as Arc<dyn AuditStore>,
            driver,
        ));

        let router = depot_server::api::create_router(state);

        Self {
            router,
            store,
            audit_store,
            launcher,
            source,
            audit,
            temp_dir,
        }
    }

    /// Simulate a producer job inserting puzzles with the given seeds.
    pub fn produce(&self, seeds: std::ops::RangeInclusive<u32>) {
        for seed in seeds {
            self.store
                .insert_puzzle(fixtures::new_puzzle(seed))
                .expect("Failed to insert puzzle");
        }
    }

    /// Wait until the audit writer has stored at least `count` events.
    pub async fn wait_for_audit_events(&self, count: usize) {
        for _ in 0..100 {
            let stored = self.audit_store.recent(count).map(|r| r.len()).unwrap_or(0);
            if stored >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("audit writer did not store {} events", count);
    }

    /// Send a GET request to the test router.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path).await
    }

    /// Send a POST request without a body.
    pub async fn post(&self, path: &str) -> TestResponse {
        self.request("POST", path).await
    }

    /// Send a GET request and return the raw body as text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, String::from_utf8_lossy(&body_bytes).into_owned())
    }

    /// Send a request to the test router.
    async fn request(&self, method: &str, path: &str) -> TestResponse {
        let request = Request::builder()
            .method(method)
            .uri(path)
            .body(Body::empty())
            .unwrap();

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}
