//! API tests driving the depot through the router with mock collaborators.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use common::TestFixture;

#[tokio::test]
async fn test_health() {
    let fixture = TestFixture::new(1).await;

    let response = fixture.get("/api/v1/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "ok");
}

#[tokio::test]
async fn test_config_hides_api_token() {
    let fixture = TestFixture::new(1).await;

    let (status, body) = fixture.get_text("/api/v1/config").await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body.contains("hidden-token"));
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["provider"]["id"], "provider-1");
    assert_eq!(json["request_source"]["api_token_configured"], true);
}

#[tokio::test]
async fn test_status_counts_usable_puzzles() {
    let fixture = TestFixture::new(5).await;
    fixture.produce(1..=3);

    let response = fixture.get("/api/v1/status").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["running"], false);
    assert_eq!(response.body["usable_count"], 3);
    assert_eq!(response.body["minimum_entries"], 5);
    assert_eq!(response.body["tracked_jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_tick_binds_and_publishes_challenge() {
    let fixture = TestFixture::new(1).await;
    fixture.produce(1..=2);
    fixture.source.set_open(&["A"], &[]).await;

    let response = fixture.post("/api/v1/driver/tick").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["usable_count"], 2);
    assert_eq!(response.body["replenish"]["outcome"], "no_deficit");
    assert_eq!(response.body["open_challenge"], 1);
    assert_eq!(
        response.body["assignment"]["newly_bound"]
            .as_array()
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        response.body["fulfillment"]["challenge"]["published"],
        serde_json::json!(["A"])
    );

    let challenges = fixture.source.challenges().await;
    assert_eq!(challenges.len(), 1);
    assert_eq!(challenges[0].0, "A");

    let reports = fixture.source.supply_reports().await;
    assert_eq!(reports, vec![("provider-1".to_string(), 2)]);
}

#[tokio::test]
async fn test_tick_launches_job_below_minimum() {
    let fixture = TestFixture::new(10).await;
    fixture.produce(1..=4);

    let response = fixture.post("/api/v1/driver/tick").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["replenish"]["outcome"], "launched");
    assert_eq!(response.body["replenish"]["size"], 6);
    assert_eq!(fixture.launcher.started_sizes().await, vec![6]);

    let status = fixture.get("/api/v1/status").await;
    assert_eq!(status.body["tracked_jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_tick_listing_failure_is_bad_gateway() {
    let fixture = TestFixture::new(1).await;
    fixture.produce(1..=1);
    fixture.source.set_fail_list(true).await;

    let response = fixture.post("/api/v1/driver/tick").await;

    assert_eq!(response.status, StatusCode::BAD_GATEWAY);
    assert!(response.body["error"]
        .as_str()
        .unwrap()
        .starts_with("request source error"));
}

#[tokio::test]
async fn test_overlapping_tick_conflicts() {
    let fixture = TestFixture::new(1).await;
    fixture.produce(1..=2);
    fixture.source.set_open(&["A"], &[]).await;
    fixture.source.set_publish_delay_ms(300).await;

    let first = fixture.post("/api/v1/driver/tick");
    let second = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        fixture.post("/api/v1/driver/tick").await
    };
    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(second.status, StatusCode::CONFLICT);
    assert_eq!(second.body["error"], "operation already in progress: tick");
}

#[tokio::test]
async fn test_reaper_marks_then_deletes() {
    let fixture = TestFixture::new(1).await;
    fixture.produce(1..=2);
    fixture.source.set_open(&["A"], &[]).await;

    let tick = fixture.post("/api/v1/driver/tick").await;
    assert_eq!(tick.status, StatusCode::OK);

    // Request A is no longer open anywhere
    fixture.source.set_open(&[], &[]).await;

    let first = fixture.post("/api/v1/driver/reaper").await;
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.body["marked_completed"].as_array().unwrap().len(), 1);
    assert_eq!(first.body["marked_completed"][0]["request_id"], "A");
    assert_eq!(first.body["deleted"].as_array().unwrap().len(), 0);

    tokio::time::sleep(Duration::from_millis(5)).await;

    let second = fixture.post("/api/v1/driver/reaper").await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.body["deleted"].as_array().unwrap().len(), 1);
    assert_eq!(second.body["deleted"][0]["request_id"], "A");

    let status = fixture.get("/api/v1/status").await;
    assert_eq!(status.body["usable_count"], 1);
}

#[tokio::test]
async fn test_monitor_pass_with_no_jobs() {
    let fixture = TestFixture::new(1).await;

    let response = fixture.post("/api/v1/driver/monitor").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["reaped"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_start_and_stop() {
    let fixture = TestFixture::new(1).await;
    fixture.produce(1..=1);

    let started = fixture.post("/api/v1/driver/start").await;
    assert_eq!(started.status, StatusCode::OK);
    assert_eq!(fixture.get("/api/v1/status").await.body["running"], true);

    let stopped = fixture.post("/api/v1/driver/stop").await;
    assert_eq!(stopped.status, StatusCode::OK);
    assert_eq!(fixture.get("/api/v1/status").await.body["running"], false);
}

#[tokio::test]
async fn test_request_timeline_follows_lifecycle() {
    let fixture = TestFixture::new(1).await;
    fixture.produce(1..=3);
    fixture.source.set_open(&["A", "B"], &[]).await;
    assert_eq!(fixture.post("/api/v1/driver/tick").await.status, StatusCode::OK);

    // Output phase, then the request leaves the open lists
    fixture.source.set_open(&[], &["A"]).await;
    assert_eq!(fixture.post("/api/v1/driver/tick").await.status, StatusCode::OK);
    fixture.source.set_open(&[], &[]).await;
    assert_eq!(fixture.post("/api/v1/driver/reaper").await.status, StatusCode::OK);

    // A: assigned, challenge, output, marked. B: assigned, challenge, marked.
    fixture.wait_for_audit_events(7).await;

    let response = fixture.get("/api/v1/requests/A/timeline").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["request_id"], "A");
    assert_eq!(response.body["stage"], "marked_completed");
    assert_eq!(response.body["publication_failures"], 0);
    let kinds: Vec<&str> = response.body["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["event"]["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        kinds,
        vec![
            "puzzle_assigned",
            "challenge_published",
            "output_published",
            "puzzle_marked_completed",
        ]
    );
    assert_eq!(
        response.body["puzzle_id"],
        response.body["records"][0]["event"]["puzzle_id"]
    );
}

#[tokio::test]
async fn test_unknown_request_timeline_is_not_found() {
    let fixture = TestFixture::new(1).await;

    let response = fixture.get("/api/v1/requests/nope/timeline").await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_job_history_after_launch() {
    let fixture = TestFixture::new(10).await;
    fixture.produce(1..=4);

    let tick = fixture.post("/api/v1/driver/tick").await;
    let job_id = tick.body["replenish"]["handle"].as_str().unwrap().to_string();
    fixture.wait_for_audit_events(1).await;

    let response = fixture.get(&format!("/api/v1/jobs/{}/history", job_id)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["size"], 6);
    assert_eq!(response.body["usable_at_launch"], 4);
    assert!(response.body["reaped_at"].is_null());
}

#[tokio::test]
async fn test_recent_audit_feed() {
    let fixture = TestFixture::new(1).await;
    fixture.produce(1..=2);
    fixture.source.set_open(&["A"], &[]).await;
    fixture.post("/api/v1/driver/tick").await;
    fixture.wait_for_audit_events(2).await;

    let response = fixture.get("/api/v1/audit/recent?limit=1").await;

    assert_eq!(response.status, StatusCode::OK);
    let records = response.body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["event"]["type"], "challenge_published");
    assert_eq!(records[0]["subject"]["kind"], "request");
    assert_eq!(records[0]["subject"]["id"], "A");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new(1).await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("depot_http_requests_in_flight"));
    assert!(body.contains("depot_driver_running"));
}
