//! Driver lifecycle integration tests.
//!
//! These tests drive the depot through its ticks with a mock launcher and a
//! mock request source:
//! low inventory -> job launched -> producer fills -> requests bound ->
//! challenge and output published -> puzzle reclaimed

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use depot_core::{
    testing::{fixtures, MockJobLauncher, MockRequestSource},
    Driver, DriverConfig, InventoryConfig, JobLauncher, PuzzleStore, ReplenishOutcome,
    RequestSource, SqlitePuzzleStore, Termination,
};

/// Test helper wiring a driver to mocks and an on-disk store.
struct TestHarness {
    store: Arc<SqlitePuzzleStore>,
    launcher: Arc<MockJobLauncher>,
    source: Arc<MockRequestSource>,
    next_seed: u32,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqlitePuzzleStore::new(&temp_dir.path().join("depot.db"))
                .expect("Failed to create store"),
        );

        Self {
            store,
            launcher: Arc::new(MockJobLauncher::new()),
            source: Arc::new(MockRequestSource::new()),
            next_seed: 1,
            _temp_dir: temp_dir,
        }
    }

    /// Simulate a producer job inserting `count` puzzles.
    fn produce(&mut self, count: u32) {
        for _ in 0..count {
            self.store
                .insert_puzzle(fixtures::new_puzzle(self.next_seed))
                .expect("Failed to insert puzzle");
            self.next_seed += 1;
        }
    }

    fn create_driver(&self, minimum_entries: u64, retention_secs: u64) -> Driver {
        let config = DriverConfig {
            enabled: true,
            poll_interval_ms: 20,
            monitor_interval_ms: 20,
            reaper_interval_ms: 20,
            retention_secs,
            ..Default::default()
        };

        Driver::new(
            config,
            "provider-1",
            &InventoryConfig { minimum_entries },
            Arc::clone(&self.store) as Arc<dyn PuzzleStore>,
            Arc::clone(&self.launcher) as Arc<dyn JobLauncher>,
            Arc::clone(&self.source) as Arc<dyn RequestSource>,
            None,
        )
    }
}

#[tokio::test]
async fn test_low_inventory_launches_single_job() {
    let mut harness = TestHarness::new();
    harness.produce(10);
    let driver = harness.create_driver(50, 3600);

    let report = driver.run_tick().await.unwrap();
    let handle = match report.replenish {
        ReplenishOutcome::Launched { handle, size } => {
            assert_eq!(size, 40);
            handle
        }
        other => panic!("expected a launch, got {:?}", other),
    };
    assert_eq!(harness.launcher.started_sizes().await, vec![40]);

    // The job delivers its 40 puzzles while still tracked
    harness.produce(40);
    let report = driver.run_tick().await.unwrap();
    assert_eq!(report.usable_count, 50);
    assert_eq!(report.replenish, ReplenishOutcome::NoDeficit);

    // A request consumes one; the tracked job still blocks a second launch
    harness.source.set_open(&["A"], &[]).await;
    driver.run_tick().await.unwrap();
    let report = driver.run_tick().await.unwrap();
    assert_eq!(report.usable_count, 49);
    assert!(matches!(
        report.replenish,
        ReplenishOutcome::AlreadyRunning { tracked: 1 }
    ));
    assert_eq!(harness.launcher.start_count().await, 1);

    // Once the monitor reaps the finished job, the deficit is covered again
    harness.launcher.finish_job(&handle, 0).await;
    let reconcile = driver.run_monitor().await.unwrap();
    assert_eq!(reconcile.reaped.len(), 1);
    assert_eq!(reconcile.reaped[0].termination, Some(Termination::Completed));

    driver.run_tick().await.unwrap();
    assert_eq!(harness.launcher.started_sizes().await, vec![40, 1]);
}

#[tokio::test]
async fn test_request_lifecycle_through_reclamation() {
    let mut harness = TestHarness::new();
    harness.produce(2);
    let driver = harness.create_driver(0, 0);

    // Challenge phase: bind and publish
    harness.source.set_open(&["A"], &[]).await;
    let report = driver.run_tick().await.unwrap();
    let puzzle_id = report.assignment.unwrap().puzzle_for("A").unwrap();
    assert_eq!(report.fulfillment.challenge.published, vec!["A"]);

    let challenges = harness.source.challenges().await;
    assert_eq!(challenges[0].1.puzzle_id, puzzle_id);
    assert_eq!(challenges[0].1.input, fixtures::new_puzzle(1).x);

    // Output phase: publish output with the factorization
    harness.source.set_open(&[], &["A"]).await;
    let report = driver.run_tick().await.unwrap();
    assert_eq!(report.fulfillment.output.published, vec!["A"]);
    let outputs = harness.source.outputs().await;
    assert_eq!(outputs[0].1.puzzle_id, puzzle_id);
    assert_eq!(outputs[0].1.proof.p, fixtures::new_puzzle(1).p);

    // Reaper leaves a puzzle alone while its output is still open
    let reclaim = driver.run_reaper().await.unwrap();
    assert!(reclaim.is_noop());

    // Request gone: first pass marks, second pass deletes
    harness.source.set_open(&[], &[]).await;
    let reclaim = driver.run_reaper().await.unwrap();
    assert_eq!(reclaim.marked_completed.len(), 1);
    let puzzle = harness.store.get(puzzle_id).unwrap().unwrap();
    assert!(puzzle.completed_at.is_some());

    tokio::time::sleep(Duration::from_millis(5)).await;
    let reclaim = driver.run_reaper().await.unwrap();
    assert_eq!(reclaim.deleted.len(), 1);
    assert!(harness.store.get(puzzle_id).unwrap().is_none());
    assert!(!harness
        .store
        .key_material_exists(puzzle.keymaterial_id)
        .unwrap());

    // The other puzzle is untouched
    assert_eq!(harness.store.usable_count().unwrap(), 1);
}

#[tokio::test]
async fn test_reappearing_request_keeps_its_puzzle() {
    let mut harness = TestHarness::new();
    harness.produce(1);
    let driver = harness.create_driver(0, 3600);

    harness.source.set_open(&["A"], &[]).await;
    driver.run_tick().await.unwrap();

    harness.source.set_open(&[], &[]).await;
    let reclaim = driver.run_reaper().await.unwrap();
    assert_eq!(reclaim.marked_completed.len(), 1);

    harness.source.set_open(&[], &["A"]).await;
    let reclaim = driver.run_reaper().await.unwrap();
    assert_eq!(reclaim.revived.len(), 1);

    let puzzle = harness.store.find_by_request("A").unwrap().unwrap();
    assert!(puzzle.completed_at.is_none());

    let report = driver.run_tick().await.unwrap();
    assert_eq!(report.fulfillment.output.published, vec!["A"]);
}

#[tokio::test]
async fn test_failed_publication_retried_next_tick() {
    let mut harness = TestHarness::new();
    harness.produce(2);
    let driver = harness.create_driver(0, 3600);

    harness.source.set_open(&["A", "B"], &[]).await;
    harness.source.fail_request("A").await;
    let report = driver.run_tick().await.unwrap();

    assert_eq!(report.fulfillment.challenge.failed, vec!["A"]);
    assert_eq!(report.fulfillment.challenge.published, vec!["B"]);
    // Binding survives the failed publication
    let bound = harness.store.find_by_request("A").unwrap().unwrap();

    let report = driver.run_tick().await.unwrap();
    assert_eq!(report.assignment.unwrap().puzzle_for("A"), Some(bound.id));
    assert_eq!(report.fulfillment.challenge.failed, vec!["A"]);
}

#[tokio::test]
async fn test_listing_failure_skips_tick() {
    let mut harness = TestHarness::new();
    harness.produce(1);
    let driver = harness.create_driver(0, 0);

    harness.source.set_open(&["A"], &[]).await;
    harness.source.set_fail_list(true).await;

    assert!(driver.run_tick().await.is_err());
    assert!(driver.run_reaper().await.is_err());
    assert_eq!(harness.store.usable_count().unwrap(), 1);
    assert!(harness.source.challenges().await.is_empty());
}

#[tokio::test]
async fn test_background_loops_publish_and_stop() {
    let mut harness = TestHarness::new();
    harness.produce(1);
    let driver = harness.create_driver(0, 3600);
    harness.source.set_open(&["A"], &[]).await;

    driver.start().await;

    let mut published = false;
    for _ in 0..100 {
        if !harness.source.challenges().await.is_empty() {
            published = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    driver.stop().await;

    assert!(published, "tick loop never published the challenge");
    assert!(!driver.is_running());
    assert!(!harness.source.supply_reports().await.is_empty());
}
