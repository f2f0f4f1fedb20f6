pub mod assignment;
pub mod audit;
pub mod config;
pub mod driver;
pub mod fulfillment;
pub mod inventory;
pub mod launcher;
pub mod metrics;
pub mod reaper;
pub mod replenish;
pub mod request_source;
pub mod single_flight;
pub mod store;
pub mod testing;

pub use assignment::{Assignment, AssignmentEngine, Binding};
pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditHandle, AuditRecord, AuditStore,
    AuditSubject, AuditWriter, JobHistory, RequestStage, RequestTimeline, SqliteAuditStore,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use driver::{Driver, DriverConfig, DriverError, DriverStatus, TickReport};
pub use fulfillment::{FulfillmentPipeline, FulfillmentReport, Phase, PhaseReport};
pub use inventory::{InventoryConfig, InventoryTracker};
pub use launcher::{
    create_launcher, DockerConfig, DockerLauncher, JobHandle, JobLauncher, JobStatus,
    LauncherConfig, LauncherError, RemoveOutcome, Termination,
};
pub use reaper::{ReclaimReport, ReclaimedPuzzle, RetentionReaper};
pub use replenish::{
    JobMonitor, JobTracker, ReapedJob, ReconcileReport, ReplenishOutcome, ReplenishmentScheduler,
    TrackedJob,
};
pub use request_source::{
    ChallengePayload, HttpRequestSource, OpenRequests, OutputPayload, Proof, RequestSource,
    RequestSourceConfig, RequestSourceError,
};
pub use single_flight::{GateTicket, OperationGate, SingleFlight};
pub use store::{
    ChallengeRecord, NewPuzzle, OutputRecord, Puzzle, PuzzleStore, PuzzleTx,
    SqlitePuzzleStore, StoreError,
};
