use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use depot_core::{
    create_audit_system, create_launcher, load_config, validate_config, AuditEvent, AuditStore,
    Driver, HttpRequestSource, JobLauncher, PuzzleStore, RequestSource, SqliteAuditStore,
    SqlitePuzzleStore,
};
use depot_server::api::create_router;
use depot_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("DEPOT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Provider: {}", config.provider.id);
    info!("Database path: {:?}", config.database.path);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    // Create SQLite puzzle store
    let puzzle_store: Arc<dyn PuzzleStore> = Arc::new(
        SqlitePuzzleStore::with_busy_timeout(&config.database.path, config.database.busy_timeout())
            .context("Failed to create puzzle store")?,
    );
    info!("Puzzle store initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    // Record ServiceStarted event
    audit_handle
        .record(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Recorded ServiceStarted audit event");

    // Create request source client
    let request_source: Arc<dyn RequestSource> = Arc::new(
        HttpRequestSource::new(config.request_source.clone())
            .context("Failed to create request source client")?,
    );
    info!("Request source at {}", config.request_source.url);

    // Create job launcher
    let launcher: Arc<dyn JobLauncher> = create_launcher(&config.launcher);
    info!(
        "Using {} launcher with image {}",
        launcher.name(),
        config.launcher.docker.image
    );

    // Create driver
    let driver = Arc::new(Driver::new(
        config.driver.clone(),
        config.provider.id.clone(),
        &config.inventory,
        puzzle_store,
        launcher,
        request_source,
        Some(audit_handle.clone()),
    ));

    if config.driver.enabled {
        driver.start().await;
    } else {
        warn!("Driver disabled, ticks only run when triggered through the API");
    }

    // Create app state
    let state = Arc::new(AppState::new(
        config.clone(),
        audit_store,
        Arc::clone(&driver),
    ));

    // Create router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Stop driver if running
    if driver.is_running() {
        info!("Stopping driver...");
        driver.stop().await;
    }

    // Record ServiceStopped event
    info!("Server shutting down...");
    audit_handle
        .record(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // Drop all holders of AuditHandle so the writer's channel closes.
    // The driver components hold clones; the router state went with the server.
    drop(driver);
    drop(audit_handle);

    // Wait for writer to finish processing remaining events
    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
