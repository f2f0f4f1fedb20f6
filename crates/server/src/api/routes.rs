use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{audit, driver, handlers, middleware::metrics_middleware};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // API routes
    let api_routes = Router::new()
        // Health and config
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        // Audit
        .route("/audit/recent", get(audit::recent))
        .route("/requests/{request_id}/timeline", get(audit::request_timeline))
        .route("/jobs/{job_id}/history", get(audit::job_history))
        // Driver
        .route("/status", get(driver::get_status))
        .route("/driver/start", post(driver::start))
        .route("/driver/stop", post(driver::stop))
        .route("/driver/tick", post(driver::run_tick))
        .route("/driver/monitor", post(driver::run_monitor))
        .route("/driver/reaper", post(driver::run_reaper))
        .route_layer(middleware::from_fn(metrics_middleware))
        .with_state(Arc::clone(&state));

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
