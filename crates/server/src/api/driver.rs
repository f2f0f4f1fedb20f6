//! Driver API handlers.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use depot_core::{DriverError, DriverStatus, ReclaimReport, ReconcileReport, TickReport};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

/// Error response
#[derive(Debug, Serialize)]
pub struct DriverErrorResponse {
    pub error: String,
}

/// Simple message response
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn error_response(e: DriverError) -> (StatusCode, Json<DriverErrorResponse>) {
    let status = match e {
        DriverError::Busy(_) => StatusCode::CONFLICT,
        DriverError::RequestSource(_) => StatusCode::BAD_GATEWAY,
        DriverError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(DriverErrorResponse {
            error: e.to_string(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Get driver status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<DriverStatus> {
    Json(state.driver().status().await)
}

/// Start the background loops
pub async fn start(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.driver().start().await;
    Json(MessageResponse {
        message: "Driver started".to_string(),
    })
}

/// Stop the background loops
pub async fn stop(State(state): State<Arc<AppState>>) -> Json<MessageResponse> {
    state.driver().stop().await;
    Json(MessageResponse {
        message: "Driver stopped".to_string(),
    })
}

/// Run one main tick now
pub async fn run_tick(
    State(state): State<Arc<AppState>>,
) -> Result<Json<TickReport>, impl IntoResponse> {
    state.driver().run_tick().await.map(Json).map_err(error_response)
}

/// Run one job monitor pass now
pub async fn run_monitor(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReconcileReport>, impl IntoResponse> {
    state
        .driver()
        .run_monitor()
        .await
        .map(Json)
        .map_err(error_response)
}

/// Run one reclamation pass now
pub async fn run_reaper(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReclaimReport>, impl IntoResponse> {
    state
        .driver()
        .run_reaper()
        .await
        .map(Json)
        .map_err(error_response)
}
