//! Audit read endpoints: request timelines, job histories and the recent feed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use depot_core::{AuditError, AuditRecord, JobHistory, RequestTimeline};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

const DEFAULT_RECENT: usize = 50;
const MAX_RECENT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AuditErrorResponse {
    pub error: String,
}

type AuditResult<T> = Result<Json<T>, (StatusCode, Json<AuditErrorResponse>)>;

fn store_error(e: AuditError) -> (StatusCode, Json<AuditErrorResponse>) {
    tracing::error!(error = %e, "Audit read failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(AuditErrorResponse {
            error: e.to_string(),
        }),
    )
}

fn not_found(what: String) -> (StatusCode, Json<AuditErrorResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(AuditErrorResponse {
            error: format!("no audit records for {}", what),
        }),
    )
}

/// Lifecycle of one request: binding, publications and reclamation.
pub async fn request_timeline(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> AuditResult<RequestTimeline> {
    state
        .audit_store()
        .request_timeline(&request_id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("request {}", request_id)))
}

/// Launch and release of one production job.
pub async fn job_history(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> AuditResult<JobHistory> {
    state
        .audit_store()
        .job_history(&job_id)
        .map_err(store_error)?
        .map(Json)
        .ok_or_else(|| not_found(format!("job {}", job_id)))
}

/// Newest records across every subject.
pub async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> AuditResult<Vec<AuditRecord>> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT).clamp(1, MAX_RECENT);
    state.audit_store().recent(limit).map(Json).map_err(store_error)
}
