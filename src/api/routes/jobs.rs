//! Job status handlers.

use super::JobsQuery;
use crate::api::AppState;
use crate::types::JobId;
use axum::{
    Json,
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

/// GET /jobs - List jobs, newest first
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    params(JobsQuery),
    responses(
        (status = 200, description = "Jobs matching the filter", body = Vec<crate::types::JobInfo>),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_jobs(State(state): State<AppState>, Query(query): Query<JobsQuery>) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);

    match state.pulse.list_jobs(query.status, limit, offset).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => e.into_response(),
    }
}

/// GET /jobs/:id - Get a single job
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = i64, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job information", body = crate::types::JobInfo),
        (status = 404, description = "Job not found")
    )
)]
pub async fn get_job(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.pulse.get_job(JobId(id)).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => e.into_response(),
    }
}
