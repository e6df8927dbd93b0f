//! Job API Handlers
//!
//! HTTP endpoints for job submission and lifecycle management.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use foundry_core::domain::job::Job;
use foundry_core::dto::job::{
    CancelOutcome, CreateJob, JobDetail, JobListQuery, QueueEntry, StatusUpdate,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

// =============================================================================
// Submission and Queries
// =============================================================================

/// POST /job
/// Submit a new job; it is queued before the response is sent
pub async fn submit_job(
    State(state): State<AppState>,
    Json(req): Json<CreateJob>,
) -> ApiResult<(StatusCode, Json<Job>)> {
    tracing::info!("Submitting job: {}", req.name);

    let job = state.jobs.submit(req).await?;

    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /job/{id}
/// Get job details by ID, including queue position while queued
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobDetail>> {
    tracing::debug!("Getting job: {}", id);

    let detail = state.jobs.get_job_detail(id).await?;

    Ok(Json(detail))
}

/// GET /job/list
/// List jobs, newest first
///
/// Query parameters: `status`, `owner`, `offset`, `limit`
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobListQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    tracing::debug!("Listing jobs: {:?}", query);

    let jobs = state.jobs.list_jobs(query).await?;

    Ok(Json(jobs))
}

/// GET /queue
/// Pending jobs in dispatch order
pub async fn list_queue(State(state): State<AppState>) -> Json<Vec<QueueEntry>> {
    Json(state.jobs.queue_snapshot())
}

// =============================================================================
// Lifecycle Endpoints
// =============================================================================

/// POST /job/{id}/cancel
/// Cancel a queued or running job
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<CancelOutcome>> {
    tracing::info!("Cancelling job: {}", id);

    let outcome = state.jobs.cancel(id).await?;

    Ok(Json(outcome))
}

/// POST /job/{id}/status
/// Status update callback from an executor or workload
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<StatusUpdate>,
) -> ApiResult<Json<Job>> {
    tracing::info!("Status update for job {}: {}", id, update.status);

    let job = state.jobs.apply_status_update(id, update).await?;

    Ok(Json(job))
}

/// DELETE /job/{id}
/// Delete a finished job and its metrics
pub async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    tracing::info!("Deleting job: {}", id);

    state.jobs.delete_job(id).await?;

    Ok(StatusCode::NO_CONTENT)
}
