//! Metric API Handlers
//!
//! Ingestion callbacks for running workloads and series retrieval.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use foundry_core::domain::metric::MetricPoint;
use foundry_core::dto::metric::{MetricQuery, MetricsResponse, RecordMetric};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /job/{id}/metrics
/// Record a single metric point
pub async fn record_metric(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordMetric>,
) -> ApiResult<(StatusCode, Json<MetricPoint>)> {
    let point = state.metrics.record(id, req).await?;

    Ok((StatusCode::CREATED, Json(point)))
}

/// POST /job/{id}/metrics/batch
/// Record several metric points at once
pub async fn record_metrics_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(reqs): Json<Vec<RecordMetric>>,
) -> ApiResult<(StatusCode, Json<BatchRecorded>)> {
    tracing::debug!("Recording {} metric points for job: {}", reqs.len(), id);

    let recorded = state.metrics.record_batch(id, reqs).await?;

    Ok((StatusCode::CREATED, Json(BatchRecorded { recorded })))
}

/// GET /job/{id}/metrics
/// Get metric series for a job, optionally a single named one
pub async fn get_metrics(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<MetricQuery>,
) -> ApiResult<Json<MetricsResponse>> {
    tracing::debug!("Getting metrics for job: {}", id);

    let response = state
        .metrics
        .query(id, query.metric_name.as_deref())
        .await?;

    Ok(Json(response))
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, serde::Serialize)]
pub struct BatchRecorded {
    pub recorded: usize,
}
