//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;
pub mod metric;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::service::job_service::JobService;
use crate::service::metric_service::MetricService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    pub metrics: Arc<MetricService>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/job", post(job::submit_job))
        .route("/job/list", get(job::list_jobs))
        .route("/job/{id}", get(job::get_job).delete(job::delete_job))
        .route("/job/{id}/cancel", post(job::cancel_job))
        .route("/job/{id}/status", post(job::update_status))
        .route("/queue", get(job::list_queue))
        // Metric endpoints
        .route(
            "/job/{id}/metrics",
            get(metric::get_metrics).post(metric::record_metric),
        )
        .route("/job/{id}/metrics/batch", post(metric::record_metrics_batch))
        // Add state and middleware
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
