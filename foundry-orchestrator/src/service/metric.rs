//! Metric Service
//!
//! Ingests metric observations reported by running workloads and serves
//! them back as per-name time series.

use chrono::Utc;
use foundry_core::domain::metric::{MetricPoint, MetricSample};
use foundry_core::dto::metric::{MetricsResponse, RecordMetric};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::{JobStore, MetricStore, StoreError};

const MAX_METRIC_NAME_LENGTH: usize = 100;
pub const MAX_BATCH_SIZE: usize = 1000;

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    #[error("{0}")]
    Validation(String),

    #[error("job {0} not found")]
    JobNotFound(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MetricError>;

pub struct MetricService {
    jobs: Arc<dyn JobStore>,
    metrics: Arc<dyn MetricStore>,
}

impl MetricService {
    pub fn new(jobs: Arc<dyn JobStore>, metrics: Arc<dyn MetricStore>) -> Self {
        Self { jobs, metrics }
    }

    /// Append one observation to a job's series
    ///
    /// Arrival order does not matter; retrieval is sorted by timestamp.
    pub async fn record(&self, job_id: Uuid, req: RecordMetric) -> Result<MetricPoint> {
        let point = to_point(job_id, req)?;
        self.ensure_job(job_id).await?;

        self.metrics.append(std::slice::from_ref(&point)).await?;

        tracing::trace!(
            job_id = %job_id,
            metric = %point.name,
            step = point.step,
            value = point.value,
            "Recorded metric"
        );

        Ok(point)
    }

    /// Append several observations at once; either all are stored or none
    pub async fn record_batch(&self, job_id: Uuid, reqs: Vec<RecordMetric>) -> Result<usize> {
        if reqs.len() > MAX_BATCH_SIZE {
            return Err(MetricError::Validation(format!(
                "batch too large (max: {} points)",
                MAX_BATCH_SIZE
            )));
        }

        let points = reqs
            .into_iter()
            .map(|req| to_point(job_id, req))
            .collect::<Result<Vec<_>>>()?;
        if points.is_empty() {
            return Ok(0);
        }

        self.ensure_job(job_id).await?;
        self.metrics.append(&points).await?;

        tracing::debug!(job_id = %job_id, count = points.len(), "Recorded metric batch");
        Ok(points.len())
    }

    /// All series of a job, or only the named one
    ///
    /// A name with no recorded points yields an empty series. The name is
    /// trimmed like recorded names are; a blank name means no filter.
    pub async fn query(&self, job_id: Uuid, name: Option<&str>) -> Result<MetricsResponse> {
        self.ensure_job(job_id).await?;

        let name = name.map(str::trim).filter(|n| !n.is_empty());

        let mut points = self.metrics.find_by_job(job_id, name).await?;
        points.sort_by_key(|p| (p.timestamp, p.step));

        let mut metrics: BTreeMap<String, Vec<MetricSample>> = BTreeMap::new();
        if let Some(name) = name {
            metrics.insert(name.to_string(), Vec::new());
        }
        for point in &points {
            metrics
                .entry(point.name.clone())
                .or_default()
                .push(point.sample());
        }

        Ok(MetricsResponse { job_id, metrics })
    }

    async fn ensure_job(&self, job_id: Uuid) -> Result<()> {
        match self.jobs.find_by_id(job_id).await? {
            Some(_) => Ok(()),
            None => Err(MetricError::JobNotFound(job_id)),
        }
    }
}

fn to_point(job_id: Uuid, req: RecordMetric) -> Result<MetricPoint> {
    let name = req.metric_name.trim();
    if name.is_empty() {
        return Err(MetricError::Validation(
            "metric_name cannot be empty".to_string(),
        ));
    }
    if name.chars().count() > MAX_METRIC_NAME_LENGTH {
        return Err(MetricError::Validation(format!(
            "metric_name too long (max: {} chars)",
            MAX_METRIC_NAME_LENGTH
        )));
    }
    if !req.metric_value.is_finite() {
        return Err(MetricError::Validation(format!(
            "metric_value must be finite (got {})",
            req.metric_value
        )));
    }
    if req.step < 0 {
        return Err(MetricError::Validation(format!(
            "step must be non-negative (got {})",
            req.step
        )));
    }

    Ok(MetricPoint {
        job_id,
        name: name.to_string(),
        step: req.step,
        value: req.metric_value,
        timestamp: req.timestamp.unwrap_or_else(Utc::now),
    })
}
