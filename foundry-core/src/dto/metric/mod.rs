//! Metric DTOs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::metric::MetricSample;

/// A metric observation submitted by a running workload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMetric {
    pub step: i64,
    pub metric_name: String,
    pub metric_value: f64,
    /// Observation time; the orchestrator's clock is used if absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// Query parameters for metric retrieval
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_name: Option<String>,
}

/// Metric series for one job, grouped by metric name
///
/// Each series is sorted by timestamp ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub job_id: Uuid,
    pub metrics: BTreeMap<String, Vec<MetricSample>>,
}
