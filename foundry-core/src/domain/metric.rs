//! Metric domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One timestamped observation of a named measurement for a job
///
/// Append-only. Removed only when the owning job is deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub job_id: Uuid,
    pub name: String,
    pub step: i64,
    pub value: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl MetricPoint {
    pub fn sample(&self) -> MetricSample {
        MetricSample {
            step: self.step,
            value: self.value,
            timestamp: self.timestamp,
        }
    }
}

/// A metric point as returned inside a series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub step: i64,
    pub value: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
