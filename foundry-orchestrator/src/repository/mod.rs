//! Repository Module
//!
//! Data access layer for the orchestrator.
//!
//! The scheduler only talks to storage through the [`JobStore`] and
//! [`MetricStore`] traits. [`PgStore`] persists to PostgreSQL and
//! [`MemoryStore`] keeps everything in process.

pub mod job;
pub mod memory;
pub mod metric;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use foundry_core::domain::job::{Job, JobStatus};
use foundry_core::domain::metric::MetricPoint;
use foundry_core::dto::job::JobListQuery;
use sqlx::PgPool;
use uuid::Uuid;

/// Default page size for job listings
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Field changes written together with a status transition
///
/// Start and completion timestamps are write-once: a store keeps the value
/// already present. The completion timestamp is never earlier than the start.
#[derive(Debug, Clone, PartialEq)]
pub struct JobChange {
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub output_path: Option<String>,
}

impl JobChange {
    pub fn running(at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Running,
            started_at: Some(at),
            completed_at: None,
            error_message: None,
            output_path: None,
        }
    }

    pub fn completed(at: DateTime<Utc>, output_path: String) -> Self {
        Self {
            status: JobStatus::Completed,
            started_at: None,
            completed_at: Some(at),
            error_message: None,
            output_path: Some(output_path),
        }
    }

    pub fn failed(at: DateTime<Utc>, error_message: String) -> Self {
        Self {
            status: JobStatus::Failed,
            started_at: None,
            completed_at: Some(at),
            error_message: Some(error_message),
            output_path: None,
        }
    }

    pub fn cancelled(at: DateTime<Utc>) -> Self {
        Self {
            status: JobStatus::Cancelled,
            started_at: None,
            completed_at: Some(at),
            error_message: None,
            output_path: None,
        }
    }

    /// Applies the change to an in-memory record
    pub fn apply_to(self, job: &mut Job) {
        job.status = self.status;
        if job.started_at.is_none() {
            job.started_at = self.started_at;
        }
        if job.completed_at.is_none() {
            job.completed_at = match (self.completed_at, job.started_at) {
                (Some(done), Some(started)) => Some(done.max(started)),
                (done, _) => done,
            };
        }
        if self.error_message.is_some() {
            job.error_message = self.error_message;
        }
        if self.output_path.is_some() {
            job.output_path = self.output_path;
        }
    }
}

/// Durable record of jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persists a new job
    async fn insert(&self, job: &Job) -> StoreResult<()>;

    /// Finds a job by ID
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Finds all jobs in a status, oldest submission first
    async fn find_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>>;

    /// Lists jobs newest first, filtered and paginated
    async fn list(&self, query: &JobListQuery) -> StoreResult<Vec<Job>>;

    /// Atomically applies `change` if the job's status is one of `from`
    ///
    /// Returns the updated job, or `None` when the job is missing or its
    /// current status is not in `from`. Two concurrent transitions from the
    /// same state can never both succeed.
    async fn transition(
        &self,
        id: Uuid,
        from: &[JobStatus],
        change: JobChange,
    ) -> StoreResult<Option<Job>>;

    /// Deletes a job and its metric points
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

/// Append-only record of metric points
#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Appends metric points
    async fn append(&self, points: &[MetricPoint]) -> StoreResult<()>;

    /// Finds the points of a job, optionally restricted to one metric name
    ///
    /// Points are ordered by timestamp, then step.
    async fn find_by_job(&self, job_id: Uuid, name: Option<&str>) -> StoreResult<Vec<MetricPoint>>;
}

/// PostgreSQL-backed store
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}
