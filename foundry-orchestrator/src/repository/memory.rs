//! In-memory store
//!
//! Keeps jobs and metric points in process. Used when no database is
//! configured, and by the tests.

use async_trait::async_trait;
use foundry_core::domain::job::{Job, JobStatus};
use foundry_core::domain::metric::MetricPoint;
use foundry_core::dto::job::JobListQuery;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{DEFAULT_LIST_LIMIT, JobChange, JobStore, MetricStore, StoreError, StoreResult};

#[derive(Default)]
struct Tables {
    jobs: HashMap<Uuid, Job>,
    metrics: HashMap<Uuid, Vec<MetricPoint>>,
}

/// Process-local implementation of [`JobStore`] and [`MetricStore`]
///
/// A single mutex guards both tables, so every transition is atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        let mut tables = self.tables();
        if tables.jobs.contains_key(&job.id) {
            return Err(StoreError::InvalidRecord(format!(
                "job {} already exists",
                job.id
            )));
        }
        tables.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.tables().jobs.get(&id).cloned())
    }

    async fn find_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .tables()
            .jobs
            .values()
            .filter(|j| j.status == status)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.submitted_at);
        Ok(jobs)
    }

    async fn list(&self, query: &JobListQuery) -> StoreResult<Vec<Job>> {
        let mut jobs: Vec<Job> = self
            .tables()
            .jobs
            .values()
            .filter(|j| query.status.is_none_or(|s| j.status == s))
            .filter(|j| {
                query
                    .owner
                    .as_deref()
                    .is_none_or(|o| j.owner.as_deref() == Some(o))
            })
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        Ok(jobs
            .into_iter()
            .skip(query.offset.unwrap_or(0) as usize)
            .take(query.limit.unwrap_or(DEFAULT_LIST_LIMIT) as usize)
            .collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[JobStatus],
        change: JobChange,
    ) -> StoreResult<Option<Job>> {
        let mut tables = self.tables();
        let Some(job) = tables.jobs.get_mut(&id) else {
            return Ok(None);
        };

        if !from.contains(&job.status) {
            return Ok(None);
        }

        change.apply_to(job);
        Ok(Some(job.clone()))
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables();
        tables.metrics.remove(&id);
        Ok(tables.jobs.remove(&id).is_some())
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    async fn append(&self, points: &[MetricPoint]) -> StoreResult<()> {
        let mut tables = self.tables();

        // Mirror the foreign key of the database schema
        if let Some(orphan) = points.iter().find(|p| !tables.jobs.contains_key(&p.job_id)) {
            return Err(StoreError::InvalidRecord(format!(
                "metric for unknown job {}",
                orphan.job_id
            )));
        }

        for point in points {
            tables
                .metrics
                .entry(point.job_id)
                .or_default()
                .push(point.clone());
        }
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid, name: Option<&str>) -> StoreResult<Vec<MetricPoint>> {
        let mut points: Vec<MetricPoint> = self
            .tables()
            .metrics
            .get(&job_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| name.is_none_or(|n| p.name == n))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        points.sort_by_key(|p| (p.timestamp, p.step));
        Ok(points)
    }
}
