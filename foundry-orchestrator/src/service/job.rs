//! Job Service
//!
//! The job lifecycle controller. It is the only writer of job status and
//! keeps the priority queue and the job store in agreement.
//!
//! Legal transitions:
//! `queued -> running -> {completed, failed}`, `queued -> cancelled`,
//! `running -> cancelled`.

use chrono::{DateTime, Utc};
use foundry_core::domain::job::{Job, JobStatus, ResourceRequest};
use foundry_core::dto::job::{
    CancelOutcome, CreateJob, JobDetail, JobListQuery, QueueEntry, StatusUpdate,
};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SubmissionLimits;
use crate::repository::{JobChange, JobStore, StoreError};
use crate::scheduler::{JobQueue, QueueError};

const MAX_NAME_LENGTH: usize = 255;
const MAX_LIST_LIMIT: u32 = 1000;

/// Error detail recorded for jobs found running at startup
pub const ORPHANED_JOB_ERROR: &str = "orchestrator restarted while the job was running";

/// Service error type
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Validation(String),

    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {0} is already queued")]
    DuplicateEntry(Uuid),

    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("job {id} already finished ({status})")]
    AlreadyTerminal { id: Uuid, status: JobStatus },

    #[error("job {id} is still {status}")]
    NotTerminal { id: Uuid, status: JobStatus },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<QueueError> for JobError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::DuplicateEntry(id) => JobError::DuplicateEntry(id),
        }
    }
}

pub type Result<T> = std::result::Result<T, JobError>;

/// Terminal outcome reported for a running job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalOutcome {
    Completed { output_path: String },
    Failed { error_message: String },
}

impl TerminalOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            TerminalOutcome::Completed { .. } => JobStatus::Completed,
            TerminalOutcome::Failed { .. } => JobStatus::Failed,
        }
    }

    fn into_change(self, at: DateTime<Utc>) -> JobChange {
        match self {
            TerminalOutcome::Completed { output_path } => JobChange::completed(at, output_path),
            TerminalOutcome::Failed { error_message } => JobChange::failed(at, error_message),
        }
    }
}

/// A job handed to an executor
///
/// `cancel` fires when the job is cancelled while running.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub job: Job,
    pub cancel: CancellationToken,
}

/// Summary of the startup reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub failed: usize,
}

/// Cancellation handle of a dispatched job
///
/// Shared by concurrent start attempts; it is dropped on a rejected start
/// only when no other attempt is in flight and none has succeeded.
#[derive(Debug)]
struct RunHandle {
    token: CancellationToken,
    pending: usize,
    started: bool,
}

/// Job lifecycle controller
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<JobQueue>,
    limits: SubmissionLimits,
    running: Mutex<HashMap<Uuid, RunHandle>>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<JobQueue>, limits: SubmissionLimits) -> Self {
        Self {
            store,
            queue,
            limits,
            running: Mutex::new(HashMap::new()),
        }
    }

    fn running(&self) -> MutexGuard<'_, HashMap<Uuid, RunHandle>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate, persist and enqueue a new job
    ///
    /// Returns once the job is durably stored and queued.
    pub async fn submit(&self, req: CreateJob) -> Result<Job> {
        validate_submission(&req, &self.limits)?;

        let defaults = ResourceRequest::default();
        let job = Job {
            id: Uuid::new_v4(),
            name: req.name.trim().to_string(),
            owner: req.owner,
            config: req.config,
            priority: req.priority.unwrap_or(self.limits.default_priority),
            status: JobStatus::Queued,
            resources: ResourceRequest {
                gpu_count: req.gpu_count.unwrap_or_else(|| {
                    defaults
                        .gpu_count
                        .clamp(self.limits.gpu_count_min, self.limits.gpu_count_max)
                }),
                memory_gb: req.memory_gb.unwrap_or_else(|| {
                    defaults
                        .memory_gb
                        .clamp(self.limits.memory_gb_min, self.limits.memory_gb_max)
                }),
            },
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            output_path: None,
        };

        self.store.insert(&job).await?;

        // Priority and submission time are captured here, once
        if let Err(e) = self.queue.enqueue(job.id, job.priority, job.submitted_at) {
            tracing::error!(job_id = %job.id, error = %e, "Queue rejected a freshly submitted job");
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job.id,
            priority = job.priority,
            "Job submitted: {}",
            job.name
        );

        Ok(job)
    }

    /// Get a job by ID
    pub async fn get_job(&self, id: Uuid) -> Result<Job> {
        self.store.find_by_id(id).await?.ok_or(JobError::NotFound(id))
    }

    /// Get a job with its queue position
    pub async fn get_job_detail(&self, id: Uuid) -> Result<JobDetail> {
        let job = self.get_job(id).await?;
        let queue_position = match job.status {
            JobStatus::Queued => self.queue.position(id),
            _ => None,
        };

        Ok(JobDetail {
            job,
            queue_position,
        })
    }

    /// List jobs, newest first
    pub async fn list_jobs(&self, mut query: JobListQuery) -> Result<Vec<Job>> {
        query.limit = query.limit.map(|l| l.min(MAX_LIST_LIMIT));
        Ok(self.store.list(&query).await?)
    }

    /// Transition `queued -> running`
    ///
    /// The returned dispatch carries the token that fires if the job is
    /// cancelled while it runs. Fails with `InvalidTransition` if the job is
    /// no longer queued, e.g. because it was cancelled after being dequeued.
    pub async fn mark_running(&self, id: Uuid) -> Result<Dispatch> {
        self.mark_running_at(id, Utc::now()).await
    }

    async fn mark_running_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<Dispatch> {
        // Registered before the status write so a cancel right after it finds the token.
        // An existing handle is joined, never replaced.
        let token = match self.running().entry(id) {
            Entry::Occupied(mut existing) => {
                let handle = existing.get_mut();
                handle.pending += 1;
                handle.token.clone()
            }
            Entry::Vacant(slot) => {
                let token = CancellationToken::new();
                slot.insert(RunHandle {
                    token: token.clone(),
                    pending: 1,
                    started: false,
                });
                token
            }
        };

        let updated = self
            .store
            .transition(id, &[JobStatus::Queued], JobChange::running(at))
            .await;

        match updated {
            Ok(Some(job)) => {
                self.settle_start(id, true);
                tracing::info!(job_id = %id, "Job {} started", job.name);
                Ok(Dispatch { job, cancel: token })
            }
            Ok(None) => {
                self.settle_start(id, false);
                Err(self.rejected(id, JobStatus::Running).await)
            }
            Err(e) => {
                self.settle_start(id, false);
                Err(e.into())
            }
        }
    }

    /// Records the end of one start attempt on the job's handle
    fn settle_start(&self, id: Uuid, started: bool) {
        let mut running = self.running();
        let Some(handle) = running.get_mut(&id) else {
            // Already taken by cancel
            return;
        };
        handle.pending = handle.pending.saturating_sub(1);
        handle.started |= started;
        if handle.pending == 0 && !handle.started {
            running.remove(&id);
        }
    }

    /// Transition `running -> completed | failed`
    ///
    /// A report for a job that was cancelled meanwhile is ignored and yields
    /// `Ok(None)`. Any other non-running state fails with `InvalidTransition`.
    pub async fn mark_terminal(&self, id: Uuid, outcome: TerminalOutcome) -> Result<Option<Job>> {
        self.mark_terminal_at(id, outcome, Utc::now()).await
    }

    async fn mark_terminal_at(
        &self,
        id: Uuid,
        outcome: TerminalOutcome,
        at: DateTime<Utc>,
    ) -> Result<Option<Job>> {
        let target = outcome.status();
        let updated = self
            .store
            .transition(id, &[JobStatus::Running], outcome.into_change(at))
            .await?;

        if let Some(job) = updated {
            self.release(id);
            tracing::info!(job_id = %id, status = %job.status, "Job finished");
            return Ok(Some(job));
        }

        match self.store.find_by_id(id).await? {
            Some(job) if job.status == JobStatus::Cancelled => {
                tracing::info!(
                    job_id = %id,
                    reported = %target,
                    "Ignoring late terminal report for cancelled job"
                );
                Ok(None)
            }
            Some(job) => Err(JobError::InvalidTransition {
                id,
                from: job.status,
                to: target,
            }),
            None => Err(JobError::NotFound(id)),
        }
    }

    /// Cancel a queued or running job
    ///
    /// A queued job is removed from the queue and will never be dispatched.
    /// A running job's executor is asked to terminate the workload.
    pub async fn cancel(&self, id: Uuid) -> Result<CancelOutcome> {
        self.cancel_at(id, Utc::now()).await
    }

    async fn cancel_at(&self, id: Uuid, at: DateTime<Utc>) -> Result<CancelOutcome> {
        let job = self.get_job(id).await?;
        if job.is_terminal() {
            return Err(JobError::AlreadyTerminal {
                id,
                status: job.status,
            });
        }

        let updated = self
            .store
            .transition(
                id,
                &[JobStatus::Queued, JobStatus::Running],
                JobChange::cancelled(at),
            )
            .await?;

        if updated.is_none() {
            // Lost a race with another terminal transition
            let current = self.get_job(id).await?;
            return Err(JobError::AlreadyTerminal {
                id,
                status: current.status,
            });
        }

        let dequeued = self.queue.remove(id);
        let signalled = match self.running().remove(&id) {
            Some(handle) => {
                handle.token.cancel();
                true
            }
            None => false,
        };

        let previous = if dequeued {
            JobStatus::Queued
        } else if signalled {
            JobStatus::Running
        } else {
            job.status
        };

        tracing::info!(job_id = %id, previous = %previous, "Job cancelled");

        Ok(CancelOutcome {
            job_id: id,
            status: JobStatus::Cancelled,
            previous,
        })
    }

    /// Apply a status update reported from outside the orchestrator
    ///
    /// Returns the job as stored after the update.
    pub async fn apply_status_update(&self, id: Uuid, update: StatusUpdate) -> Result<Job> {
        let at = update.timestamp.unwrap_or_else(Utc::now);

        match update.status {
            JobStatus::Queued => Err(JobError::Validation(
                "a job cannot be moved back to queued".to_string(),
            )),
            JobStatus::Running => {
                let dispatch = self.mark_running_at(id, at).await?;
                // Removed from the queue so no executor picks it up as well
                self.queue.remove(id);
                Ok(dispatch.job)
            }
            JobStatus::Completed => {
                let output_path = update.output_path.ok_or_else(|| {
                    JobError::Validation("output_path is required for completed".to_string())
                })?;
                self.finish_from_update(id, TerminalOutcome::Completed { output_path }, at)
                    .await
            }
            JobStatus::Failed => {
                let error_message = update
                    .error_message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "job failed without error detail".to_string());
                self.finish_from_update(id, TerminalOutcome::Failed { error_message }, at)
                    .await
            }
            JobStatus::Cancelled => {
                self.cancel_at(id, at).await?;
                self.get_job(id).await
            }
        }
    }

    async fn finish_from_update(
        &self,
        id: Uuid,
        outcome: TerminalOutcome,
        at: DateTime<Utc>,
    ) -> Result<Job> {
        match self.mark_terminal_at(id, outcome, at).await? {
            Some(job) => Ok(job),
            None => self.get_job(id).await,
        }
    }

    /// Delete a finished job and its metrics
    pub async fn delete_job(&self, id: Uuid) -> Result<()> {
        let job = self.get_job(id).await?;
        if !job.is_terminal() {
            return Err(JobError::NotTerminal {
                id,
                status: job.status,
            });
        }

        if self.store.delete(id).await? {
            tracing::info!(job_id = %id, "Job deleted");
        }
        Ok(())
    }

    /// Pending jobs in dispatch order
    pub fn queue_snapshot(&self) -> Vec<QueueEntry> {
        self.queue.snapshot()
    }

    /// Drop the cancellation handle of a job that is no longer executing
    pub fn release(&self, id: Uuid) {
        self.running().remove(&id);
    }

    /// Rebuild the queue from the store after a restart
    ///
    /// Queued jobs are re-enqueued with their original priority and
    /// submission time. Jobs left running by a previous process have lost
    /// their executor and are marked failed.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let mut report = RecoveryReport::default();

        for job in self.store.find_by_status(JobStatus::Queued).await? {
            match self.queue.enqueue(job.id, job.priority, job.submitted_at) {
                Ok(()) => report.requeued += 1,
                Err(e) => tracing::warn!(job_id = %job.id, error = %e, "Skipping recovery of job"),
            }
        }

        for job in self.store.find_by_status(JobStatus::Running).await? {
            let outcome = TerminalOutcome::Failed {
                error_message: ORPHANED_JOB_ERROR.to_string(),
            };
            if self.mark_terminal(job.id, outcome).await?.is_some() {
                report.failed += 1;
            }
        }

        if report.requeued > 0 || report.failed > 0 {
            tracing::info!(
                requeued = report.requeued,
                failed = report.failed,
                "Recovered jobs from store"
            );
        }

        Ok(report)
    }

    /// Build a `InvalidTransition` or `NotFound` for a rejected transition
    async fn rejected(&self, id: Uuid, to: JobStatus) -> JobError {
        match self.store.find_by_id(id).await {
            Ok(Some(job)) => JobError::InvalidTransition {
                id,
                from: job.status,
                to,
            },
            Ok(None) => JobError::NotFound(id),
            Err(e) => e.into(),
        }
    }
}

// =============================================================================
// Validation
// =============================================================================

fn validate_submission(req: &CreateJob, limits: &SubmissionLimits) -> Result<()> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(JobError::Validation("name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(JobError::Validation(format!(
            "name too long (max: {} chars)",
            MAX_NAME_LENGTH
        )));
    }

    let config = req
        .config
        .as_object()
        .ok_or_else(|| JobError::Validation("config must be a JSON object".to_string()))?;

    let missing: Vec<&str> = limits
        .required_config_fields
        .iter()
        .filter(|field| !config.contains_key(field.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(JobError::Validation(format!(
            "config is missing required fields: {}",
            missing.join(", ")
        )));
    }

    if let Some(priority) = req.priority {
        check_range("priority", priority, limits.priority_min, limits.priority_max)?;
    }
    if let Some(gpu_count) = req.gpu_count {
        check_range("gpu_count", gpu_count, limits.gpu_count_min, limits.gpu_count_max)?;
    }
    if let Some(memory_gb) = req.memory_gb {
        check_range("memory_gb", memory_gb, limits.memory_gb_min, limits.memory_gb_max)?;
    }

    Ok(())
}

fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        return Err(JobError::Validation(format!(
            "{} must be between {} and {} (got {})",
            field, min, max, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryStore;

    fn service() -> (JobService, Arc<JobQueue>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(JobQueue::new());
        let service = JobService::new(store.clone(), queue.clone(), SubmissionLimits::default());
        (service, queue, store)
    }

    fn request(name: &str, priority: Option<i32>) -> CreateJob {
        CreateJob {
            name: name.to_string(),
            owner: Some("tester".to_string()),
            config: serde_json::json!({"model": "resnet50", "epochs": 3}),
            priority,
            gpu_count: None,
            memory_gb: None,
        }
    }

    #[tokio::test]
    async fn test_submit_persists_and_enqueues() {
        let (service, queue, _) = service();
        let job = service.submit(request("train", None)).await.unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, 5);
        assert_eq!(job.resources, ResourceRequest::default());
        assert!(queue.contains(job.id));
        assert_eq!(service.get_job(job.id).await.unwrap(), job);
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let (service, queue, _) = service();

        let cases = vec![
            request("", None),
            request("x", Some(11)),
            request("x", Some(-1)),
            CreateJob {
                config: serde_json::json!([1, 2, 3]),
                ..request("x", None)
            },
            CreateJob {
                gpu_count: Some(9),
                ..request("x", None)
            },
            CreateJob {
                memory_gb: Some(4),
                ..request("x", None)
            },
            request(&"n".repeat(256), None),
        ];

        for req in cases {
            let result = service.submit(req).await;
            assert!(matches!(result, Err(JobError::Validation(_))));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_required_config_fields() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(JobQueue::new());
        let limits = SubmissionLimits {
            required_config_fields: vec!["model".to_string(), "dataset".to_string()],
            ..SubmissionLimits::default()
        };
        let service = JobService::new(store, queue, limits);

        let err = service.submit(request("x", None)).await.unwrap_err();
        assert!(err.to_string().contains("dataset"));

        let ok = service
            .submit(CreateJob {
                config: serde_json::json!({"model": "m", "dataset": "d"}),
                ..request("x", None)
            })
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_dispatch_follows_priority() {
        let (service, queue, _) = service();
        let a = service.submit(request("a", Some(5))).await.unwrap();
        let b = service.submit(request("b", Some(9))).await.unwrap();

        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(b.id));
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(a.id));
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let (service, queue, _) = service();
        let job = service.submit(request("train", None)).await.unwrap();
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(job.id));

        let dispatch = service.mark_running(job.id).await.unwrap();
        assert_eq!(dispatch.job.status, JobStatus::Running);
        assert!(dispatch.job.started_at.is_some());

        let done = service
            .mark_terminal(
                job.id,
                TerminalOutcome::Completed {
                    output_path: "/jobs/out".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.output_path.as_deref(), Some("/jobs/out"));
        assert!(done.error_message.is_none());
        assert!(done.completed_at >= done.started_at);
    }

    #[tokio::test]
    async fn test_failed_records_error_detail() {
        let (service, _, _) = service();
        let job = service.submit(request("train", None)).await.unwrap();
        service.mark_running(job.id).await.unwrap();

        let failed = service
            .mark_terminal(
                job.id,
                TerminalOutcome::Failed {
                    error_message: "out of memory".to_string(),
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("out of memory"));
        assert!(failed.output_path.is_none());
    }

    #[tokio::test]
    async fn test_terminal_requires_running() {
        let (service, _, _) = service();
        let job = service.submit(request("train", None)).await.unwrap();

        let err = service
            .mark_terminal(
                job.id,
                TerminalOutcome::Completed {
                    output_path: "/out".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Completed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_terminal_states_are_final() {
        let (service, _, _) = service();
        let job = service.submit(request("train", None)).await.unwrap();
        service.mark_running(job.id).await.unwrap();
        service
            .mark_terminal(
                job.id,
                TerminalOutcome::Failed {
                    error_message: "boom".to_string(),
                },
            )
            .await
            .unwrap();

        let again = service
            .mark_terminal(
                job.id,
                TerminalOutcome::Completed {
                    output_path: "/out".to_string(),
                },
            )
            .await;
        assert!(matches!(again, Err(JobError::InvalidTransition { .. })));

        let cancel = service.cancel(job.id).await;
        assert!(matches!(
            cancel,
            Err(JobError::AlreadyTerminal {
                status: JobStatus::Failed,
                ..
            })
        ));

        let rerun = service.mark_running(job.id).await;
        assert!(matches!(rerun, Err(JobError::InvalidTransition { .. })));
        assert_eq!(service.get_job(job.id).await.unwrap().status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_cancel_queued_job_is_never_dispatched() {
        let (service, queue, _) = service();
        let job = service.submit(request("c", None)).await.unwrap();

        let outcome = service.cancel(job.id).await.unwrap();
        assert_eq!(outcome.previous, JobStatus::Queued);
        assert_eq!(outcome.status, JobStatus::Cancelled);

        assert!(!queue.contains(job.id));
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), None);

        let stored = service.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_between_dequeue_and_start() {
        let (service, queue, _) = service();
        let job = service.submit(request("c", None)).await.unwrap();
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(job.id));

        service.cancel(job.id).await.unwrap();

        let err = service.mark_running(job.id).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_running_fires_token_and_ignores_late_report() {
        let (service, _, _) = service();
        let job = service.submit(request("r", None)).await.unwrap();
        let dispatch = service.mark_running(job.id).await.unwrap();
        assert!(!dispatch.cancel.is_cancelled());

        let outcome = service.cancel(job.id).await.unwrap();
        assert_eq!(outcome.previous, JobStatus::Running);
        assert!(dispatch.cancel.is_cancelled());

        let late = service
            .mark_terminal(
                job.id,
                TerminalOutcome::Completed {
                    output_path: "/out".to_string(),
                },
            )
            .await
            .unwrap();
        assert!(late.is_none());

        let stored = service.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Cancelled);
        assert!(stored.output_path.is_none());
    }

    #[tokio::test]
    async fn test_cancel_twice_is_rejected() {
        let (service, _, _) = service();
        let job = service.submit(request("c", None)).await.unwrap();
        service.cancel(job.id).await.unwrap();

        let second = service.cancel(job.id).await;
        assert!(matches!(
            second,
            Err(JobError::AlreadyTerminal {
                status: JobStatus::Cancelled,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (service, _, _) = service();
        let id = Uuid::new_v4();
        assert!(matches!(service.get_job(id).await, Err(JobError::NotFound(_))));
        assert!(matches!(service.cancel(id).await, Err(JobError::NotFound(_))));
        assert!(matches!(service.mark_running(id).await, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_start_has_single_winner() {
        let (service, _, _) = service();
        let service = Arc::new(service);
        let job = service.submit(request("race", None)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move { service.mark_running(job.id).await }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_rejected_restart_keeps_cancel_handle() {
        let (service, _, _) = service();
        let job = service.submit(request("twice", None)).await.unwrap();
        let dispatch = service.mark_running(job.id).await.unwrap();

        let second = service.mark_running(job.id).await;
        assert!(matches!(
            second,
            Err(JobError::InvalidTransition {
                from: JobStatus::Running,
                to: JobStatus::Running,
                ..
            })
        ));

        let outcome = service.cancel(job.id).await.unwrap();
        assert_eq!(outcome.previous, JobStatus::Running);
        assert!(dispatch.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_running_status_update_on_running_job_keeps_cancel_handle() {
        let (service, _, _) = service();
        let job = service.submit(request("cb", None)).await.unwrap();
        let dispatch = service.mark_running(job.id).await.unwrap();

        let update = StatusUpdate {
            status: JobStatus::Running,
            timestamp: None,
            error_message: None,
            output_path: None,
        };
        assert!(service.apply_status_update(job.id, update).await.is_err());

        service.cancel(job.id).await.unwrap();
        assert!(dispatch.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_concurrent_start_winner_stays_cancellable() {
        let (service, _, _) = service();
        let service = Arc::new(service);
        let job = service.submit(request("race", None)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move { service.mark_running(job.id).await }));
        }

        let mut winner = None;
        for handle in handles {
            if let Ok(dispatch) = handle.await.unwrap() {
                winner = Some(dispatch);
            }
        }
        let winner = winner.unwrap();

        service.cancel(job.id).await.unwrap();
        assert!(winner.cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_status_update_callback() {
        let (service, queue, _) = service();
        let job = service.submit(request("cb", None)).await.unwrap();

        let running = service
            .apply_status_update(
                job.id,
                StatusUpdate {
                    status: JobStatus::Running,
                    timestamp: None,
                    error_message: None,
                    output_path: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert!(!queue.contains(job.id));

        let missing_output = service
            .apply_status_update(
                job.id,
                StatusUpdate {
                    status: JobStatus::Completed,
                    timestamp: None,
                    error_message: None,
                    output_path: None,
                },
            )
            .await;
        assert!(matches!(missing_output, Err(JobError::Validation(_))));

        let failed = service
            .apply_status_update(
                job.id,
                StatusUpdate {
                    status: JobStatus::Failed,
                    timestamp: None,
                    error_message: Some("diverged".to_string()),
                    output_path: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("diverged"));

        let back = service
            .apply_status_update(
                job.id,
                StatusUpdate {
                    status: JobStatus::Queued,
                    timestamp: None,
                    error_message: None,
                    output_path: None,
                },
            )
            .await;
        assert!(matches!(back, Err(JobError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_only_terminal_jobs() {
        let (service, _, _) = service();
        let job = service.submit(request("d", None)).await.unwrap();

        assert!(matches!(
            service.delete_job(job.id).await,
            Err(JobError::NotTerminal { .. })
        ));

        service.cancel(job.id).await.unwrap();
        service.delete_job(job.id).await.unwrap();
        assert!(matches!(service.get_job(job.id).await, Err(JobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_detail_reports_queue_position() {
        let (service, _, _) = service();
        let low = service.submit(request("low", Some(1))).await.unwrap();
        let high = service.submit(request("high", Some(9))).await.unwrap();

        let detail = service.get_job_detail(low.id).await.unwrap();
        assert_eq!(detail.queue_position, Some(1));
        let detail = service.get_job_detail(high.id).await.unwrap();
        assert_eq!(detail.queue_position, Some(0));

        let pending: Vec<Uuid> = service.queue_snapshot().iter().map(|e| e.job_id).collect();
        assert_eq!(pending, vec![high.id, low.id]);
    }

    #[tokio::test]
    async fn test_recover_requeues_and_fails_orphans() {
        let store = Arc::new(MemoryStore::new());
        let first = JobService::new(
            store.clone(),
            Arc::new(JobQueue::new()),
            SubmissionLimits::default(),
        );
        let waiting = first.submit(request("waiting", Some(2))).await.unwrap();
        let urgent = first.submit(request("urgent", Some(8))).await.unwrap();
        let orphan = first.submit(request("orphan", None)).await.unwrap();
        first.mark_running(orphan.id).await.unwrap();

        // A fresh process: same store, empty queue
        let queue = Arc::new(JobQueue::new());
        let second = JobService::new(store, queue.clone(), SubmissionLimits::default());
        let report = second.recover().await.unwrap();

        assert_eq!(report, RecoveryReport { requeued: 2, failed: 1 });
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(urgent.id));
        assert_eq!(queue.try_dequeue().map(|e| e.job_id), Some(waiting.id));

        let orphan = second.get_job(orphan.id).await.unwrap();
        assert_eq!(orphan.status, JobStatus::Failed);
        assert_eq!(orphan.error_message.as_deref(), Some(ORPHANED_JOB_ERROR));
    }
}
