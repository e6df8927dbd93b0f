//! Executor loop
//!
//! Each executor serves one job at a time: dequeue, re-check the stored
//! status, start, run the workload, report the outcome. A failure while
//! running one job becomes that job's `failed` outcome and never stops
//! the loop.

use foundry_core::domain::job::{Job, JobStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ExecutorSettings;
use super::process::{self, ExecutionError, ProcessExit};
use super::workspace::Workspace;
use crate::scheduler::{JobQueue, QueueEntry};
use crate::service::job::{Dispatch, JobError, JobService, TerminalOutcome};

/// Reads of a dequeued job before it is put back in the queue
const LOAD_ATTEMPTS: u32 = 3;

/// Delay before the first retry; doubled after each attempt
const LOAD_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct Executor {
    slot: usize,
    jobs: Arc<JobService>,
    queue: Arc<JobQueue>,
    settings: Arc<ExecutorSettings>,
}

impl Executor {
    pub fn new(
        slot: usize,
        jobs: Arc<JobService>,
        queue: Arc<JobQueue>,
        settings: Arc<ExecutorSettings>,
    ) -> Self {
        Self {
            slot,
            jobs,
            queue,
            settings,
        }
    }

    /// Runs until `shutdown` is cancelled
    ///
    /// Shutdown is observed between jobs; a job in progress runs to the end.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            slot = self.slot,
            "Executor started (poll timeout: {:?})", self.settings.poll_timeout
        );

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                next = self.queue.dequeue(self.settings.poll_timeout) => next,
            };

            match next {
                Some(entry) => self.run_one(entry).await,
                None => debug!(slot = self.slot, "No jobs available"),
            }
        }

        info!(slot = self.slot, "Executor stopped");
    }

    /// Handles one dequeued job from status check to terminal report
    pub async fn run_one(&self, entry: QueueEntry) {
        let Some(dispatch) = self.start(&entry).await else {
            return;
        };

        let job_id = dispatch.job.id;
        match self.execute(&dispatch).await {
            Ok(ProcessExit::Cancelled) => {
                info!(job_id = %job_id, "Workload stopped after cancellation");
            }
            Ok(ProcessExit::TimedOut) => {
                warn!(
                    job_id = %job_id,
                    "Job exceeded timeout of {:?}, cancelling",
                    self.settings.job_timeout.unwrap_or_default()
                );
                if let Err(e) = self.jobs.cancel(job_id).await {
                    error!(job_id = %job_id, error = %e, "Failed to cancel timed out job");
                }
            }
            Ok(exit) => {
                let outcome = if exit.success() {
                    TerminalOutcome::Completed {
                        output_path: Workspace::for_job(&self.settings.workspace_dir, &dispatch.job)
                            .output_location(),
                    }
                } else {
                    TerminalOutcome::Failed {
                        error_message: exit.failure_detail(),
                    }
                };
                self.report(job_id, outcome).await;
            }
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Job execution failed");
                self.report(
                    job_id,
                    TerminalOutcome::Failed {
                        error_message: e.to_string(),
                    },
                )
                .await;
            }
        }

        self.jobs.release(job_id);
    }

    /// Re-checks the stored status and moves the job to running
    ///
    /// Returns `None` when the job must not run, e.g. it was cancelled
    /// after being queued. A job that cannot be read or started because of
    /// a store failure goes back into the queue.
    async fn start(&self, entry: &QueueEntry) -> Option<Dispatch> {
        let job_id = entry.job_id;
        let job = self.load(entry).await?;

        if job.status != JobStatus::Queued {
            debug!(job_id = %job_id, status = %job.status, "Discarding job that is no longer queued");
            return None;
        }

        match self.jobs.mark_running(job_id).await {
            Ok(dispatch) => Some(dispatch),
            Err(JobError::InvalidTransition { from, .. }) => {
                debug!(job_id = %job_id, status = %from, "Lost race for job, discarding");
                None
            }
            Err(JobError::NotFound(_)) => None,
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Failed to start job, requeueing");
                self.requeue(entry);
                None
            }
        }
    }

    /// Reads a dequeued job, retrying store failures with backoff
    async fn load(&self, entry: &QueueEntry) -> Option<Job> {
        let job_id = entry.job_id;
        let mut delay = LOAD_RETRY_DELAY;

        for attempt in 1..=LOAD_ATTEMPTS {
            match self.jobs.get_job(job_id).await {
                Ok(job) => return Some(job),
                Err(JobError::NotFound(_)) => {
                    warn!(job_id = %job_id, "Dequeued job no longer exists");
                    return None;
                }
                Err(e) if attempt < LOAD_ATTEMPTS => {
                    warn!(
                        job_id = %job_id,
                        error = %e,
                        attempt,
                        "Failed to load dequeued job, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Failed to load dequeued job, requeueing");
                }
            }
        }

        self.requeue(entry);
        None
    }

    async fn execute(&self, dispatch: &Dispatch) -> Result<ProcessExit, ExecutionError> {
        let workspace = Workspace::prepare(&self.settings.workspace_dir, &dispatch.job).await?;

        info!(
            slot = self.slot,
            job_id = %dispatch.job.id,
            "Running workload {}",
            self.settings.workload_program
        );

        process::run_workload(&self.settings, dispatch.job.id, &workspace, &dispatch.cancel).await
    }

    async fn report(&self, job_id: Uuid, outcome: TerminalOutcome) {
        match self.jobs.mark_terminal(job_id, outcome).await {
            Ok(Some(job)) => debug!(job_id = %job_id, status = %job.status, "Reported outcome"),
            // Cancelled while running; the controller already logged it
            Ok(None) => {}
            Err(e) => error!(job_id = %job_id, error = %e, "Failed to report job outcome"),
        }
    }

    fn requeue(&self, entry: &QueueEntry) {
        if let Err(e) = self.queue.requeue(entry) {
            error!(job_id = %entry.job_id, error = %e, "Failed to requeue job");
        }
    }
}
