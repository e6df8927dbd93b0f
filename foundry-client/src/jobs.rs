//! Job-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use foundry_core::domain::job::Job;
use foundry_core::dto::job::{
    CancelOutcome, CreateJob, JobDetail, JobListQuery, QueueEntry, StatusUpdate,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Submission and Queries
    // =============================================================================

    /// Submit a new job
    ///
    /// # Arguments
    /// * `req` - The job submission
    ///
    /// # Returns
    /// The created job, in status `queued`
    pub async fn submit_job(&self, req: CreateJob) -> Result<Job> {
        let url = format!("{}/job", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Get a job by ID
    ///
    /// # Returns
    /// The job with its queue position while it is queued
    pub async fn get_job(&self, job_id: Uuid) -> Result<JobDetail> {
        let url = format!("{}/job/{}", self.base_url, job_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// List jobs, newest first
    ///
    /// # Arguments
    /// * `query` - Optional status and owner filters plus pagination
    pub async fn list_jobs(&self, query: &JobListQuery) -> Result<Vec<Job>> {
        let url = format!("{}/job/list", self.base_url);
        let response = self.client.get(&url).query(query).send().await?;

        self.handle_response(response).await
    }

    /// Pending jobs in the order they will be dispatched
    pub async fn queue(&self) -> Result<Vec<QueueEntry>> {
        let url = format!("{}/queue", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Cancel a queued or running job
    ///
    /// Fails with a conflict (see [`crate::ClientError::is_conflict`]) when
    /// the job already finished.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<CancelOutcome> {
        let url = format!("{}/job/{}/cancel", self.base_url, job_id);
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// Delete a finished job together with its metrics
    pub async fn delete_job(&self, job_id: Uuid) -> Result<()> {
        let url = format!("{}/job/{}", self.base_url, job_id);
        let response = self.client.delete(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Report a status change for a job
    ///
    /// # Returns
    /// The job as stored after the update
    pub async fn update_job_status(&self, job_id: Uuid, update: StatusUpdate) -> Result<Job> {
        let url = format!("{}/job/{}/status", self.base_url, job_id);
        let response = self.client.post(&url).json(&update).send().await?;

        self.handle_response(response).await
    }
}
