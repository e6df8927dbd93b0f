//! Job Repository
//!
//! PostgreSQL implementation of [`JobStore`].

use async_trait::async_trait;
use foundry_core::domain::job::{Job, JobStatus, ResourceRequest};
use foundry_core::dto::job::JobListQuery;
use uuid::Uuid;

use super::{DEFAULT_LIST_LIMIT, JobChange, JobStore, PgStore, StoreError, StoreResult};

const JOB_COLUMNS: &str = r#"
    id, name, owner, config, priority, status, gpu_count, memory_gb,
    submitted_at, started_at, completed_at, error_message, output_path
"#;

#[async_trait]
impl JobStore for PgStore {
    async fn insert(&self, job: &Job) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, name, owner, config, priority, status, gpu_count, memory_gb, submitted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(&job.owner)
        .bind(&job.config)
        .bind(job.priority)
        .bind(job.status.as_str())
        .bind(to_db_int(job.resources.gpu_count, "gpu_count")?)
        .bind(to_db_int(job.resources.memory_gb, "memory_gb")?)
        .bind(job.submitted_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_by_status(&self, status: JobStatus) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = $1 ORDER BY submitted_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn list(&self, query: &JobListQuery) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM jobs
            WHERE ($1::VARCHAR IS NULL OR status = $1)
              AND ($2::VARCHAR IS NULL OR owner = $2)
            ORDER BY submitted_at DESC
            OFFSET $3 LIMIT $4
            "#
        ))
        .bind(query.status.map(JobStatus::as_str))
        .bind(&query.owner)
        .bind(i64::from(query.offset.unwrap_or(0)))
        .bind(i64::from(query.limit.unwrap_or(DEFAULT_LIST_LIMIT)))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[JobStatus],
        change: JobChange,
    ) -> StoreResult<Option<Job>> {
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

        // The status guard in the WHERE clause makes this a compare-and-set
        let row = sqlx::query_as::<_, JobRow>(&format!(
            r#"
            UPDATE jobs
            SET status = $1,
                started_at = COALESCE(started_at, $2),
                completed_at = COALESCE(
                    completed_at,
                    CASE WHEN $3::TIMESTAMPTZ IS NULL THEN NULL ELSE GREATEST($3, started_at) END
                ),
                error_message = COALESCE($4, error_message),
                output_path = COALESCE($5, output_path)
            WHERE id = $6 AND status = ANY($7)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(change.status.as_str())
        .bind(change.started_at)
        .bind(change.completed_at)
        .bind(change.error_message)
        .bind(change.output_path)
        .bind(id)
        .bind(&from)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn to_db_int(value: u32, field: &str) -> StoreResult<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("{} out of range: {}", field, value)))
}

fn from_db_int(value: i32, field: &str) -> StoreResult<u32> {
    u32::try_from(value)
        .map_err(|_| StoreError::InvalidRecord(format!("negative {}: {}", field, value)))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    name: String,
    owner: Option<String>,
    config: serde_json::Value,
    priority: i32,
    status: String,
    gpu_count: i32,
    memory_gb: i32,
    submitted_at: chrono::DateTime<chrono::Utc>,
    started_at: Option<chrono::DateTime<chrono::Utc>>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    error_message: Option<String>,
    output_path: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<JobStatus>()
            .map_err(StoreError::InvalidRecord)?;

        Ok(Job {
            id: row.id,
            name: row.name,
            owner: row.owner,
            config: row.config,
            priority: row.priority,
            status,
            resources: ResourceRequest {
                gpu_count: from_db_int(row.gpu_count, "gpu_count")?,
                memory_gb: from_db_int(row.memory_gb, "memory_gb")?,
            },
            submitted_at: row.submitted_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
            output_path: row.output_path,
        })
    }
}
