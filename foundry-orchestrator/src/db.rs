use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create jobs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id UUID PRIMARY KEY,
            name VARCHAR(255) NOT NULL,
            owner VARCHAR(255),
            config JSONB NOT NULL DEFAULT '{}',
            priority INTEGER NOT NULL,
            status VARCHAR(20) NOT NULL,
            gpu_count INTEGER NOT NULL,
            memory_gb INTEGER NOT NULL,
            submitted_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            error_message TEXT,
            output_path TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create metrics table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS job_metrics (
            id BIGSERIAL PRIMARY KEY,
            job_id UUID NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
            metric_name VARCHAR(100) NOT NULL,
            step BIGINT NOT NULL,
            metric_value DOUBLE PRECISION NOT NULL,
            timestamp TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_submitted_at ON jobs(submitted_at DESC)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_job_metrics_series ON job_metrics(job_id, metric_name, timestamp)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
