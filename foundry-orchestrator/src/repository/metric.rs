//! Metric Repository
//!
//! PostgreSQL implementation of [`MetricStore`].

use async_trait::async_trait;
use foundry_core::domain::metric::MetricPoint;
use uuid::Uuid;

use super::{MetricStore, PgStore, StoreResult};

#[async_trait]
impl MetricStore for PgStore {
    async fn append(&self, points: &[MetricPoint]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        for point in points {
            sqlx::query(
                r#"
                INSERT INTO job_metrics (job_id, metric_name, step, metric_value, timestamp)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(point.job_id)
            .bind(&point.name)
            .bind(point.step)
            .bind(point.value)
            .bind(point.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_job(&self, job_id: Uuid, name: Option<&str>) -> StoreResult<Vec<MetricPoint>> {
        let rows = sqlx::query_as::<_, MetricRow>(
            r#"
            SELECT job_id, metric_name, step, metric_value, timestamp
            FROM job_metrics
            WHERE job_id = $1 AND ($2::VARCHAR IS NULL OR metric_name = $2)
            ORDER BY timestamp ASC, step ASC, id ASC
            "#,
        )
        .bind(job_id)
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct MetricRow {
    job_id: Uuid,
    metric_name: String,
    step: i64,
    metric_value: f64,
    timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<MetricRow> for MetricPoint {
    fn from(row: MetricRow) -> Self {
        MetricPoint {
            job_id: row.job_id,
            name: row.metric_name,
            step: row.step,
            value: row.metric_value,
            timestamp: row.timestamp,
        }
    }
}
