//! Metric-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use foundry_core::domain::metric::MetricPoint;
use foundry_core::dto::metric::{MetricQuery, MetricsResponse, RecordMetric};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct BatchRecorded {
    recorded: usize,
}

impl OrchestratorClient {
    /// Record one metric point for a running job
    pub async fn record_metric(&self, job_id: Uuid, metric: RecordMetric) -> Result<MetricPoint> {
        let url = format!("{}/job/{}/metrics", self.base_url, job_id);
        let response = self.client.post(&url).json(&metric).send().await?;

        self.handle_response(response).await
    }

    /// Record several metric points in one request
    ///
    /// # Returns
    /// The number of points stored
    pub async fn record_metrics(&self, job_id: Uuid, metrics: Vec<RecordMetric>) -> Result<usize> {
        if metrics.is_empty() {
            return Ok(0);
        }

        tracing::debug!("Sending {} metric points for job {}", metrics.len(), job_id);

        let url = format!("{}/job/{}/metrics/batch", self.base_url, job_id);
        let response = self.client.post(&url).json(&metrics).send().await?;

        let recorded: BatchRecorded = self.handle_response(response).await?;
        Ok(recorded.recorded)
    }

    /// Get the metric series of a job
    ///
    /// # Arguments
    /// * `job_id` - The job UUID
    /// * `metric_name` - Only return this series when set
    pub async fn get_metrics(
        &self,
        job_id: Uuid,
        metric_name: Option<&str>,
    ) -> Result<MetricsResponse> {
        let url = format!("{}/job/{}/metrics", self.base_url, job_id);
        let query = MetricQuery {
            metric_name: metric_name.map(String::from),
        };
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Json, Router,
        extract::{Path, Query},
        http::StatusCode,
        routing::post,
    };
    use chrono::Utc;
    use foundry_core::domain::metric::MetricSample;
    use std::collections::BTreeMap;

    /// Serves a fake orchestrator on an ephemeral port
    async fn serve(router: Router) -> OrchestratorClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        OrchestratorClient::new(format!("http://{}", addr))
    }

    fn loss(step: i64, value: f64) -> RecordMetric {
        RecordMetric {
            step,
            metric_name: "loss".to_string(),
            metric_value: value,
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_record_metric_posts_point() {
        let router = Router::new().route(
            "/job/{id}/metrics",
            post(
                |Path(id): Path<Uuid>, Json(metric): Json<RecordMetric>| async move {
                    let point = MetricPoint {
                        job_id: id,
                        name: metric.metric_name,
                        step: metric.step,
                        value: metric.metric_value,
                        timestamp: Utc::now(),
                    };
                    (StatusCode::CREATED, Json(point))
                },
            ),
        );
        let client = serve(router).await;

        let job_id = Uuid::new_v4();
        let point = client.record_metric(job_id, loss(7, 0.25)).await.unwrap();
        assert_eq!(point.job_id, job_id);
        assert_eq!(point.name, "loss");
        assert_eq!(point.step, 7);
        assert_eq!(point.value, 0.25);
    }

    #[tokio::test]
    async fn test_record_metric_validation_error() {
        let router = Router::new().route(
            "/job/{id}/metrics",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "step must be non-negative"})),
                )
            }),
        );
        let client = serve(router).await;

        let err = client
            .record_metric(Uuid::new_v4(), loss(-1, 0.5))
            .await
            .unwrap_err();
        assert!(err.is_client_error());
        assert!(err.to_string().contains("non-negative"));
    }

    #[tokio::test]
    async fn test_record_metrics_returns_count() {
        let router = Router::new().route(
            "/job/{id}/metrics/batch",
            post(|Json(metrics): Json<Vec<RecordMetric>>| async move {
                (
                    StatusCode::CREATED,
                    Json(serde_json::json!({"recorded": metrics.len()})),
                )
            }),
        );
        let client = serve(router).await;

        let recorded = client
            .record_metrics(Uuid::new_v4(), vec![loss(1, 0.9), loss(2, 0.8), loss(3, 0.7)])
            .await
            .unwrap();
        assert_eq!(recorded, 3);
    }

    #[tokio::test]
    async fn test_empty_batch_sends_nothing() {
        // No routes: any request would fail with 404
        let client = serve(Router::new()).await;
        assert_eq!(client.record_metrics(Uuid::new_v4(), Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_metrics_sends_name_filter() {
        let router = Router::new().route(
            "/job/{id}/metrics",
            axum::routing::get(
                |Path(id): Path<Uuid>, Query(query): Query<MetricQuery>| async move {
                    let name = query.metric_name.unwrap_or_else(|| "all".to_string());
                    let mut metrics = BTreeMap::new();
                    metrics.insert(
                        name,
                        vec![MetricSample {
                            step: 1,
                            value: 0.5,
                            timestamp: Utc::now(),
                        }],
                    );
                    Json(MetricsResponse { job_id: id, metrics })
                },
            ),
        );
        let client = serve(router).await;

        let job_id = Uuid::new_v4();
        let filtered = client.get_metrics(job_id, Some("accuracy")).await.unwrap();
        assert_eq!(filtered.job_id, job_id);
        assert!(filtered.metrics.contains_key("accuracy"));

        let all = client.get_metrics(job_id, None).await.unwrap();
        assert!(all.metrics.contains_key("all"));
    }

    #[tokio::test]
    async fn test_get_metrics_unknown_job() {
        let router = Router::new().route(
            "/job/{id}/metrics",
            axum::routing::get(|| async {
                (
                    StatusCode::NOT_FOUND,
                    Json(serde_json::json!({"error": "job not found"})),
                )
            }),
        );
        let client = serve(router).await;

        let err = client.get_metrics(Uuid::new_v4(), None).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
