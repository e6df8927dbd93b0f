//! Metrics command handlers
//!
//! Shows a job's metric series and lets a running workload report points.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use foundry_client::OrchestratorClient;
use foundry_core::dto::metric::RecordMetric;
use uuid::Uuid;

use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::IdOrPrefix;

/// Metrics subcommands
#[derive(Subcommand)]
pub enum MetricsCommands {
    /// Show the metric series of a job
    Show {
        /// Job ID or unambiguous prefix
        id: String,

        /// Only this metric
        #[arg(long)]
        name: Option<String>,
    },
    /// Report a metric point (meant to be called from inside a workload)
    Report {
        /// Training step
        #[arg(long)]
        step: i64,

        /// Metric name
        #[arg(long)]
        name: String,

        /// Metric value
        #[arg(long)]
        value: f64,

        /// Job ID
        #[arg(long, env = "FOUNDRY_JOB_ID")]
        job: Uuid,

        /// Orchestrator callback URL, overrides --orchestrator-url
        #[arg(long, env = "FOUNDRY_CALLBACK_URL")]
        url: Option<String>,
    },
}

/// Handle metrics commands
pub async fn handle_metrics_command(command: MetricsCommands, config: &Config) -> Result<()> {
    match command {
        MetricsCommands::Show { id, name } => {
            show_metrics(&config.client(), &id, name.as_deref()).await
        }
        MetricsCommands::Report {
            step,
            name,
            value,
            job,
            url,
        } => {
            let client = match url {
                Some(url) => OrchestratorClient::new(url),
                None => config.client(),
            };
            let metric = RecordMetric {
                step,
                metric_name: name,
                metric_value: value,
                timestamp: None,
            };
            report_metric(&client, job, metric).await
        }
    }
}

/// Display a job's metric series
async fn show_metrics(client: &OrchestratorClient, id: &str, name: Option<&str>) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;

    let response = client.get_metrics(uuid, name).await?;

    if response.metrics.values().all(Vec::is_empty) {
        println!("{}", "No metrics recorded for this job.".yellow());
        return Ok(());
    }

    println!("{}", format!("Metrics for job {}:", uuid).bold());
    for (metric, samples) in &response.metrics {
        println!();
        println!("  {} {} ({} points)", "▸".cyan(), metric.bold(), samples.len());
        println!("{}", format!("    {:>8}  {:>14}  {}", "step", "value", "time").dimmed());
        for sample in samples {
            println!(
                "    {:>8}  {:>14.6}  {}",
                sample.step,
                sample.value,
                sample.timestamp.format("%H:%M:%S%.3f").to_string().dimmed()
            );
        }
    }

    Ok(())
}

/// Send one metric point
async fn report_metric(client: &OrchestratorClient, job: Uuid, metric: RecordMetric) -> Result<()> {
    let point = client
        .record_metric(job, metric)
        .await
        .context("Failed to report metric")?;

    println!(
        "{} {} = {} (step {})",
        "✓".green(),
        point.name.cyan(),
        point.value,
        point.step
    );

    Ok(())
}
