//! Job command handlers
//!
//! Handles all job-related CLI commands: submission, listing,
//! viewing details, cancellation and deletion.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use colored::*;
use foundry_client::OrchestratorClient;
use foundry_core::domain::job::{Job, JobStatus};
use foundry_core::dto::job::{CreateJob, JobDetail, JobListQuery};

use crate::config::Config;
use crate::id_resolver::resolve_job_id;
use crate::types::IdOrPrefix;

/// Job subcommands
#[derive(Subcommand)]
pub enum JobCommands {
    /// Submit a new job
    Submit {
        /// Job name
        #[arg(long)]
        name: String,

        /// Job configuration as inline JSON, or @path to a JSON file
        #[arg(long)]
        config: String,

        /// Priority, higher runs first
        #[arg(long)]
        priority: Option<i32>,

        /// Number of GPUs requested
        #[arg(long)]
        gpus: Option<u32>,

        /// Memory requested in GB
        #[arg(long)]
        memory_gb: Option<u32>,

        /// Owner of the job
        #[arg(long)]
        owner: Option<String>,
    },
    /// List jobs, newest first
    List {
        /// Only jobs in this status
        #[arg(long)]
        status: Option<JobStatus>,

        /// Only jobs of this owner
        #[arg(long)]
        owner: Option<String>,

        /// Maximum number of jobs to show
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Get job details
    Get {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Cancel a queued or running job
    Cancel {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Delete a finished job and its metrics
    Delete {
        /// Job ID or unambiguous prefix
        id: String,
    },
    /// Show pending jobs in dispatch order
    Queue,
}

/// Handle job commands
///
/// Routes job subcommands to their respective handlers.
pub async fn handle_job_command(command: JobCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        JobCommands::Submit {
            name,
            config,
            priority,
            gpus,
            memory_gb,
            owner,
        } => {
            let req = CreateJob {
                name,
                owner,
                config: parse_job_config(&config)?,
                priority,
                gpu_count: gpus,
                memory_gb,
            };
            submit_job(&client, req).await
        }
        JobCommands::List {
            status,
            owner,
            limit,
        } => {
            let query = JobListQuery {
                status,
                owner,
                offset: None,
                limit: Some(limit),
            };
            list_jobs(&client, &query).await
        }
        JobCommands::Get { id } => get_job(&client, &id).await,
        JobCommands::Cancel { id } => cancel_job(&client, &id).await,
        JobCommands::Delete { id } => delete_job(&client, &id).await,
        JobCommands::Queue => show_queue(&client).await,
    }
}

/// Submit a job
async fn submit_job(client: &OrchestratorClient, req: CreateJob) -> Result<()> {
    let job = client
        .submit_job(req)
        .await
        .context("Failed to submit job")?;

    println!("{}", "✓ Job submitted".green().bold());
    println!("  ID:       {}", job.id.to_string().cyan());
    println!("  Name:     {}", job.name);
    println!("  Priority: {}", job.priority);
    println!("  Status:   {}", colorize_status(&job.status));

    Ok(())
}

/// List jobs
async fn list_jobs(client: &OrchestratorClient, query: &JobListQuery) -> Result<()> {
    let jobs = client.list_jobs(query).await?;

    if jobs.is_empty() {
        println!("{}", "No jobs found.".yellow());
    } else {
        println!("{}", format!("Found {} job(s):", jobs.len()).bold());
        println!();
        for job in jobs {
            print_job_summary(&job);
        }
    }

    Ok(())
}

/// Get and display a single job
async fn get_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;

    let detail = client.get_job(uuid).await?;

    print_job_details(&detail);

    Ok(())
}

/// Cancel a job
async fn cancel_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;

    match client.cancel_job(uuid).await {
        Ok(outcome) => {
            println!(
                "{} Job {} cancelled (was {})",
                "✓".green(),
                uuid.to_string().cyan(),
                outcome.previous
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            println!("{} {}", "⚠".yellow(), "Job already finished".yellow());
            Ok(())
        }
        Err(e) => Err(e).context("Failed to cancel job"),
    }
}

/// Delete a job
async fn delete_job(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_job_id(client, &IdOrPrefix::parse(id)).await?;

    client
        .delete_job(uuid)
        .await
        .context("Failed to delete job")?;

    println!("{} Job {} deleted", "✓".green(), uuid.to_string().cyan());

    Ok(())
}

/// Show the pending queue
async fn show_queue(client: &OrchestratorClient) -> Result<()> {
    let entries = client.queue().await?;

    if entries.is_empty() {
        println!("{}", "Queue is empty.".yellow());
        return Ok(());
    }

    println!("{}", format!("{} job(s) waiting:", entries.len()).bold());
    for (position, entry) in entries.iter().enumerate() {
        println!(
            "  {:>3}. {}  priority {:>3}  {}",
            position + 1,
            entry.job_id.to_string().cyan(),
            entry.priority,
            entry
                .submitted_at
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed()
        );
    }

    Ok(())
}

/// Parse `--config`: inline JSON, or `@path` to read it from a file
fn parse_job_config(arg: &str) -> Result<serde_json::Value> {
    let raw = match arg.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?,
        None => arg.to_string(),
    };

    let value: serde_json::Value =
        serde_json::from_str(&raw).context("Job config is not valid JSON")?;

    if !value.is_object() {
        bail!("Job config must be a JSON object");
    }

    Ok(value)
}

/// Print a job summary from a full Job object
fn print_job_summary(job: &Job) {
    let status_colored = colorize_status(&job.status);

    println!("  {} Job {}", "▸".cyan(), job.id.to_string().dimmed());
    println!("    Name:      {}", job.name);
    println!("    Status:    {}", status_colored);
    println!("    Priority:  {}", job.priority);
    println!(
        "    Submitted: {}",
        job.submitted_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(owner) = &job.owner {
        println!("    Owner:     {}", owner.dimmed());
    }
    println!();
}

/// Print detailed job information
fn print_job_details(detail: &JobDetail) {
    let job = &detail.job;
    let status_colored = colorize_status(&job.status);

    println!("{}", "Job Details:".bold());
    println!("  ID:          {}", job.id.to_string().cyan());
    println!("  Name:        {}", job.name);
    println!("  Status:      {}", status_colored);
    println!("  Priority:    {}", job.priority);
    println!(
        "  Resources:   {} GPU(s), {} GB",
        job.resources.gpu_count, job.resources.memory_gb
    );
    if let Some(owner) = &job.owner {
        println!("  Owner:       {}", owner);
    }
    if let Some(position) = detail.queue_position {
        println!("  Queue:       position {}", position);
    }
    println!(
        "  Submitted:   {}",
        job.submitted_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = job.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = job.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        // Calculate duration
        if let Some(started) = job.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    if let Some(output) = &job.output_path {
        println!("  Output:      {}", output.green());
    }

    println!("\n{}", "Config:".bold());
    match serde_json::to_string_pretty(&job.config) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{:?}", job.config),
    }

    if let Some(error) = &job.error_message {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }
}

/// Colorize job status for display
fn colorize_status(status: &JobStatus) -> colored::ColoredString {
    let status_str = status.to_string();
    match status {
        JobStatus::Queued => status_str.yellow(),
        JobStatus::Running => status_str.cyan(),
        JobStatus::Completed => status_str.green(),
        JobStatus::Failed => status_str.red(),
        JobStatus::Cancelled => status_str.dimmed(),
    }
}
