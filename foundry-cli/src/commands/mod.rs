//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod job;
mod metrics;

pub use job::JobCommands;
pub use metrics::MetricsCommands;

use anyhow::Result;
use clap::Subcommand;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Job management
    Job {
        #[command(subcommand)]
        command: JobCommands,
    },
    /// Job metrics
    Metrics {
        #[command(subcommand)]
        command: MetricsCommands,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Job { command } => job::handle_job_command(command, config).await,
        Commands::Metrics { command } => metrics::handle_metrics_command(command, config).await,
    }
}
