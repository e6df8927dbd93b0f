//! Foundry CLI
//!
//! Command-line interface for interacting with the Foundry orchestrator.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "foundry")]
#[command(about = "Foundry job scheduler CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(
        long,
        env = "FOUNDRY_ORCHESTRATOR_URL",
        default_value = "http://localhost:8080"
    )]
    orchestrator_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        orchestrator_url: cli.orchestrator_url,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "foundry",
            "--orchestrator-url",
            "http://orchestrator:8080",
            "job",
            "submit",
            "--name",
            "resnet",
            "--config",
            r#"{"epochs": 3}"#,
            "--priority",
            "9",
        ])
        .unwrap();
        assert_eq!(cli.orchestrator_url, "http://orchestrator:8080");
        assert!(matches!(cli.command, Commands::Job { .. }));
    }

    #[test]
    fn test_parse_queue() {
        let cli = Cli::try_parse_from(["foundry", "job", "queue"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Job {
                command: commands::JobCommands::Queue
            }
        ));
    }
}
