use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod executor;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod shutdown;

use config::Config;
use repository::{JobStore, MemoryStore, MetricStore, PgStore};
use scheduler::JobQueue;
use service::job_service::JobService;
use service::metric_service::MetricService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "foundry_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Foundry Orchestrator...");

    let config = load_config()?;
    tracing::info!(
        "Configuration loaded: {} worker slot(s), workload '{}', workspace {}",
        config.worker_slots,
        config.workload_program,
        config.workspace_dir.display()
    );

    let (job_store, metric_store) = open_store(&config).await?;

    let queue = Arc::new(JobQueue::new());
    let jobs = Arc::new(JobService::new(
        Arc::clone(&job_store),
        Arc::clone(&queue),
        config.limits.clone(),
    ));
    let metrics = Arc::new(MetricService::new(job_store, metric_store));

    // Rebuild the queue before anything can dequeue from it
    let report = jobs
        .recover()
        .await
        .context("Failed to recover jobs from store")?;
    tracing::info!(
        "Recovery complete: {} requeued, {} orphaned job(s) failed",
        report.requeued,
        report.failed
    );

    let shutdown = shutdown::install_shutdown_handler();

    let workers =
        executor::spawn_executors(&config, Arc::clone(&jobs), queue, shutdown.clone());
    tracing::info!("Started {} executor(s)", workers.len());

    // Build router with all API endpoints
    let app = api::create_router(api::AppState { jobs, metrics });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await
        .context("HTTP server error")?;

    // Stop the executors too if the server ended on its own
    shutdown.cancel();

    tracing::info!("Waiting for executors to finish running jobs...");
    for worker in workers {
        if let Err(e) = worker.await {
            tracing::warn!("Executor task panicked: {}", e);
        }
    }

    tracing::info!("Foundry Orchestrator stopped");
    Ok(())
}

/// Loads and validates configuration from the environment
fn load_config() -> anyhow::Result<Config> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Opens the PostgreSQL store when configured, the in-memory store otherwise
async fn open_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn JobStore>, Arc<dyn MetricStore>)> {
    let Some(database_url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory store; jobs will not survive a restart");
        let store = Arc::new(MemoryStore::new());
        return Ok((
            Arc::clone(&store) as Arc<dyn JobStore>,
            store as Arc<dyn MetricStore>,
        ));
    };

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(PgStore::new(pool));
    Ok((
        Arc::clone(&store) as Arc<dyn JobStore>,
        store as Arc<dyn MetricStore>,
    ))
}
