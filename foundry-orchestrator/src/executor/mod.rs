//! Executor Module
//!
//! Worker loops that take jobs off the priority queue and run the workload
//! for each one as a subprocess.
//!
//! Structure:
//! - `poller`: the dequeue / start / run / report loop
//! - `process`: subprocess launch, wait and stderr capture
//! - `workspace`: per-job working directory

pub mod poller;
pub mod process;
pub mod workspace;

pub use poller::Executor;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::scheduler::JobQueue;
use crate::service::job::JobService;

/// Settings shared by all executor instances
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub workspace_dir: PathBuf,
    pub workload_program: String,
    pub workload_args: Vec<String>,
    /// Base URL handed to the workload for metric and status callbacks
    pub callback_url: String,
    pub poll_timeout: Duration,
    pub job_timeout: Option<Duration>,
}

impl From<&Config> for ExecutorSettings {
    fn from(config: &Config) -> Self {
        Self {
            workspace_dir: config.workspace_dir.clone(),
            workload_program: config.workload_program.clone(),
            workload_args: config.workload_args.clone(),
            callback_url: config.public_url.clone(),
            poll_timeout: config.poll_timeout,
            job_timeout: config.job_timeout,
        }
    }
}

/// Spawns one executor task per worker slot
///
/// Each task stops at its next poll boundary once `shutdown` is cancelled.
pub fn spawn_executors(
    config: &Config,
    jobs: Arc<JobService>,
    queue: Arc<JobQueue>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let settings = Arc::new(ExecutorSettings::from(config));

    (0..config.worker_slots)
        .map(|slot| {
            let executor = Executor::new(
                slot,
                Arc::clone(&jobs),
                Arc::clone(&queue),
                Arc::clone(&settings),
            );
            tokio::spawn(executor.run(shutdown.clone()))
        })
        .collect()
}
