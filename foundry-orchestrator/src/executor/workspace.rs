//! Per-job working directory
//!
//! Layout under `<workspace_dir>/<job_id>/`:
//! - `config.json`: the job configuration, pretty printed
//! - `output/`: where the workload writes its results
//! - `stdout.log`: captured standard output of the workload

use foundry_core::domain::job::Job;
use std::path::{Path, PathBuf};

use super::process::ExecutionError;

const CONFIG_FILE: &str = "config.json";
const OUTPUT_DIR: &str = "output";
const STDOUT_FILE: &str = "stdout.log";

#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub output_dir: PathBuf,
    pub stdout_path: PathBuf,
}

impl Workspace {
    pub fn for_job(base: &Path, job: &Job) -> Self {
        let root = base.join(job.id.to_string());
        Self {
            config_path: root.join(CONFIG_FILE),
            output_dir: root.join(OUTPUT_DIR),
            stdout_path: root.join(STDOUT_FILE),
            root,
        }
    }

    /// Creates the directory tree and materializes the job configuration
    pub async fn prepare(base: &Path, job: &Job) -> Result<Self, ExecutionError> {
        let workspace = Self::for_job(base, job);

        tokio::fs::create_dir_all(&workspace.output_dir)
            .await
            .map_err(|source| ExecutionError::Workspace {
                path: workspace.output_dir.clone(),
                source,
            })?;

        let config = serde_json::to_vec_pretty(&job.config)?;
        tokio::fs::write(&workspace.config_path, config)
            .await
            .map_err(|source| ExecutionError::Workspace {
                path: workspace.config_path.clone(),
                source,
            })?;

        tracing::debug!(job_id = %job.id, path = %workspace.root.display(), "Workspace prepared");
        Ok(workspace)
    }

    /// Output location reported when the job completes
    pub fn output_location(&self) -> String {
        self.output_dir.to_string_lossy().into_owned()
    }
}
