//! Workload subprocess
//!
//! Launches the workload in its workspace, waits for it to exit and
//! captures the tail of its standard error.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::ExecutorSettings;
use super::workspace::Workspace;

/// Bytes of standard error kept for the error detail
pub const STDERR_TAIL_BYTES: usize = 16 * 1024;

/// How long to wait for the stderr reader after the child exited
const STDERR_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Error type for a single job's execution
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to prepare workspace {}: {source}", path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize job config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to launch workload '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for workload: {0}")]
    Wait(#[source] std::io::Error),
}

/// How the workload process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessExit {
    /// Exited on its own. `code` is `None` when killed by a signal.
    Exited { code: Option<i32>, stderr: String },
    /// Killed because the job was cancelled
    Cancelled,
    /// Killed because the job timeout elapsed
    TimedOut,
}

impl ProcessExit {
    pub fn success(&self) -> bool {
        matches!(self, ProcessExit::Exited { code: Some(0), .. })
    }

    /// Error detail for a failed job: captured stderr, else the exit status
    pub fn failure_detail(&self) -> String {
        match self {
            ProcessExit::Exited { stderr, .. } if !stderr.is_empty() => stderr.clone(),
            ProcessExit::Exited { code: Some(code), .. } => {
                format!("workload exited with status {}", code)
            }
            ProcessExit::Exited { code: None, .. } => "workload terminated by signal".to_string(),
            ProcessExit::Cancelled => "workload cancelled".to_string(),
            ProcessExit::TimedOut => "workload timed out".to_string(),
        }
    }
}

/// Runs the workload to completion, cancellation or timeout
pub async fn run_workload(
    settings: &ExecutorSettings,
    job_id: Uuid,
    workspace: &Workspace,
    cancel: &CancellationToken,
) -> Result<ProcessExit, ExecutionError> {
    let stdout = tokio::fs::File::create(&workspace.stdout_path)
        .await
        .map_err(|source| ExecutionError::Workspace {
            path: workspace.stdout_path.clone(),
            source,
        })?
        .into_std()
        .await;

    let mut child = Command::new(&settings.workload_program)
        .args(&settings.workload_args)
        .current_dir(&workspace.root)
        .env("FOUNDRY_JOB_ID", job_id.to_string())
        .env("FOUNDRY_CONFIG", &workspace.config_path)
        .env("FOUNDRY_OUTPUT_DIR", &workspace.output_dir)
        .env("FOUNDRY_CALLBACK_URL", &settings.callback_url)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ExecutionError::Launch {
            program: settings.workload_program.clone(),
            source,
        })?;

    tracing::debug!(job_id = %job_id, pid = ?child.id(), "Workload started");

    let stderr_reader = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES)));

    let status = tokio::select! {
        status = child.wait() => status.map_err(ExecutionError::Wait)?,
        _ = cancel.cancelled() => {
            kill(&mut child, job_id).await;
            abort(stderr_reader);
            return Ok(ProcessExit::Cancelled);
        }
        _ = deadline(settings.job_timeout) => {
            kill(&mut child, job_id).await;
            abort(stderr_reader);
            return Ok(ProcessExit::TimedOut);
        }
    };

    let stderr = match stderr_reader {
        Some(handle) => match tokio::time::timeout(STDERR_DRAIN_TIMEOUT, handle).await {
            Ok(Ok(bytes)) => String::from_utf8_lossy(&bytes).trim().to_string(),
            Ok(Err(e)) => {
                tracing::warn!(job_id = %job_id, error = %e, "Stderr reader failed");
                String::new()
            }
            Err(_) => {
                tracing::warn!(job_id = %job_id, "Timed out draining workload stderr");
                String::new()
            }
        },
        None => String::new(),
    };

    tracing::debug!(job_id = %job_id, code = ?status.code(), "Workload exited");

    Ok(ProcessExit::Exited {
        code: status.code(),
        stderr,
    })
}

/// Reads a stream to the end, keeping only its last `limit` bytes
pub async fn read_tail<R>(mut reader: R, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut tail = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&chunk[..n]);
                if tail.len() > limit {
                    let excess = tail.len() - limit;
                    tail.drain(..excess);
                }
            }
        }
    }

    tail
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn kill(child: &mut Child, job_id: Uuid) {
    if let Err(e) = child.kill().await {
        tracing::warn!(job_id = %job_id, error = %e, "Failed to kill workload");
    }
}

fn abort(reader: Option<tokio::task::JoinHandle<Vec<u8>>>) {
    if let Some(handle) = reader {
        handle.abort();
    }
}
