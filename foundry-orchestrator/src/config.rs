//! Orchestrator configuration
//!
//! Defines all configurable parameters for the orchestrator including
//! the HTTP listener, storage backend, executor settings, and submission bounds.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Orchestrator configuration
///
/// Everything can be overridden from the environment so the same binary
/// works for local development and for container deployments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Base URL workloads use to reach the API (passed as the callback address)
    pub public_url: String,

    /// PostgreSQL connection string. The in-memory store is used when unset.
    pub database_url: Option<String>,

    /// Directory under which each job gets its own working directory
    pub workspace_dir: PathBuf,

    /// Executable invoked for every job
    pub workload_program: String,

    /// Extra arguments passed to the workload executable
    pub workload_args: Vec<String>,

    /// Number of executor instances sharing the queue
    pub worker_slots: usize,

    /// Bounded wait of a single dequeue attempt
    pub poll_timeout: Duration,

    /// Deadline after which a running job is cancelled
    pub job_timeout: Option<Duration>,

    /// Bounds applied to submissions
    pub limits: SubmissionLimits,
}

/// Bounds applied when validating a job submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionLimits {
    pub priority_min: i32,
    pub priority_max: i32,
    pub default_priority: i32,
    pub gpu_count_min: u32,
    pub gpu_count_max: u32,
    pub memory_gb_min: u32,
    pub memory_gb_max: u32,
    /// Keys every job configuration object must contain
    pub required_config_fields: Vec<String>,
}

impl Default for SubmissionLimits {
    fn default() -> Self {
        Self {
            priority_min: 0,
            priority_max: 10,
            default_priority: 5,
            gpu_count_min: 1,
            gpu_count_max: 8,
            memory_gb_min: 8,
            memory_gb_max: 128,
            required_config_fields: Vec::new(),
        }
    }
}

impl SubmissionLimits {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.priority_min > self.priority_max {
            anyhow::bail!("priority_min must not exceed priority_max");
        }

        if !(self.priority_min..=self.priority_max).contains(&self.default_priority) {
            anyhow::bail!(
                "default priority {} is outside {}..={}",
                self.default_priority,
                self.priority_min,
                self.priority_max
            );
        }

        if self.gpu_count_min > self.gpu_count_max {
            anyhow::bail!("gpu_count_min must not exceed gpu_count_max");
        }

        if self.memory_gb_min > self.memory_gb_max {
            anyhow::bail!("memory_gb_min must not exceed memory_gb_max");
        }

        Ok(())
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognised environment variables (all optional):
    /// - ORCHESTRATOR_BIND_ADDR (default: 0.0.0.0:8080)
    /// - ORCHESTRATOR_PUBLIC_URL (default: http://127.0.0.1:8080)
    /// - DATABASE_URL (default: unset, in-memory store)
    /// - WORKSPACE_DIR (default: /tmp/foundry/jobs)
    /// - WORKLOAD_PROGRAM (default: foundry-workload)
    /// - WORKLOAD_ARGS (whitespace separated)
    /// - WORKER_SLOTS (default: 1)
    /// - POLL_TIMEOUT_MS (default: 5000)
    /// - JOB_TIMEOUT (seconds, default: none)
    /// - PRIORITY_MIN / PRIORITY_MAX / PRIORITY_DEFAULT (default: 0 / 10 / 5)
    /// - REQUIRED_CONFIG_FIELDS (comma separated)
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let limits = SubmissionLimits {
            priority_min: env_parse("PRIORITY_MIN")?.unwrap_or(defaults.limits.priority_min),
            priority_max: env_parse("PRIORITY_MAX")?.unwrap_or(defaults.limits.priority_max),
            default_priority: env_parse("PRIORITY_DEFAULT")?
                .unwrap_or(defaults.limits.default_priority),
            required_config_fields: std::env::var("REQUIRED_CONFIG_FIELDS")
                .map(|s| {
                    s.split(',')
                        .map(str::trim)
                        .filter(|f| !f.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            ..defaults.limits
        };

        Ok(Self {
            bind_addr: std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or(defaults.bind_addr),
            public_url: std::env::var("ORCHESTRATOR_PUBLIC_URL").unwrap_or(defaults.public_url),
            database_url: std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            workspace_dir: std::env::var("WORKSPACE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_dir),
            workload_program: std::env::var("WORKLOAD_PROGRAM")
                .unwrap_or(defaults.workload_program),
            workload_args: std::env::var("WORKLOAD_ARGS")
                .map(|s| s.split_whitespace().map(String::from).collect())
                .unwrap_or_default(),
            worker_slots: env_parse("WORKER_SLOTS")?.unwrap_or(defaults.worker_slots),
            poll_timeout: env_parse("POLL_TIMEOUT_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_timeout),
            job_timeout: env_parse("JOB_TIMEOUT")?.map(Duration::from_secs),
            limits,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if !self.public_url.starts_with("http://") && !self.public_url.starts_with("https://") {
            anyhow::bail!("public_url must start with http:// or https://");
        }

        if self.workload_program.is_empty() {
            anyhow::bail!("workload_program cannot be empty");
        }

        if self.worker_slots == 0 {
            anyhow::bail!("worker_slots must be greater than 0");
        }

        if self.poll_timeout.is_zero() {
            anyhow::bail!("poll_timeout must be greater than 0");
        }

        if self.job_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("job_timeout must be greater than 0 when set");
        }

        self.limits.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_url: "http://127.0.0.1:8080".to_string(),
            database_url: None,
            workspace_dir: PathBuf::from("/tmp/foundry/jobs"),
            workload_program: "foundry-workload".to_string(),
            workload_args: Vec::new(),
            worker_slots: 1,
            poll_timeout: Duration::from_secs(5),
            job_timeout: None,
            limits: SubmissionLimits::default(),
        }
    }
}

/// Reads and parses an optional environment variable
///
/// A variable that is set but unparsable is an error rather than a silent default.
fn env_parse<T: FromStr>(key: &str) -> anyhow::Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{} has an invalid value: '{}'", key, raw)),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.worker_slots, 1);
        assert_eq!(config.poll_timeout, Duration::from_secs(5));
        assert!(config.database_url.is_none());
        assert!(config.job_timeout.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_limits() {
        let limits = SubmissionLimits::default();
        assert_eq!(limits.default_priority, 5);
        assert_eq!((limits.priority_min, limits.priority_max), (0, 10));
        assert_eq!((limits.gpu_count_min, limits.gpu_count_max), (1, 8));
        assert_eq!((limits.memory_gb_min, limits.memory_gb_max), (8, 128));
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.worker_slots = 0;
        assert!(config.validate().is_err());
        config.worker_slots = 4;

        config.public_url = "localhost:8080".to_string();
        assert!(config.validate().is_err());
        config.public_url = "http://localhost:8080".to_string();

        config.job_timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());
        config.job_timeout = Some(Duration::from_secs(60));

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_priority_must_be_in_range() {
        let limits = SubmissionLimits {
            default_priority: 11,
            ..SubmissionLimits::default()
        };
        assert!(limits.validate().is_err());
    }
}
