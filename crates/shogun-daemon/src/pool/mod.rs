//! Persistent worker process pool.
//!
//! One long-lived runner process per [`Role`]. Jobs are written to the
//! process's stdin as single JSON lines and resolved by the matching
//! `RESULT:` line on its stdout. At most one job is in flight per role; a
//! second submission is rejected with [`PoolError::Busy`], never queued.

mod manager;
mod slot;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use shogun_core::Role;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use manager::WorkerPool;

/// Bound on one job round-trip.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(120);

/// Environment every pooled process starts with, so its output stays
/// machine-parseable.
pub const FIXED_ENV: &[(&str, &str)] = &[
    ("CI", "true"),
    ("NO_COLOR", "true"),
    ("TERM", "dumb"),
    ("FORCE_COLOR", "0"),
    ("DEBIAN_FRONTEND", "noninteractive"),
];

/// How pooled processes are launched.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Runner executable: a path, or a bare name looked up on `PATH`.
    pub program: PathBuf,
    pub args: Vec<String>,
    /// Working directory of every process; must exist.
    pub working_dir: PathBuf,
    /// Extra environment on top of [`FIXED_ENV`].
    pub env: Vec<(String, String)>,
    pub job_timeout: Duration,
}

impl PoolConfig {
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

/// One job for one role.
#[derive(Debug, Clone)]
pub struct Job {
    pub role: Role,
    pub prompt: String,
    /// File holding the system prompt, read by the runner.
    pub system_prompt_file: PathBuf,
    pub model: Option<String>,
}

/// Terminal outcome of a job that produced a `RESULT:` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    /// `exitCode == 0`; `false` for a malformed payload.
    pub success: bool,
    pub output: String,
}

/// An `OUT:` line received while a job was outstanding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub role: Role,
    pub text: String,
}

/// A role whose process started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyNotice {
    pub role: Role,
    pub pid: Option<u32>,
}

/// Pool errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("No worker process registered for {role}")]
    Unavailable { role: Role },

    #[error("A job is already in flight for {role}")]
    Busy { role: Role },

    #[error("Job for {role} timed out after {}s", timeout.as_secs())]
    Timeout { role: Role, timeout: Duration },

    #[error("Job for {role} was cancelled")]
    Cancelled { role: Role },

    #[error("Worker process for {role} terminated")]
    Terminated { role: Role },

    #[error("Pool startup failed: {reason}")]
    Startup { reason: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Anything that can run a job for a role.
///
/// Implemented by [`WorkerPool`]; the orchestration engine is generic over
/// it.
pub trait JobRunner: Send + Sync {
    fn submit_job(
        &self,
        job: Job,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<JobOutput, PoolError>> + Send;
}
