//! Message types for the runner line protocol.

use serde::{Deserialize, Serialize};

/// Prefix of a progress line.
pub const PROGRESS_PREFIX: &str = "OUT:";

/// Prefix of the terminal line for a job.
pub const RESULT_PREFIX: &str = "RESULT:";

/// A job request, written as one line to the runner's stdin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub prompt: String,
    pub system_prompt_file: String,
    /// Model override for this job; omitted from the wire when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Payload of a `RESULT:` line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub exit_code: i32,
    #[serde(default)]
    pub output: String,
}

impl JobResult {
    pub const fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Classification of one line read from a runner's stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerLine {
    /// `OUT:` line; text after the prefix, verbatim.
    Progress(String),
    /// `RESULT:` line with a well-formed payload.
    Result(JobResult),
    /// `RESULT:` line whose payload did not decode; carries the raw payload.
    MalformedResult(String),
    /// Anything else.
    Other(String),
}
