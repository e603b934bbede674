//! Parsing and encoding of runner protocol lines.
//!
//! Tolerant on the read side: unrecognised lines are classified, never
//! rejected, and a broken `RESULT:` payload still terminates the job.

use super::types::{JobRequest, JobResult, PROGRESS_PREFIX, RESULT_PREFIX, RunnerLine};
use crate::error::Result;

/// Classify a single line from a runner's stdout.
pub fn parse_line(line: &str) -> RunnerLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if let Some(text) = line.strip_prefix(PROGRESS_PREFIX) {
        return RunnerLine::Progress(text.to_string());
    }
    if let Some(payload) = line.strip_prefix(RESULT_PREFIX) {
        return match serde_json::from_str::<JobResult>(payload) {
            Ok(result) => RunnerLine::Result(result),
            Err(_) => RunnerLine::MalformedResult(payload.to_string()),
        };
    }
    RunnerLine::Other(line.to_string())
}

/// Encode a job request as a single line (no trailing newline).
pub fn request_line(request: &JobRequest) -> Result<String> {
    Ok(serde_json::to_string(request)?)
}

/// Encode a progress line. Embedded newlines are flattened to spaces so the
/// line stays a single protocol frame.
pub fn progress_line(text: &str) -> String {
    format!("{PROGRESS_PREFIX}{}", text.replace(['\r', '\n'], " "))
}

/// Encode a terminal result line.
pub fn result_line(result: &JobResult) -> Result<String> {
    Ok(format!("{RESULT_PREFIX}{}", serde_json::to_string(result)?))
}
