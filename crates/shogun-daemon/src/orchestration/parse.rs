//! Decoding of steward and laborer replies.
//!
//! Replies are free text from a language model. The JSON payload is taken
//! from the first fenced code block, else from the first `{` to the last
//! `}`, and only then decoded.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)```(?:json)?\s*([\s\S]*?)```").expect("static regex is valid")
});

static FENCED_ANY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```\w*\s*([\s\S]*?)```").expect("static regex is valid"));

/// One entry of the steward's `assignments` array, as sent.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssignmentReply {
    /// Target laborer; out-of-range values are filtered by the caller.
    #[serde(alias = "laborer")]
    pub ashigaru: i64,
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub parent_cmd: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub target_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DecompositionReply {
    #[serde(default)]
    assignments: Vec<AssignmentReply>,
}

/// A laborer's report, as sent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct LaborerReply {
    pub task_id: Option<String>,
    pub status: Option<String>,
    pub result: Option<String>,
    pub skill_candidate_found: bool,
    pub skill_candidate_name: Option<String>,
    pub skill_candidate_description: Option<String>,
    pub skill_candidate_reason: Option<String>,
}

/// Outcome of decoding a laborer reply: the structured report, or the raw
/// text standing in for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportParse {
    Structured(LaborerReply),
    Raw(String),
}

/// The JSON-looking part of a reply.
pub fn extract_json(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(block) = FENCED_JSON.captures(trimmed).and_then(|c| c.get(1)) {
        return block.as_str().trim();
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Decode the steward's decomposition. An unparsable reply or an empty
/// assignment list is an error describing what was wrong.
pub fn parse_decomposition(reply: &str) -> Result<Vec<AssignmentReply>, String> {
    let decoded: DecompositionReply = serde_json::from_str(extract_json(reply))
        .map_err(|e| format!("steward reply is not a valid assignment object: {e}"))?;
    if decoded.assignments.is_empty() {
        return Err("steward reply contains no assignments".to_string());
    }
    Ok(decoded.assignments)
}

/// Decode a laborer's report, falling back to the raw reply.
pub fn parse_report(reply: &str) -> ReportParse {
    serde_json::from_str::<LaborerReply>(extract_json(reply))
        .map_or_else(|_| ReportParse::Raw(reply.trim().to_string()), ReportParse::Structured)
}

/// Contents of the first fenced block of any language, or the trimmed reply.
pub fn strip_code_block(reply: &str) -> &str {
    let trimmed = reply.trim();
    FENCED_ANY
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str().trim())
}
