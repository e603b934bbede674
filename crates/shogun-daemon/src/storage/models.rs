//! Record types persisted by the [`Store`](super::Store).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Failed,
}

impl CommandStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the command queue; the unit of orchestration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    /// Instruction text.
    #[serde(rename = "command")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: CommandStatus,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct CommandQueue {
    #[serde(default)]
    pub queue: Vec<Command>,
}

/// Task written to a laborer's task file before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub parent_cmd: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub(super) struct TaskFile {
    pub task: TaskRecord,
}

/// Report a laborer filed for its task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub worker_id: String,
    pub task_id: String,
    pub timestamp: String,
    pub status: String,
    pub result: String,
    #[serde(default)]
    pub skill_candidate: SkillCandidate,
}

/// A laborer's suggestion that its work is worth promoting into a reusable
/// skill.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkillCandidate {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SkillCandidate {
    /// Name of a candidate worth listing: flagged and named.
    pub fn promotable_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|n| self.found && !n.is_empty())
    }
}

/// Aggregate status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterStatus {
    pub last_updated: String,
    pub current_task: String,
    pub task_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_description: Option<String>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_subtasks: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_action: Option<String>,
}

/// A laborer's share of a command, as resolved from the steward's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub laborer: usize,
    pub task_id: String,
    pub parent_cmd: String,
    pub description: String,
    pub target_path: Option<String>,
}
