//! Static per-role instructions and shared context read from the workspace.
//!
//! Files are re-read on every call so edits take effect on the next job
//! without a restart.

use std::path::{Path, PathBuf};

use shogun_core::Role;
use tracing::warn;

const STEWARD_FALLBACK: &str = "\
You are the steward. You receive instructions from the commander and assign \
the work to laborers. Do not do the work yourself; focus on managing them.
Treat the commander's instruction as the goal, design the best execution plan \
and assign it to the available laborers.
Reply only in the requested JSON format.";

const LABORER_FALLBACK: &str = "\
You are a laborer. You receive tasks from the steward and do the actual work.
Carry out the assigned task faithfully and report when it is complete.
Reply only in the requested JSON format.";

/// Loads role instructions and context documents from a workspace root.
#[derive(Debug, Clone)]
pub struct InstructionLoader {
    root: PathBuf,
}

impl InstructionLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Role instructions from `instructions/<role>.md`.
    ///
    /// Steward and laborer fall back to built-in text; the commander has no
    /// fallback.
    pub async fn role_instructions(&self, role: Role) -> Option<String> {
        let (file, fallback) = match role {
            Role::Commander => ("commander.md", None),
            Role::Steward => ("steward.md", Some(STEWARD_FALLBACK)),
            Role::Laborer(_) => ("laborer.md", Some(LABORER_FALLBACK)),
        };
        read_non_blank(&self.root.join("instructions").join(file))
            .await
            .or_else(|| fallback.map(String::from))
    }

    /// Workspace-wide system description (`CLAUDE.md`).
    pub async fn system_context(&self) -> Option<String> {
        read_non_blank(&self.root.join("CLAUDE.md")).await
    }

    /// Shared preferences and memory (`memory/global_context.md`).
    pub async fn global_context(&self) -> Option<String> {
        read_non_blank(&self.root.join("memory").join("global_context.md")).await
    }

    /// Full system prompt for `role`: system context, global context, then
    /// the role's instructions. Absent parts are skipped.
    pub async fn system_prompt(&self, role: Role) -> String {
        let mut prompt = String::new();
        if let Some(system) = self.system_context().await {
            push_context(
                &mut prompt,
                "The following is the system configuration (CLAUDE.md). Refer to it.",
                &system,
            );
        }
        if let Some(global) = self.global_context().await {
            push_context(
                &mut prompt,
                "The following are the system-wide settings and preferences \
                 (memory/global_context.md). Consult them before deciding.",
                &global,
            );
        }
        if let Some(instructions) = self.role_instructions(role).await {
            prompt.push_str(&instructions);
        }
        prompt
    }
}

fn push_context(prompt: &mut String, header: &str, body: &str) {
    prompt.push_str(header);
    prompt.push_str("\n\n---\n");
    prompt.push_str(body.trim_end());
    prompt.push_str("\n---\n\n");
}

async fn read_non_blank(path: &Path) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => None,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read instructions");
            None
        }
    }
}
