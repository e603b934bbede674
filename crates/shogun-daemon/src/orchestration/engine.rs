//! Per-command state machine.
//!
//! `pending → in_progress → done`. Decomposition failures revert to
//! `pending`; any other failure also reverts to `pending` and records a
//! `failed` aggregate snapshot so the command can be retried.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use shogun_core::Role;
use shogun_core::config::{DashboardConfig, ModelConfig};
use shogun_core::dashboard::table_row;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::OrchestrationError;
use super::parse::{self, AssignmentReply, ReportParse};
use super::prompts;
use crate::clock;
use crate::instructions::InstructionLoader;
use crate::pool::{Job, JobOutput, JobRunner, PoolError, ProgressEvent};
use crate::storage::{
    Assignment, Command, CommandStatus, ReportRecord, SkillCandidate, Store, TaskRecord,
};

/// Drives queued commands through the worker hierarchy.
///
/// Owns no process state: jobs go through the injected [`JobRunner`], all
/// persistence through the [`Store`].
pub struct Orchestrator<R> {
    store: Arc<Store>,
    runner: Arc<R>,
    instructions: InstructionLoader,
    models: ModelConfig,
    dashboard: DashboardConfig,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    prompt_dir: PathBuf,
}

/// What one laborer produced.
struct LaborerOutcome {
    assignment: Assignment,
    report: ReportRecord,
}

impl<R: JobRunner> Orchestrator<R> {
    pub fn new(store: Arc<Store>, runner: Arc<R>) -> Self {
        let instructions = InstructionLoader::new(store.workspace_root());
        Self {
            store,
            runner,
            instructions,
            models: ModelConfig::default(),
            dashboard: DashboardConfig::default(),
            progress: None,
            prompt_dir: std::env::temp_dir(),
        }
    }

    #[must_use]
    pub fn with_models(mut self, models: ModelConfig) -> Self {
        self.models = models;
        self
    }

    #[must_use]
    pub fn with_dashboard(mut self, dashboard: DashboardConfig) -> Self {
        self.dashboard = dashboard;
        self
    }

    /// Forward every job's `OUT:` lines to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Directory for the per-job system prompt files.
    #[must_use]
    pub fn with_prompt_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.prompt_dir = dir.into();
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    // =========================================================================
    // Commander
    // =========================================================================

    /// Turn free-form input into a concrete instruction.
    ///
    /// Falls back to the input itself when the commander is unavailable,
    /// fails or replies with nothing.
    pub async fn resolve_command(
        &self,
        user_input: &str,
        project: Option<&str>,
        cancel: &CancellationToken,
    ) -> String {
        let prompt = prompts::commander_prompt(user_input, project);
        match self.run_role_job(Role::Commander, prompt, cancel).await {
            Ok(output) if output.success => {
                let resolved = parse::strip_code_block(&output.output);
                if resolved.is_empty() {
                    user_input.to_string()
                } else {
                    info!(resolved, "Commander resolved instruction");
                    resolved.to_string()
                }
            }
            Ok(output) => {
                warn!(output = %output.output, "Commander job failed; using input as-is");
                user_input.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Commander unavailable; using input as-is");
                user_input.to_string()
            }
        }
    }

    /// Resolve, enqueue and run a new command.
    pub async fn submit(
        &self,
        user_input: &str,
        project: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestrationError> {
        let instruction = self.resolve_command(user_input, project, cancel).await;
        let command = self
            .store
            .enqueue_command(&instruction, project, None)
            .await?;
        self.run(&command.id, cancel).await
    }

    // =========================================================================
    // Steward and laborers
    // =========================================================================

    /// Run command `command_id` to completion and return a summary.
    pub async fn run(
        &self,
        command_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestrationError> {
        let Some(command) = self.store.find_command(command_id).await? else {
            warn!(command_id, "Command not found");
            return Err(OrchestrationError::CommandNotFound {
                id: command_id.to_string(),
            });
        };

        info!(command_id, "Orchestration started");
        match self.execute(&command, cancel).await {
            Ok(summary) => {
                info!(command_id, "Orchestration complete");
                Ok(summary)
            }
            Err(err @ OrchestrationError::Decomposition { .. }) => {
                warn!(command_id, error = %err, "Decomposition failed; command back to pending");
                self.revert(command_id).await;
                Err(err)
            }
            Err(err) => {
                error!(command_id, error = %err, "Orchestration failed");
                self.revert(command_id).await;
                if let Err(e) = self
                    .store
                    .write_aggregate_status(
                        &clock::record_timestamp(),
                        command_id,
                        CommandStatus::Failed.as_str(),
                        None,
                        None,
                    )
                    .await
                {
                    warn!(command_id, error = %e, "Failed to record failed status");
                }
                Err(err)
            }
        }
    }

    async fn execute(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<String, OrchestrationError> {
        let id = command.id.as_str();
        self.store
            .update_command_status(id, CommandStatus::InProgress)
            .await?;
        self.store
            .write_aggregate_status(
                &clock::record_timestamp(),
                id,
                CommandStatus::InProgress.as_str(),
                Some(&command.text),
                None,
            )
            .await?;

        let assignments = self.decompose(command, cancel).await?;
        info!(command_id = id, tasks = assignments.len(), "Command decomposed");

        let timestamp = clock::record_timestamp();
        for assignment in &assignments {
            let task = TaskRecord {
                task_id: assignment.task_id.clone(),
                parent_cmd: assignment.parent_cmd.clone(),
                description: assignment.description.clone(),
                target_path: assignment.target_path.clone(),
                status: CommandStatus::InProgress.as_str().to_string(),
                timestamp: timestamp.clone(),
            };
            self.store
                .write_task_record(assignment.laborer, &task)
                .await?;
        }
        let summary_line = prompts::dispatch_summary(id, &assignments);
        let stamp = clock::dashboard_timestamp();
        self.store
            .update_shared_document(|doc| {
                let appended = doc.append_line(&self.dashboard.in_progress, &summary_line);
                let refreshed = doc.refresh_timestamp(&self.dashboard.last_updated_marker, &stamp);
                appended || refreshed
            })
            .await?;

        let outcomes = join_all(
            assignments
                .iter()
                .map(|a| self.run_laborer(command, a.clone(), cancel)),
        )
        .await;

        if cancel.is_cancelled() {
            return Err(OrchestrationError::Cancelled);
        }

        self.record_results(command, &outcomes).await?;

        self.store
            .update_command_status(id, CommandStatus::Done)
            .await?;
        self.store
            .write_aggregate_status(
                &clock::record_timestamp(),
                id,
                CommandStatus::Done.as_str(),
                Some(&command.text),
                Some(&assignments),
            )
            .await?;

        let failed = outcomes
            .iter()
            .filter(|o| o.report.status == "failed")
            .count();
        Ok(format!(
            "Command {id} completed: {} task(s) dispatched to laborers, {} succeeded, {failed} failed; dashboard updated.",
            outcomes.len(),
            outcomes.len() - failed,
        ))
    }

    /// Ask the steward for assignments and keep the usable ones.
    async fn decompose(
        &self,
        command: &Command,
        cancel: &CancellationToken,
    ) -> Result<Vec<Assignment>, OrchestrationError> {
        let laborer_count = self.store.laborer_count();
        let registry = self.store.read_projects_registry().await?;
        let prompt = prompts::steward_prompt(command, &registry, laborer_count);

        let output = self.run_role_job(Role::Steward, prompt, cancel).await?;
        if !output.success {
            return Err(OrchestrationError::Steward {
                reason: output.output,
            });
        }
        debug!(command_id = %command.id, reply = %output.output, "Steward replied");

        let replies = parse::parse_decomposition(&output.output)
            .map_err(|reason| OrchestrationError::Decomposition { reason })?;
        let assignments = resolve_assignments(command, replies, laborer_count);
        if assignments.is_empty() {
            return Err(OrchestrationError::Decomposition {
                reason: format!("no assignment targets a laborer in 1..={laborer_count}"),
            });
        }
        Ok(assignments)
    }

    /// Run one laborer's task. Never fails: every problem becomes the
    /// report's status and result text.
    async fn run_laborer(
        &self,
        command: &Command,
        assignment: Assignment,
        cancel: &CancellationToken,
    ) -> LaborerOutcome {
        let laborer = assignment.laborer;
        let task_id = assignment.task_id.clone();

        let report = match self.laborer_job(&assignment, cancel).await {
            Ok(output) if output.success => report_from_reply(&output.output),
            Ok(output) => failed_report(output.output),
            Err(e) => failed_report(e.to_string()),
        };
        let report = ReportRecord {
            worker_id: Role::Laborer(laborer).to_string(),
            task_id: task_id.clone(),
            timestamp: clock::record_timestamp(),
            ..report
        };

        if let Err(e) = self.store.write_report_record(laborer, &report).await {
            warn!(laborer, task_id = %task_id, error = %e, "Failed to write report");
        }
        info!(
            command_id = %command.id,
            laborer,
            task_id = %task_id,
            status = %report.status,
            "Laborer finished"
        );
        LaborerOutcome { assignment, report }
    }

    async fn laborer_job(
        &self,
        assignment: &Assignment,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, PoolError> {
        let task_text = self
            .store
            .read_task_text(assignment.laborer)
            .await
            .map_err(|e| PoolError::Io(e.to_string()))?
            .unwrap_or_default();
        let prompt = prompts::laborer_prompt(&task_text, &assignment.task_id);
        self.run_role_job(Role::Laborer(assignment.laborer), prompt, cancel)
            .await
    }

    /// Results rows, skill candidates and the action-required summary.
    async fn record_results(
        &self,
        command: &Command,
        outcomes: &[LaborerOutcome],
    ) -> Result<(), OrchestrationError> {
        let time = clock::clock_time();
        let project = command.project.as_deref().unwrap_or("-");
        let rows: Vec<String> = outcomes
            .iter()
            .map(|o| {
                table_row(&[
                    time.as_str(),
                    project,
                    o.assignment.description.as_str(),
                    o.report.result.as_str(),
                ])
            })
            .collect();
        let stamp = clock::dashboard_timestamp();
        self.store
            .update_shared_document(|doc| {
                let appended = doc.append_table_rows(&self.dashboard.results, &rows);
                let refreshed = doc.refresh_timestamp(&self.dashboard.last_updated_marker, &stamp);
                appended || refreshed
            })
            .await?;

        let candidates: Vec<(&str, &SkillCandidate)> = outcomes
            .iter()
            .filter_map(|o| {
                let candidate = &o.report.skill_candidate;
                candidate.promotable_name().map(|name| (name, candidate))
            })
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }
        info!(
            command_id = %command.id,
            count = candidates.len(),
            "Skill candidates reported"
        );
        self.store
            .update_shared_document(|doc| {
                let mut changed = false;
                for (name, candidate) in &candidates {
                    changed |= doc.append_line(
                        &self.dashboard.skill_candidates,
                        &prompts::skill_line(name, candidate),
                    );
                    changed |= doc.append_line(
                        &self.dashboard.action_required,
                        &prompts::action_required_line(name),
                    );
                }
                changed
            })
            .await?;
        Ok(())
    }

    // =========================================================================
    // Jobs
    // =========================================================================

    /// Submit one job with the role's system prompt written to a scratch
    /// file that is removed afterwards.
    async fn run_role_job(
        &self,
        role: Role,
        prompt: String,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, PoolError> {
        let system_prompt = self.instructions.system_prompt(role).await;
        let path = self
            .prompt_dir
            .join(format!("shogun-{role}-{}.md", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, system_prompt)
            .await
            .map_err(|e| PoolError::Io(format!("{}: {e}", path.display())))?;

        let job = Job {
            role,
            prompt,
            system_prompt_file: path.clone(),
            model: self.models.for_role(role).map(String::from),
        };
        debug!(%role, model = ?job.model, "Submitting job");
        let result = self
            .runner
            .submit_job(job, self.progress.clone(), cancel)
            .await;

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(path = %path.display(), error = %e, "Failed to remove system prompt file");
        }
        result
    }

    async fn revert(&self, command_id: &str) {
        if let Err(e) = self
            .store
            .update_command_status(command_id, CommandStatus::Pending)
            .await
        {
            warn!(command_id, error = %e, "Failed to revert command to pending");
        }
    }
}

/// Keep assignments for laborers `1..=laborer_count`, one per laborer,
/// filling missing ids from the command.
fn resolve_assignments(
    command: &Command,
    replies: Vec<AssignmentReply>,
    laborer_count: usize,
) -> Vec<Assignment> {
    let mut seen = HashSet::new();
    let mut assignments = Vec::with_capacity(replies.len());
    for reply in replies {
        let Some(laborer) = usize::try_from(reply.ashigaru)
            .ok()
            .filter(|n| (1..=laborer_count).contains(n))
        else {
            warn!(command_id = %command.id, laborer = reply.ashigaru, "Dropping assignment for unknown laborer");
            continue;
        };
        if !seen.insert(laborer) {
            warn!(command_id = %command.id, laborer, "Dropping second assignment for busy laborer");
            continue;
        }
        assignments.push(Assignment {
            laborer,
            task_id: non_blank(reply.task_id).unwrap_or_else(|| format!("{}_{laborer}", command.id)),
            parent_cmd: non_blank(reply.parent_cmd).unwrap_or_else(|| command.id.clone()),
            description: reply.description.unwrap_or_default(),
            target_path: non_blank(reply.target_path),
        });
    }
    assignments
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Report skeleton from a successful laborer reply; identity fields are
/// filled in by the caller.
fn report_from_reply(reply: &str) -> ReportRecord {
    match parse::parse_report(reply) {
        ReportParse::Structured(parsed) => ReportRecord {
            worker_id: String::new(),
            task_id: parsed.task_id.unwrap_or_default(),
            timestamp: String::new(),
            status: non_blank(parsed.status).unwrap_or_else(|| "done".to_string()),
            result: parsed.result.unwrap_or_else(|| reply.trim().to_string()),
            skill_candidate: SkillCandidate {
                found: parsed.skill_candidate_found,
                name: parsed.skill_candidate_name,
                description: parsed.skill_candidate_description,
                reason: parsed.skill_candidate_reason,
            },
        },
        ReportParse::Raw(text) => ReportRecord {
            worker_id: String::new(),
            task_id: String::new(),
            timestamp: String::new(),
            status: "done".to_string(),
            result: text,
            skill_candidate: SkillCandidate::default(),
        },
    }
}

fn failed_report(reason: String) -> ReportRecord {
    ReportRecord {
        worker_id: String::new(),
        task_id: String::new(),
        timestamp: String::new(),
        status: "failed".to_string(),
        result: reason,
        skill_candidate: SkillCandidate::default(),
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn command() -> Command {
        Command {
            id: "cmd_004".into(),
            timestamp: String::new(),
            text: "t".into(),
            project: None,
            priority: None,
            status: CommandStatus::Pending,
        }
    }

    fn reply(ashigaru: i64, task_id: Option<&str>) -> AssignmentReply {
        AssignmentReply {
            ashigaru,
            task_id: task_id.map(String::from),
            parent_cmd: None,
            description: Some("d".into()),
            target_path: Some(String::new()),
        }
    }

    #[test]
    fn out_of_range_and_duplicate_laborers_are_dropped() {
        let assignments = resolve_assignments(
            &command(),
            vec![
                reply(0, None),
                reply(2, Some("a")),
                reply(9, None),
                reply(-3, None),
                reply(2, Some("b")),
                reply(8, None),
            ],
            8,
        );
        let laborers: Vec<usize> = assignments.iter().map(|a| a.laborer).collect();
        assert_eq!(laborers, [2, 8]);
        assert_eq!(assignments[0].task_id, "a");
        assert_eq!(assignments[1].task_id, "cmd_004_8");
        assert_eq!(assignments[1].parent_cmd, "cmd_004");
        assert_eq!(assignments[1].target_path, None);
    }

    #[test]
    fn structured_report_keeps_fields() {
        let report = report_from_reply(
            r#"{"task_id":"x","status":"done","result":"refactored","skill_candidate_found":true,"skill_candidate_name":"extract-helper"}"#,
        );
        assert_eq!(report.result, "refactored");
        assert_eq!(report.skill_candidate.promotable_name(), Some("extract-helper"));
    }

    #[test]
    fn structured_report_without_result_uses_reply() {
        let report = report_from_reply(r#"{"status":"done"}"#);
        assert_eq!(report.result, r#"{"status":"done"}"#);
    }

    #[test]
    fn raw_report_is_done_with_text() {
        let report = report_from_reply("finished, see diff");
        assert_eq!(report.status, "done");
        assert_eq!(report.result, "finished, see diff");
        assert!(!report.skill_candidate.found);
    }
}
