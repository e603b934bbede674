#![allow(clippy::unwrap_used)] // Integration tests use unwrap for brevity

//! End-to-end tests for command orchestration.
//!
//! A scripted [`JobRunner`] stands in for the worker pool and answers each
//! role with a canned reply, so these tests cover decomposition, concurrent
//! laborer dispatch, report records, the aggregate status snapshot and the
//! dashboard edits against a real workspace directory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shogun_core::config::ModelConfig;
use shogun_core::{Document, Role};
use shogun_daemon::orchestration::{OrchestrationError, Orchestrator};
use shogun_daemon::pool::{Job, JobOutput, JobRunner, PoolError, ProgressEvent};
use shogun_daemon::storage::{CommandStatus, Store};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
enum Reply {
    Success(String),
    Failure(String),
    Error(PoolError),
    /// Wait for cancellation.
    Hang,
    /// Succeed after a delay.
    Delay(Duration, String),
}

/// A job as the runner saw it, with the system prompt file's contents at
/// submission time.
#[derive(Debug, Clone)]
struct SeenJob {
    job: Job,
    system_prompt: Option<String>,
}

#[derive(Default)]
struct ScriptedRunner {
    replies: Mutex<HashMap<Role, Reply>>,
    seen: Mutex<Vec<SeenJob>>,
}

impl ScriptedRunner {
    fn reply(self, role: Role, reply: Reply) -> Self {
        self.replies.lock().unwrap().insert(role, reply);
        self
    }

    fn seen(&self) -> Vec<SeenJob> {
        self.seen.lock().unwrap().clone()
    }

    fn seen_for(&self, role: Role) -> Vec<SeenJob> {
        self.seen().into_iter().filter(|s| s.job.role == role).collect()
    }
}

impl JobRunner for ScriptedRunner {
    fn submit_job(
        &self,
        job: Job,
        _progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<JobOutput, PoolError>> + Send {
        let role = job.role;
        let reply = self.replies.lock().unwrap().get(&role).cloned();
        let system_prompt = std::fs::read_to_string(&job.system_prompt_file).ok();
        self.seen.lock().unwrap().push(SeenJob { job, system_prompt });
        let cancel = cancel.clone();
        async move {
            match reply {
                Some(Reply::Success(output)) => Ok(JobOutput {
                    success: true,
                    output,
                }),
                Some(Reply::Failure(output)) => Ok(JobOutput {
                    success: false,
                    output,
                }),
                Some(Reply::Error(e)) => Err(e),
                Some(Reply::Delay(wait, output)) => {
                    tokio::time::sleep(wait).await;
                    Ok(JobOutput {
                        success: true,
                        output,
                    })
                }
                Some(Reply::Hang) => {
                    cancel.cancelled().await;
                    Err(PoolError::Cancelled { role })
                }
                None => Err(PoolError::Unavailable { role }),
            }
        }
    }
}

struct Workspace {
    _dir: tempfile::TempDir,
    _prompts: tempfile::TempDir,
    store: Arc<Store>,
    runner: Arc<ScriptedRunner>,
    orchestrator: Orchestrator<ScriptedRunner>,
}

async fn workspace(laborers: usize, runner: ScriptedRunner) -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let prompts = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path(), laborers));
    store.init_layout().await.unwrap();
    let runner = Arc::new(runner);
    let orchestrator =
        Orchestrator::new(Arc::clone(&store), Arc::clone(&runner)).with_prompt_dir(prompts.path());
    Workspace {
        _dir: dir,
        _prompts: prompts,
        store,
        runner,
        orchestrator,
    }
}

fn steward_reply(assignments: &[(i64, &str)]) -> String {
    let entries: Vec<String> = assignments
        .iter()
        .map(|(n, desc)| {
            format!(
                r#"{{"ashigaru": {n}, "task_id": "cmd_001_{n}", "parent_cmd": "cmd_001", "description": "{desc}"}}"#
            )
        })
        .collect();
    format!(r#"{{"assignments": [{}]}}"#, entries.join(", "))
}

fn laborer_reply(task_id: &str, result: &str) -> String {
    format!(
        r#"{{"task_id": "{task_id}", "status": "done", "result": "{result}", "skill_candidate_found": false}}"#
    )
}

fn section_lines(dashboard: &str, keyword: &str) -> Vec<String> {
    Document::parse(dashboard)
        .section_body(keyword)
        .unwrap()
        .iter()
        .filter(|l| !l.trim().is_empty())
        .cloned()
        .collect()
}

/// Data rows of the results table, below the header and separator.
fn result_rows(dashboard: &str) -> Vec<String> {
    section_lines(dashboard, "Results").into_iter().skip(2).collect()
}

async fn status_of(store: &Store, id: &str) -> CommandStatus {
    store.find_command(id).await.unwrap().unwrap().status
}

fn exists(path: &Path) -> bool {
    path.try_exists().unwrap()
}

#[tokio::test]
async fn command_runs_end_to_end() {
    let runner = ScriptedRunner::default()
        .reply(
            Role::Steward,
            Reply::Success(steward_reply(&[(1, "extract helper"), (2, "update call sites")])),
        )
        .reply(
            Role::Laborer(1),
            Reply::Success(
                r#"{"task_id": "cmd_001_1", "status": "done", "result": "helper extracted",
                    "skill_candidate_found": true, "skill_candidate_name": "extract-helper",
                    "skill_candidate_description": "pull repeated code into a helper",
                    "skill_candidate_reason": "done three times this week"}"#
                    .to_string(),
            ),
        )
        .reply(
            Role::Laborer(2),
            Reply::Success(laborer_reply("cmd_001_2", "call sites updated")),
        );
    let ws = workspace(8, runner).await;
    let command = ws
        .store
        .enqueue_command("refactor module X", Some("core"), None)
        .await
        .unwrap();
    assert_eq!(command.id, "cmd_001");

    let summary = ws
        .orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();
    assert!(summary.contains("cmd_001"));
    assert!(summary.contains("2 task(s)"));

    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Done);

    let task = ws.store.read_task_record(1).await.unwrap().unwrap();
    assert_eq!(task.task_id, "cmd_001_1");
    assert_eq!(task.parent_cmd, "cmd_001");
    assert_eq!(task.description, "extract helper");

    let first = ws.store.read_report_record(1).await.unwrap().unwrap();
    assert_eq!(first.worker_id, "laborer_1");
    assert_eq!(first.status, "done");
    assert_eq!(first.result, "helper extracted");
    assert!(first.skill_candidate.found);
    let second = ws.store.read_report_record(2).await.unwrap().unwrap();
    assert_eq!(second.task_id, "cmd_001_2");
    assert!(!second.skill_candidate.found);
    assert!(ws.store.read_report_record(3).await.unwrap().is_none());

    let snapshot = ws.store.read_aggregate_status().await.unwrap().unwrap();
    assert_eq!(snapshot.current_task, "cmd_001");
    assert_eq!(snapshot.task_status, "done");
    assert_eq!(snapshot.agents["steward"].current_subtasks, Some(2));
    assert_eq!(
        snapshot.agents["laborer_2"].current_task.as_deref(),
        Some("cmd_001_2")
    );

    let dashboard = ws.store.read_shared_document().await.unwrap();
    let in_progress = section_lines(&dashboard, "In Progress");
    assert_eq!(in_progress.len(), 1);
    assert!(in_progress[0].starts_with("- cmd_001: tasks dispatched (laborer 1: extract helper"));

    let rows = result_rows(&dashboard);
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.contains("| core | extract helper | helper extracted |")));
    assert!(rows.iter().any(|r| r.contains("| core | update call sites | call sites updated |")));

    let skills = section_lines(&dashboard, "Skill Candidates");
    assert_eq!(
        skills,
        vec![
            "- **extract-helper**: pull repeated code into a helper (reason: done three times this week)"
                .to_string()
        ]
    );
    let actions = section_lines(&dashboard, "Action Required");
    assert_eq!(
        actions,
        vec!["- Skill candidate: **extract-helper** [awaiting approval]".to_string()]
    );
    assert!(!dashboard.contains("Last Updated: -"));
}

#[tokio::test]
async fn laborers_run_concurrently() {
    let delay = Duration::from_millis(300);
    let runner = ScriptedRunner::default()
        .reply(
            Role::Steward,
            Reply::Success(steward_reply(&[(1, "a"), (2, "b"), (3, "c")])),
        )
        .reply(
            Role::Laborer(1),
            Reply::Delay(delay, laborer_reply("cmd_001_1", "a done")),
        )
        .reply(
            Role::Laborer(2),
            Reply::Delay(delay, laborer_reply("cmd_001_2", "b done")),
        )
        .reply(
            Role::Laborer(3),
            Reply::Delay(delay, laborer_reply("cmd_001_3", "c done")),
        );
    let ws = workspace(3, runner).await;
    ws.store.enqueue_command("do abc", None, None).await.unwrap();

    let started = std::time::Instant::now();
    ws.orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    // Three 300ms jobs in sequence would take at least 900ms.
    assert!(elapsed < Duration::from_millis(800), "took {elapsed:?}");
    assert_eq!(ws.runner.seen_for(Role::Laborer(3)).len(), 1);
    let dashboard = ws.store.read_shared_document().await.unwrap();
    assert_eq!(result_rows(&dashboard).len(), 3);
    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Done);
}

#[tokio::test]
async fn report_keeps_assigned_task_id() {
    let runner = ScriptedRunner::default()
        .reply(Role::Steward, Reply::Success(steward_reply(&[(1, "a")])))
        .reply(
            Role::Laborer(1),
            Reply::Success(laborer_reply("made_up", "ok")),
        );
    let ws = workspace(2, runner).await;
    ws.store.enqueue_command("do a", None, None).await.unwrap();
    ws.orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();

    let report = ws.store.read_report_record(1).await.unwrap().unwrap();
    assert_eq!(report.task_id, "cmd_001_1");
    assert_eq!(report.result, "ok");
}

#[tokio::test]
async fn system_prompts_are_written_per_job_and_removed() {
    let runner = ScriptedRunner::default()
        .reply(Role::Steward, Reply::Success(steward_reply(&[(1, "a")])))
        .reply(Role::Laborer(1), Reply::Success(laborer_reply("cmd_001_1", "ok")));
    let ws = workspace(2, runner).await;
    std::fs::write(
        ws.store.workspace_root().join("CLAUDE.md"),
        "Workspace rules.",
    )
    .unwrap();
    ws.store.enqueue_command("do a", None, None).await.unwrap();

    ws.orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();

    let steward = ws.runner.seen_for(Role::Steward);
    assert_eq!(steward.len(), 1);
    let prompt = steward[0].system_prompt.as_deref().unwrap();
    assert!(prompt.contains("Workspace rules."));
    assert!(prompt.contains("You are the steward"));
    assert!(steward[0].job.prompt.contains("Command ID: cmd_001"));

    let laborer = ws.runner.seen_for(Role::Laborer(1));
    assert!(laborer[0].system_prompt.as_deref().unwrap().contains("You are a laborer"));
    assert!(laborer[0].job.prompt.contains("cmd_001_1"));

    for seen in ws.runner.seen() {
        assert!(!exists(&seen.job.system_prompt_file));
    }
}

#[tokio::test]
async fn laborer_failure_is_recorded_and_command_still_completes() {
    let runner = ScriptedRunner::default()
        .reply(
            Role::Steward,
            Reply::Success(steward_reply(&[(1, "task one"), (2, "task two"), (3, "task three")])),
        )
        .reply(Role::Laborer(1), Reply::Success(laborer_reply("cmd_001_1", "one ok")))
        .reply(
            Role::Laborer(2),
            Reply::Error(PoolError::Timeout {
                role: Role::Laborer(2),
                timeout: Duration::from_secs(120),
            }),
        )
        .reply(Role::Laborer(3), Reply::Success(laborer_reply("cmd_001_3", "three ok")));
    let ws = workspace(3, runner).await;
    ws.store.enqueue_command("three things", None, None).await.unwrap();

    let summary = ws
        .orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();
    assert!(summary.contains("1 failed"));
    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Done);

    let failed = ws.store.read_report_record(2).await.unwrap().unwrap();
    assert_eq!(failed.status, "failed");
    assert_eq!(failed.task_id, "cmd_001_2");
    assert!(failed.result.contains("timed out"));

    let rows = result_rows(&ws.store.read_shared_document().await.unwrap());
    assert_eq!(rows.len(), 3);
    assert_eq!(rows.iter().filter(|r| r.contains("timed out")).count(), 1);
    assert!(rows.iter().all(|r| r.contains("| - |")));
}

#[tokio::test]
async fn nonzero_exit_and_raw_replies_become_reports() {
    let runner = ScriptedRunner::default()
        .reply(Role::Steward, Reply::Success(steward_reply(&[(1, "a"), (2, "b")])))
        .reply(Role::Laborer(1), Reply::Failure("STDERR: permission denied".to_string()))
        .reply(Role::Laborer(2), Reply::Success("I did it, no JSON though.".to_string()));
    let ws = workspace(2, runner).await;
    ws.store.enqueue_command("a and b", None, None).await.unwrap();

    ws.orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();

    let first = ws.store.read_report_record(1).await.unwrap().unwrap();
    assert_eq!(first.status, "failed");
    assert_eq!(first.result, "STDERR: permission denied");
    let second = ws.store.read_report_record(2).await.unwrap().unwrap();
    assert_eq!(second.status, "done");
    assert_eq!(second.result, "I did it, no JSON though.");
    assert_eq!(second.task_id, "cmd_001_2");
}

#[tokio::test]
async fn fenced_decomposition_is_accepted() {
    let reply = format!(
        "Here is my plan.\n```json\n{}\n```\nLet me know {{if}} anything changes.",
        steward_reply(&[(2, "only task")])
    );
    let runner = ScriptedRunner::default()
        .reply(Role::Steward, Reply::Success(reply))
        .reply(Role::Laborer(2), Reply::Success(laborer_reply("cmd_001_2", "ok")));
    let ws = workspace(4, runner).await;
    ws.store.enqueue_command("fenced", None, None).await.unwrap();

    ws.orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Done);
    assert!(ws.store.read_report_record(2).await.unwrap().is_some());
    assert!(ws.runner.seen_for(Role::Laborer(1)).is_empty());
}

#[tokio::test]
async fn unknown_and_duplicate_laborers_are_dropped() {
    let runner = ScriptedRunner::default()
        .reply(
            Role::Steward,
            Reply::Success(steward_reply(&[(1, "kept"), (9, "out of range"), (1, "duplicate")])),
        )
        .reply(Role::Laborer(1), Reply::Success(laborer_reply("cmd_001_1", "ok")));
    let ws = workspace(3, runner).await;
    ws.store.enqueue_command("mixed", None, None).await.unwrap();

    ws.orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(ws.runner.seen_for(Role::Laborer(1)).len(), 1);
    let task = ws.store.read_task_record(1).await.unwrap().unwrap();
    assert_eq!(task.description, "kept");
    let rows = result_rows(&ws.store.read_shared_document().await.unwrap());
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn reply_without_json_reverts_to_pending() {
    let runner = ScriptedRunner::default().reply(
        Role::Steward,
        Reply::Success("I am not able to split this.".to_string()),
    );
    let ws = workspace(2, runner).await;
    ws.store.enqueue_command("unsplittable", None, None).await.unwrap();
    let before = ws.store.read_shared_document().await.unwrap();

    let err = ws
        .orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Decomposition { .. }));

    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Pending);
    assert!(ws.store.read_task_record(1).await.unwrap().is_none());
    assert_eq!(ws.store.read_shared_document().await.unwrap(), before);
    let snapshot = ws.store.read_aggregate_status().await.unwrap().unwrap();
    assert_eq!(snapshot.task_status, "in_progress");
}

#[tokio::test]
async fn only_out_of_range_assignments_is_a_decomposition_failure() {
    let runner = ScriptedRunner::default()
        .reply(Role::Steward, Reply::Success(steward_reply(&[(0, "zero"), (5, "five")])));
    let ws = workspace(2, runner).await;
    ws.store.enqueue_command("nobody", None, None).await.unwrap();

    let err = ws
        .orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Decomposition { .. }));
    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Pending);
}

#[tokio::test]
async fn steward_failure_records_failed_snapshot() {
    let ws = workspace(2, ScriptedRunner::default()).await;
    ws.store.enqueue_command("no steward", None, None).await.unwrap();

    let err = ws
        .orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Steward { .. }));

    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Pending);
    let snapshot = ws.store.read_aggregate_status().await.unwrap().unwrap();
    assert_eq!(snapshot.current_task, "cmd_001");
    assert_eq!(snapshot.task_status, "failed");
}

#[tokio::test]
async fn missing_command_is_not_found() {
    let ws = workspace(2, ScriptedRunner::default()).await;
    ws.store.enqueue_command("exists", None, None).await.unwrap();

    let err = ws
        .orchestrator
        .run("cmd_999", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::CommandNotFound { ref id } if id == "cmd_999"));
    assert!(ws.runner.seen().is_empty());
    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Pending);
}

#[tokio::test]
async fn cancellation_reverts_the_command() {
    let runner = ScriptedRunner::default()
        .reply(Role::Steward, Reply::Success(steward_reply(&[(1, "slow"), (2, "slower")])))
        .reply(Role::Laborer(1), Reply::Hang)
        .reply(Role::Laborer(2), Reply::Hang);
    let ws = workspace(2, runner).await;
    ws.store.enqueue_command("never finishes", None, None).await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(Duration::from_secs(5), ws.orchestrator.run("cmd_001", &cancel))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Cancelled));
    assert_eq!(status_of(&ws.store, "cmd_001").await, CommandStatus::Pending);
    let snapshot = ws.store.read_aggregate_status().await.unwrap().unwrap();
    assert_eq!(snapshot.task_status, "failed");
    assert!(result_rows(&ws.store.read_shared_document().await.unwrap()).is_empty());
}

#[tokio::test]
async fn submit_enqueues_the_resolved_instruction() {
    let runner = ScriptedRunner::default()
        .reply(
            Role::Commander,
            Reply::Success("```\nrefactor module X\n```".to_string()),
        )
        .reply(Role::Steward, Reply::Success(steward_reply(&[(1, "refactor")])))
        .reply(Role::Laborer(1), Reply::Success(laborer_reply("cmd_001_1", "done")));
    let ws = workspace(2, runner).await;

    ws.orchestrator
        .submit("please tidy up module X", Some("core"), &CancellationToken::new())
        .await
        .unwrap();

    let queue = ws.store.read_queue().await.unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].text, "refactor module X");
    assert_eq!(queue[0].project.as_deref(), Some("core"));
    assert_eq!(queue[0].status, CommandStatus::Done);
    let commander = ws.runner.seen_for(Role::Commander);
    assert!(commander[0].job.prompt.contains("please tidy up module X"));
}

#[tokio::test]
async fn unavailable_commander_falls_back_to_raw_input() {
    let ws = workspace(2, ScriptedRunner::default()).await;

    let resolved = ws
        .orchestrator
        .resolve_command("  fix the build  ", None, &CancellationToken::new())
        .await;
    assert_eq!(resolved, "  fix the build  ");
}

#[tokio::test]
async fn configured_models_travel_with_jobs() {
    let runner = ScriptedRunner::default()
        .reply(Role::Steward, Reply::Success(steward_reply(&[(1, "a")])))
        .reply(Role::Laborer(1), Reply::Success(laborer_reply("cmd_001_1", "ok")));
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path(), 1));
    store.init_layout().await.unwrap();
    let runner = Arc::new(runner);
    let orchestrator = Orchestrator::new(Arc::clone(&store), Arc::clone(&runner))
        .with_prompt_dir(dir.path())
        .with_models(ModelConfig {
            steward: Some("big-model".to_string()),
            ..ModelConfig::default()
        });
    store.enqueue_command("models", None, None).await.unwrap();

    orchestrator
        .run("cmd_001", &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        runner.seen_for(Role::Steward)[0].job.model.as_deref(),
        Some("big-model")
    );
    assert_eq!(runner.seen_for(Role::Laborer(1))[0].job.model, None);
}
