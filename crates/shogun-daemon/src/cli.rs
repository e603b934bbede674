//! Subcommand handlers for the `shogun` binary.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shogun_core::{Config, Role};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use shogun_daemon::orchestration::Orchestrator;
use shogun_daemon::pool::{PoolConfig, ProgressEvent, WorkerPool};
use shogun_daemon::runner::{self, RunnerConfig};
use shogun_daemon::service::QueueService;
use shogun_daemon::storage::Store;

/// Resolved configuration shared by every subcommand.
pub struct Context {
    pub config: Config,
    pub root: PathBuf,
}

impl Context {
    fn store(&self) -> Arc<Store> {
        Arc::new(Store::new(&self.root, self.config.workspace.laborer_count))
    }
}

pub async fn init(ctx: &Context) -> anyhow::Result<()> {
    ctx.store().init_layout().await?;
    writeln!(io::stdout(), "Workspace ready at {}", ctx.root.display())?;
    Ok(())
}

pub async fn enqueue(
    ctx: &Context,
    text: &str,
    project: Option<&str>,
    priority: Option<&str>,
) -> anyhow::Result<()> {
    let command = ctx.store().enqueue_command(text, project, priority).await?;
    writeln!(io::stdout(), "{}", command.id)?;
    Ok(())
}

pub async fn status(ctx: &Context) -> anyhow::Result<()> {
    let store = ctx.store();
    let mut out = io::stdout();
    let queue = store.read_queue().await?;
    if queue.is_empty() {
        writeln!(out, "Queue is empty.")?;
    } else {
        writeln!(out, "{:<10}  {:<12}  {:<12}  COMMAND", "ID", "STATUS", "PROJECT")?;
        for command in &queue {
            writeln!(
                out,
                "{:<10}  {:<12}  {:<12}  {}",
                command.id,
                command.status.as_str(),
                command.project.as_deref().unwrap_or("-"),
                command.text.lines().next().unwrap_or_default(),
            )?;
        }
    }
    if let Some(snapshot) = store.read_aggregate_status().await? {
        writeln!(
            out,
            "\nLast run: {} {} at {}",
            snapshot.current_task, snapshot.task_status, snapshot.last_updated
        )?;
        for (agent, state) in &snapshot.agents {
            writeln!(
                out,
                "  {agent:<12} {:<12} {}",
                state.status,
                state.current_task.as_deref().unwrap_or("-")
            )?;
        }
    }
    Ok(())
}

pub async fn run(ctx: &Context, id: &str) -> anyhow::Result<()> {
    with_orchestrator(ctx, |orchestrator, cancel| async move {
        orchestrator.run(id, &cancel).await
    })
    .await
}

pub async fn submit(ctx: &Context, text: &str, project: Option<&str>) -> anyhow::Result<()> {
    with_orchestrator(ctx, |orchestrator, cancel| async move {
        orchestrator.submit(text, project, &cancel).await
    })
    .await
}

pub async fn serve(ctx: &Context, rescan_secs: u64) -> anyhow::Result<()> {
    let store = ctx.store();
    store.init_layout().await?;
    let pool = start_pool(ctx).await?;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            info!(role = %event.role, "{}", event.text);
        }
    });

    let orchestrator = Arc::new(orchestrator(ctx, store, Arc::clone(&pool)).with_progress(progress_tx));
    let service = QueueService::new(orchestrator)
        .with_rescan_interval(Duration::from_secs(rescan_secs.max(1)));
    let shutdown = CancellationToken::new();

    // Tell systemd the pool is up.
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    let service_shutdown = shutdown.clone();
    let mut service_task = tokio::spawn(async move { service.run(service_shutdown).await });

    tokio::select! {
        result = &mut service_task => {
            pool.stop_all().await;
            result??;
            return Ok(());
        }
        result = shutdown_signal() => result?,
    }

    shutdown.cancel();
    pool.stop_all().await;
    service_task.await??;
    progress_task.abort();
    info!("Shogun stopped");
    Ok(())
}

pub async fn runner(ctx: &Context, timeout_secs: Option<u64>) -> anyhow::Result<()> {
    let config = RunnerConfig {
        claude_bin: ctx.config.runtime.claude_bin.clone(),
        working_dir: ctx.root.clone(),
        child_timeout: Duration::from_secs(
            timeout_secs.unwrap_or(ctx.config.runtime.runner_job_timeout_secs),
        ),
    };
    runner::run_stdio(config).await?;
    Ok(())
}

/// Start the pool, run `f` with an orchestrator over it, print the summary
/// and stop the pool. Ctrl+C cancels the run.
async fn with_orchestrator<F, Fut>(ctx: &Context, f: F) -> anyhow::Result<()>
where
    F: FnOnce(Arc<Orchestrator<WorkerPool>>, CancellationToken) -> Fut,
    Fut: Future<
        Output = Result<String, shogun_daemon::orchestration::OrchestrationError>,
    >,
{
    let pool = start_pool(ctx).await?;

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressEvent>();
    let printer = tokio::spawn(async move {
        let mut out = io::stdout();
        while let Some(event) = progress_rx.recv().await {
            if writeln!(out, "[{}] {}", event.role, event.text).is_err() {
                break;
            }
        }
    });

    let orchestrator =
        Arc::new(orchestrator(ctx, ctx.store(), Arc::clone(&pool)).with_progress(progress_tx));
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if shutdown_signal().await.is_ok() {
            signal_cancel.cancel();
        }
    });

    let result = f(orchestrator, cancel).await;
    signal_task.abort();
    pool.stop_all().await;
    let _ = printer.await;

    let summary = result?;
    writeln!(io::stdout(), "{summary}")?;
    Ok(())
}

fn orchestrator(ctx: &Context, store: Arc<Store>, pool: Arc<WorkerPool>) -> Orchestrator<WorkerPool> {
    Orchestrator::new(store, pool)
        .with_models(ctx.config.models.clone())
        .with_dashboard(ctx.config.dashboard.clone())
}

/// Start one runner process per role: `shogun runner` re-executed from the
/// current binary. Runner stderr is relayed at `warn`, so runners only log
/// warnings.
async fn start_pool(ctx: &Context) -> anyhow::Result<Arc<WorkerPool>> {
    let exe = std::env::current_exe()?;
    let runtime = &ctx.config.runtime;
    let pool_config = PoolConfig::new(exe, &ctx.root)
        .with_args([
            "--workspace".to_string(),
            ctx.root.to_string_lossy().into_owned(),
            "--claude-bin".to_string(),
            runtime.claude_bin.to_string_lossy().into_owned(),
            "--log-level".to_string(),
            "warn".to_string(),
            "runner".to_string(),
            "--timeout-secs".to_string(),
            runtime.runner_job_timeout_secs.to_string(),
        ])
        .with_job_timeout(Duration::from_secs(runtime.job_timeout_secs));

    let pool = Arc::new(WorkerPool::new(pool_config));
    let notices = pool
        .start_all(&Role::roster(ctx.config.workspace.laborer_count))
        .await?;
    for notice in &notices {
        debug!(role = %notice.role, pid = ?notice.pid, "Worker ready");
    }
    info!(workers = notices.len(), "Worker pool ready");
    Ok(pool)
}

/// Wait for Ctrl+C or (on unix) SIGTERM.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C shutdown signal"),
        _ = sigterm_future => info!("Received SIGTERM shutdown signal"),
    }
    Ok(())
}
