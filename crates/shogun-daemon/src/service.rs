//! Queue-watching service behind `shogun serve`.
//!
//! Runs pending commands one at a time: the steward has a single job slot,
//! so concurrent commands would only collide on it. The queue is rescanned
//! when its file changes and on a fallback interval.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestration::Orchestrator;
use crate::pool::JobRunner;
use crate::storage::{Command, CommandStatus, StoreError};

/// Default fallback rescan period.
pub const DEFAULT_RESCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Errors from the queue service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),
}

pub struct QueueService<R> {
    orchestrator: Arc<Orchestrator<R>>,
    rescan_interval: Duration,
    /// Commands already run this session, successful or not.
    attempted: HashSet<String>,
}

impl<R: JobRunner> QueueService<R> {
    pub fn new(orchestrator: Arc<Orchestrator<R>>) -> Self {
        Self {
            orchestrator,
            rescan_interval: DEFAULT_RESCAN_INTERVAL,
            attempted: HashSet::new(),
        }
    }

    #[must_use]
    pub const fn with_rescan_interval(mut self, interval: Duration) -> Self {
        self.rescan_interval = interval;
        self
    }

    /// Process the queue until `shutdown` fires.
    ///
    /// Shutdown also cancels the command in flight, which then unwinds
    /// through the orchestrator's failure path.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), ServiceError> {
        let store = Arc::clone(self.orchestrator.store());
        let (change_tx, mut change_rx) = mpsc::unbounded_channel();
        let queue_path = store.queue_path();
        let _watcher = watch_queue(&queue_path, change_tx)?;

        let mut interval = tokio::time::interval(self.rescan_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(queue = %queue_path.display(), "Queue service running");

        loop {
            while let Some(command) = self.next_command().await? {
                if shutdown.is_cancelled() {
                    break;
                }
                self.attempted.insert(command.id.clone());
                info!(command_id = %command.id, "Running queued command");
                match self.orchestrator.run(&command.id, &shutdown.child_token()).await {
                    Ok(summary) => info!(command_id = %command.id, summary = %summary, "Command finished"),
                    Err(e) => warn!(command_id = %command.id, error = %e, "Command failed"),
                }
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => debug!("Periodic queue rescan"),
                Some(()) = change_rx.recv() => {
                    while change_rx.try_recv().is_ok() {}
                    debug!("Queue file changed");
                }
            }
        }

        info!("Queue service stopped");
        Ok(())
    }

    async fn next_command(&self) -> Result<Option<Command>, StoreError> {
        let queue = self.orchestrator.store().read_queue().await?;
        Ok(first_runnable(queue, &self.attempted))
    }
}

/// First pending command not yet attempted.
fn first_runnable(queue: Vec<Command>, attempted: &HashSet<String>) -> Option<Command> {
    queue
        .into_iter()
        .find(|c| c.status == CommandStatus::Pending && !attempted.contains(&c.id))
}

/// Watch the queue file's directory; writes replace the file by rename, so
/// the file itself cannot be watched.
fn watch_queue(
    queue_path: &Path,
    change_tx: mpsc::UnboundedSender<()>,
) -> Result<RecommendedWatcher, ServiceError> {
    let file_name = queue_path.file_name().map(std::ffi::OsStr::to_os_string);
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
        let Ok(event) = res else {
            return;
        };
        let relevant = matches!(
            event.kind,
            EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
        ) && event
            .paths
            .iter()
            .any(|p| p.file_name().map(std::ffi::OsStr::to_os_string) == file_name);
        if relevant {
            let _ = change_tx.send(());
        }
    })?;

    if let Some(dir) = queue_path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| StoreError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
    }
    Ok(watcher)
}
