//! Worker pool lifecycle: startup, job submission, shutdown.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shogun_core::Role;
use shogun_core::protocol::{JobRequest, RunnerLine, parse_line, request_line};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::slot::{Delivery, JobSlot};
use super::{FIXED_ENV, Job, JobOutput, JobRunner, PoolConfig, PoolError, ProgressEvent, ReadyNotice};

type Registry = Arc<RwLock<HashMap<Role, Arc<Worker>>>>;

/// One pooled process and its job slot.
struct Worker {
    role: Role,
    /// Distinguishes this process from a later one registered for the same
    /// role.
    generation: uuid::Uuid,
    pid: Option<u32>,
    stdin_tx: mpsc::Sender<String>,
    slot: Mutex<JobSlot>,
    shutdown: CancellationToken,
}

impl Worker {
    fn slot(&self) -> MutexGuard<'_, JobSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Kill the whole process group, then let the lifetime task reap.
    fn kill(&self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            // SAFETY: pid is the leader of a process group we created at
            // spawn; killpg(2) has no memory-safety preconditions.
            #[allow(unsafe_code, clippy::cast_possible_wrap)]
            let ret = unsafe { libc::killpg(pid as i32, libc::SIGKILL) };
            if ret != 0 {
                let err = std::io::Error::last_os_error();
                debug!(role = %self.role, pid, error = %err, "killpg failed");
            }
        }
        self.shutdown.cancel();
    }
}

/// Clears an abandoned job from its slot if the submitting future goes away
/// before the job resolves.
struct InFlight {
    worker: Arc<Worker>,
    id: u64,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.worker.slot().abandon(self.id);
    }
}

/// Registry of one persistent runner process per role.
pub struct WorkerPool {
    config: PoolConfig,
    workers: Registry,
    /// Held for the whole of `start_all`/`stop_all`; the flag is the started
    /// state.
    started: tokio::sync::Mutex<bool>,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            workers: Arc::new(RwLock::new(HashMap::new())),
            started: tokio::sync::Mutex::new(false),
        }
    }

    pub const fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub async fn is_started(&self) -> bool {
        *self.started.lock().await
    }

    /// Roles with a live process, in role order.
    pub async fn roles(&self) -> Vec<Role> {
        let mut roles: Vec<Role> = self.workers.read().await.keys().copied().collect();
        roles.sort();
        roles
    }

    /// Whether a job is outstanding for `role`.
    pub async fn is_busy(&self, role: Role) -> bool {
        self.workers
            .read()
            .await
            .get(&role)
            .is_some_and(|w| w.slot().is_busy())
    }

    /// Start one process per role.
    ///
    /// The runner executable and the working directory are checked first;
    /// if either is missing nothing is started. A spawn failure for one role
    /// is logged and the remaining roles still start. Calling this again
    /// while started is a no-op returning no notices.
    pub async fn start_all(&self, roles: &[Role]) -> Result<Vec<ReadyNotice>, PoolError> {
        let mut started = self.started.lock().await;
        if *started {
            debug!("Worker pool already started");
            return Ok(Vec::new());
        }

        let program = resolve_program(&self.config.program).ok_or_else(|| PoolError::Startup {
            reason: format!("runner executable not found: {}", self.config.program.display()),
        })?;
        if !self.config.working_dir.is_dir() {
            return Err(PoolError::Startup {
                reason: format!(
                    "working directory does not exist: {}",
                    self.config.working_dir.display()
                ),
            });
        }

        let mut notices = Vec::with_capacity(roles.len());
        for &role in roles {
            match self.spawn_worker(&program, role) {
                Ok(worker) => {
                    notices.push(ReadyNotice {
                        role,
                        pid: worker.pid,
                    });
                    if let Some(old) = self.workers.write().await.insert(role, worker) {
                        old.kill();
                    }
                }
                Err(e) => error!(%role, error = %e, "Failed to start worker process"),
            }
        }

        *started = true;
        info!(
            started = notices.len(),
            requested = roles.len(),
            "Worker pool started"
        );
        Ok(notices)
    }

    /// Run one job on `job.role`'s process.
    ///
    /// Rejected with `Unavailable` when the role has no process and with
    /// `Busy` when a job is already outstanding; neither writes anything to
    /// the process. Otherwise resolves with exactly one of: the `RESULT:`
    /// payload, `Timeout` after the configured bound, or `Cancelled`.
    /// `OUT:` lines received meanwhile go to `progress`.
    pub async fn submit_job(
        &self,
        job: Job,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
        cancel: &CancellationToken,
    ) -> Result<JobOutput, PoolError> {
        let role = job.role;
        let worker = self
            .workers
            .read()
            .await
            .get(&role)
            .cloned()
            .ok_or(PoolError::Unavailable { role })?;

        let line = request_line(&JobRequest {
            prompt: job.prompt,
            system_prompt_file: job.system_prompt_file.to_string_lossy().into_owned(),
            model: job.model,
        })
        .map_err(|e| PoolError::Protocol(e.to_string()))?;

        let (result_tx, mut result_rx) = oneshot::channel();
        let id = worker.slot().install(role, result_tx, progress)?;
        let in_flight = InFlight {
            worker: Arc::clone(&worker),
            id,
        };

        if worker.stdin_tx.send(line).await.is_err() {
            worker.slot().release(id);
            return Err(PoolError::Terminated { role });
        }
        debug!(%role, job = id, "Job dispatched");

        let timeout = self.config.job_timeout;
        let outcome = tokio::select! {
            received = &mut result_rx => {
                received.unwrap_or(Err(PoolError::Terminated { role }))
            }
            () = tokio::time::sleep(timeout) => {
                warn!(%role, job = id, timeout_secs = timeout.as_secs(), "Job timed out");
                give_up(&worker, id, &mut result_rx, PoolError::Timeout { role, timeout })
            }
            () = cancel.cancelled() => {
                info!(%role, job = id, "Job cancelled");
                give_up(&worker, id, &mut result_rx, PoolError::Cancelled { role })
            }
        };
        drop(in_flight);
        outcome
    }

    /// Kill every pooled process, fail all outstanding jobs with
    /// `Terminated`, clear the registry and allow a later `start_all`.
    pub async fn stop_all(&self) {
        let mut started = self.started.lock().await;
        let workers: Vec<Arc<Worker>> = self.workers.write().await.drain().map(|(_, w)| w).collect();
        for worker in &workers {
            worker.slot().fail(PoolError::Terminated { role: worker.role });
            worker.kill();
        }
        *started = false;
        info!(stopped = workers.len(), "Worker pool stopped");
    }

    fn spawn_worker(&self, program: &Path, role: Role) -> Result<Arc<Worker>, PoolError> {
        let mut cmd = Command::new(program);
        cmd.args(&self.config.args)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in FIXED_ENV {
            cmd.env(key, value);
        }
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| PoolError::Io(e.to_string()))?;
        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| PoolError::Io("failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PoolError::Io("failed to capture stdout".to_string()))?;
        let stderr = child.stderr.take();

        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = stdin_rx.recv().await {
                if let Err(e) = stdin.write_all(format!("{line}\n").as_bytes()).await {
                    error!(%role, "Failed to write to stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    error!(%role, "Failed to flush stdin: {}", e);
                    break;
                }
            }
        });

        let worker = Arc::new(Worker {
            role,
            generation: uuid::Uuid::new_v4(),
            pid,
            stdin_tx,
            slot: Mutex::new(JobSlot::default()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(read_stdout(
            stdout,
            Arc::clone(&worker),
            Arc::clone(&self.workers),
        ));

        if let Some(stderr) = stderr {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(%role, "stderr: {}", line);
                }
                debug!(%role, "stderr reader finished");
            });
        }

        tokio::spawn(watch_lifetime(child, role, worker.shutdown.clone()));

        info!(%role, pid = ?pid, "Worker process started");
        Ok(worker)
    }
}

impl JobRunner for WorkerPool {
    fn submit_job(
        &self,
        job: Job,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<JobOutput, PoolError>> + Send {
        Self::submit_job(self, job, progress, cancel)
    }
}

/// Abandon job `id` unless its result slipped in at the same moment.
fn give_up(
    worker: &Worker,
    id: u64,
    result_rx: &mut oneshot::Receiver<Result<JobOutput, PoolError>>,
    error: PoolError,
) -> Result<JobOutput, PoolError> {
    if worker.slot().abandon(id) {
        return Err(error);
    }
    result_rx.try_recv().unwrap_or(Err(error))
}

/// Classify stdout lines and route them to the role's job slot. On EOF the
/// outstanding job fails and the role leaves the registry.
async fn read_stdout(stdout: ChildStdout, worker: Arc<Worker>, workers: Registry) {
    let role = worker.role;
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                RunnerLine::Progress(text) => worker.slot().progress(role, text),
                RunnerLine::Result(result) => {
                    let outcome = Ok(JobOutput {
                        success: result.is_success(),
                        output: result.output,
                    });
                    log_delivery(role, worker.slot().deliver(outcome));
                }
                RunnerLine::MalformedResult(raw) => {
                    warn!(%role, payload = %raw, "Malformed RESULT payload");
                    let outcome = Ok(JobOutput {
                        success: false,
                        output: raw,
                    });
                    log_delivery(role, worker.slot().deliver(outcome));
                }
                RunnerLine::Other(text) => debug!(%role, "stdout: {}", text),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(%role, error = %e, "Failed to read stdout");
                break;
            }
        }
    }

    worker.slot().fail(PoolError::Terminated { role });
    let mut registry = workers.write().await;
    if registry
        .get(&role)
        .is_some_and(|w| w.generation == worker.generation)
    {
        registry.remove(&role);
        warn!(%role, "Worker process exited; role removed from pool");
    }
}

fn log_delivery(role: Role, delivery: Delivery) {
    match delivery {
        Delivery::Delivered => debug!(%role, "Job result delivered"),
        Delivery::Orphan => info!(%role, "Discarded late result of abandoned job"),
        Delivery::Unsolicited => warn!(%role, "RESULT received with no job outstanding"),
    }
}

/// Own the child until it exits or the pool kills it.
async fn watch_lifetime(mut child: Child, role: Role, shutdown: CancellationToken) {
    tokio::select! {
        status = child.wait() => match status {
            Ok(status) => info!(%role, ?status, "Worker process exited"),
            Err(e) => warn!(%role, error = %e, "Error waiting for worker process"),
        },
        () = shutdown.cancelled() => {
            child.kill().await.ok();
            debug!(%role, "Worker process killed");
        }
    }
}

/// A path containing a separator must exist as given; a bare name is looked
/// up on `PATH`.
fn resolve_program(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 {
        return program.is_file().then(|| program.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| candidate.is_file())
}
