//! Per-role job slot: the one-job-in-flight guard and result correlation.

use shogun_core::Role;
use tokio::sync::{mpsc, oneshot};

use super::{JobOutput, PoolError, ProgressEvent};

pub(super) type Outcome = Result<JobOutput, PoolError>;

struct PendingJob {
    id: u64,
    result_tx: oneshot::Sender<Outcome>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

/// What happened to a `RESULT:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Delivery {
    Delivered,
    /// Reply to a job that already timed out or was cancelled.
    Orphan,
    /// No job was waiting.
    Unsolicited,
}

/// Correlation state for one role.
///
/// `orphaned` counts requests still in flight inside the process whose
/// caller has given up; that many `RESULT:` lines are dropped before the
/// next one is delivered. A slot is `closed` once its process is gone and
/// accepts no further jobs.
#[derive(Default)]
pub(super) struct JobSlot {
    pending: Option<PendingJob>,
    orphaned: usize,
    next_id: u64,
    closed: bool,
}

impl JobSlot {
    /// Claim the slot. Fails with `Busy` while another job is outstanding
    /// and with `Terminated` after [`JobSlot::fail`].
    pub fn install(
        &mut self,
        role: Role,
        result_tx: oneshot::Sender<Outcome>,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<u64, PoolError> {
        if self.closed {
            return Err(PoolError::Terminated { role });
        }
        if self.pending.is_some() {
            return Err(PoolError::Busy { role });
        }
        self.next_id += 1;
        self.pending = Some(PendingJob {
            id: self.next_id,
            result_tx,
            progress,
        });
        Ok(self.next_id)
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Forward progress to the current job's sink, unless the line belongs
    /// to an orphaned request.
    pub fn progress(&self, role: Role, text: String) {
        if self.orphaned > 0 {
            return;
        }
        if let Some(PendingJob {
            progress: Some(sink),
            ..
        }) = &self.pending
        {
            let _ = sink.send(ProgressEvent { role, text });
        }
    }

    pub fn deliver(&mut self, outcome: Outcome) -> Delivery {
        if self.orphaned > 0 {
            self.orphaned -= 1;
            return Delivery::Orphan;
        }
        match self.pending.take() {
            Some(job) => {
                let _ = job.result_tx.send(outcome);
                Delivery::Delivered
            }
            None => Delivery::Unsolicited,
        }
    }

    /// Give up on job `id` after its request was written. Returns `false`
    /// when the job is no longer installed (its result already arrived).
    pub fn abandon(&mut self, id: u64) -> bool {
        if self.pending.as_ref().is_some_and(|job| job.id == id) {
            self.pending = None;
            self.orphaned += 1;
            true
        } else {
            false
        }
    }

    /// Drop job `id` whose request never reached the process.
    pub fn release(&mut self, id: u64) {
        if self.pending.as_ref().is_some_and(|job| job.id == id) {
            self.pending = None;
        }
    }

    /// Resolve the outstanding job, if any, with `error` and close the slot.
    pub fn fail(&mut self, error: PoolError) {
        if let Some(job) = self.pending.take() {
            let _ = job.result_tx.send(Err(error));
        }
        self.orphaned = 0;
        self.closed = true;
    }
}
