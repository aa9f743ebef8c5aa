//! Snapshot delivery shared by the progress drivers.
//!
//! Each tracked run owns a [`RunGate`]: the job's [`TrackedJob`] state plus
//! the sending half of its snapshot channel. Every emission goes through
//! the gate under its lock, and the gate closes itself on the first
//! terminal snapshot, so a run delivers exactly one terminal and nothing
//! after it, whichever of the tick task, the watchdog, or a caller's
//! `stop` gets there first.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use toonify_core::job::{FailureKind, JobFailure, JobResults, JobSnapshot, TrackedJob};
use toonify_core::types::JobId;

/// Receiving half of a run's snapshot stream. Ends after the terminal
/// snapshot.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<JobSnapshot>;

pub(crate) struct RunGate {
    job: TrackedJob,
    sender: Option<mpsc::UnboundedSender<JobSnapshot>>,
}

impl RunGate {
    /// Open a gate and deliver the job's initial snapshot immediately.
    pub(crate) fn open(job: TrackedJob) -> (Self, SnapshotReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gate = Self {
            job,
            sender: Some(tx),
        };
        gate.emit();
        (gate, rx)
    }

    pub(crate) fn job(&self) -> &TrackedJob {
        &self.job
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender.is_none()
    }

    /// Record and deliver a progress observation. Returns `false` once the
    /// gate is closed.
    pub(crate) fn progress(&mut self, progress: f64, time_remaining_ms: u64) -> bool {
        if self.is_closed() || !self.job.advance(progress, time_remaining_ms) {
            return false;
        }
        self.emit();
        true
    }

    /// Replace the step label shown by later snapshots.
    pub(crate) fn set_step_label(&mut self, label: Option<String>) {
        if !self.is_closed() {
            self.job.set_step_label(label);
        }
    }

    /// Merge outputs available before completion into later snapshots.
    pub(crate) fn attach_partial_results(&mut self, partial: JobResults) -> bool {
        !self.is_closed() && self.job.attach_partial_results(partial)
    }

    pub(crate) fn succeed(&mut self, results: JobResults) -> bool {
        if self.is_closed() || !self.job.succeed(results) {
            return false;
        }
        self.finish();
        true
    }

    pub(crate) fn fail(&mut self, failure: JobFailure) -> bool {
        if self.is_closed() || !self.job.fail(failure) {
            return false;
        }
        self.finish();
        true
    }

    fn finish(&mut self) {
        self.emit();
        self.sender = None;
    }

    fn emit(&self) {
        if let Some(tx) = &self.sender {
            // A dropped receiver only means nobody is listening any more.
            let _ = tx.send(self.job.snapshot());
        }
    }
}

pub(crate) type SharedGate = Arc<Mutex<RunGate>>;

/// Control handle for one tracked run.
///
/// Cloneable; all clones address the same run.
#[derive(Clone)]
pub struct TrackingHandle {
    job_id: JobId,
    gate: SharedGate,
    cancel: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for TrackingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingHandle")
            .field("job_id", &self.job_id)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl TrackingHandle {
    pub(crate) fn new(job_id: JobId, gate: RunGate) -> Self {
        Self {
            job_id,
            gate: Arc::new(Mutex::new(gate)),
            cancel: CancellationToken::new(),
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn gate(&self) -> SharedGate {
        Arc::clone(&self.gate)
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Register the task driving this run so `stop` can abort it.
    pub(crate) async fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock().await = Some(task);
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The latest observation of the run.
    pub async fn snapshot(&self) -> JobSnapshot {
        self.gate.lock().await.job().snapshot()
    }

    /// Whether the run has delivered its terminal snapshot.
    pub async fn is_finished(&self) -> bool {
        self.gate.lock().await.is_closed()
    }

    /// Halt the run, delivering a `cancelled` terminal if it had none yet.
    ///
    /// Returns after the driving task has stopped. Returns `true` if this
    /// call delivered the terminal.
    pub async fn stop(&self) -> bool {
        self.halt(JobFailure::cancelled()).await
    }

    /// Halt the run with a backend failure carrying `message`.
    pub async fn fail(&self, message: impl Into<String>) -> bool {
        self.halt(JobFailure::new(FailureKind::Backend, message))
            .await
    }

    async fn halt(&self, failure: JobFailure) -> bool {
        let delivered = self.gate.lock().await.fail(failure);
        self.cancel.cancel();

        if let Some(task) = self.task.lock().await.take() {
            task.abort();
            let _ = task.await;
        }
        delivered
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
