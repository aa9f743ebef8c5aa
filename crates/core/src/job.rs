//! Job lifecycle types: status, results, failures, and snapshots.
//!
//! A [`TrackedJob`] is the mutable state a progress driver keeps for one
//! job. Its phase is always derived from its progress through the job's
//! [`PhaseTable`], and its progress never decreases. Each observation
//! handed to subscribers is an immutable [`JobSnapshot`].

use serde::{Deserialize, Serialize};

use crate::phase::{PhaseDefinition, PhaseTable, PROGRESS_MAX, PROGRESS_MIN};
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Starting,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

// ---------------------------------------------------------------------------
// Results and failures
// ---------------------------------------------------------------------------

/// One styled character image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledResult {
    pub style: String,
    pub image_url: String,
    pub thumbnail_url: String,
}

/// Outputs of a job. Running jobs may carry a partial set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResults {
    /// Reference to the generated 3D mesh, when the backend produced one.
    #[serde(default)]
    pub mesh_model: Option<String>,
    #[serde(default)]
    pub styled_results: Vec<StyledResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The collaborator refused or could not accept the job.
    Submission,
    /// The collaborator failed while the job was running.
    Backend,
    /// Tracking was stopped before the job finished.
    Cancelled,
    /// The watchdog deadline passed without a terminal state.
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "Job tracking was cancelled")
    }

    pub fn timed_out() -> Self {
        Self::new(
            FailureKind::TimedOut,
            "Job did not finish before the watchdog deadline",
        )
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A job accepted by the generation collaborator, ready to be tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub submitted_at: Timestamp,
    pub total_duration_ms: u64,
    pub phases: PhaseTable,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One observation of a job, as delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: f64,
    pub phase_id: String,
    pub phase_index: usize,
    /// Human-readable label of the current phase.
    pub step_label: String,
    pub time_remaining_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub results: Option<JobResults>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub failure: Option<JobFailure>,
}

impl JobSnapshot {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(&self.failure, Some(f) if f.kind == FailureKind::Cancelled)
    }
}

// ---------------------------------------------------------------------------
// TrackedJob
// ---------------------------------------------------------------------------

/// Mutable tracking state of one job.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedJob {
    id: JobId,
    submitted_at: Timestamp,
    total_duration_ms: u64,
    status: JobStatus,
    progress: f64,
    time_remaining_ms: u64,
    /// Backend-reported step description; the phase label when `None`.
    step_label: Option<String>,
    results: Option<JobResults>,
    failure: Option<JobFailure>,
    phases: PhaseTable,
}

impl TrackedJob {
    /// A job in `Starting` at progress 0 with its full duration remaining.
    pub fn new(handle: &JobHandle) -> Self {
        Self {
            id: handle.job_id.clone(),
            submitted_at: handle.submitted_at,
            total_duration_ms: handle.total_duration_ms,
            status: JobStatus::Starting,
            progress: PROGRESS_MIN,
            time_remaining_ms: handle.total_duration_ms,
            step_label: None,
            results: None,
            failure: None,
            phases: handle.phases.clone(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn submitted_at(&self) -> Timestamp {
        self.submitted_at
    }

    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The phase containing the current progress.
    pub fn phase(&self) -> &PhaseDefinition {
        self.phases.phase_for_progress(self.progress)
    }

    pub fn phase_index(&self) -> usize {
        self.phases.index_for_progress(self.progress)
    }

    pub fn phases(&self) -> &PhaseTable {
        &self.phases
    }

    /// Record a progress observation.
    ///
    /// Progress is clamped to `[0, 100]` and to the highest value seen so
    /// far. Returns `false` (and changes nothing) once the job is terminal.
    pub fn advance(&mut self, progress: f64, time_remaining_ms: u64) -> bool {
        if self.is_terminal() {
            return false;
        }
        let progress = if progress.is_nan() {
            PROGRESS_MIN
        } else {
            progress.clamp(PROGRESS_MIN, PROGRESS_MAX)
        };
        self.progress = self.progress.max(progress);
        self.time_remaining_ms = time_remaining_ms;
        self.status = JobStatus::Running;
        true
    }

    /// Show `label` instead of the phase label. Blank or `None` restores
    /// the phase label. Ignored once terminal.
    pub fn set_step_label(&mut self, label: Option<String>) {
        if self.is_terminal() {
            return;
        }
        self.step_label = label.filter(|l| !l.trim().is_empty());
    }

    /// Merge outputs that exist before the job finishes.
    ///
    /// A present mesh replaces the known one and a non-empty style list
    /// replaces the known list; absent parts keep what was there. Returns
    /// `false` (and changes nothing) once the job is terminal.
    pub fn attach_partial_results(&mut self, partial: JobResults) -> bool {
        if self.is_terminal() {
            return false;
        }
        let results = self.results.get_or_insert_with(JobResults::default);
        if partial.mesh_model.is_some() {
            results.mesh_model = partial.mesh_model;
        }
        if !partial.styled_results.is_empty() {
            results.styled_results = partial.styled_results;
        }
        true
    }

    /// Move to `Succeeded` at 100 %. Returns `false` if already terminal.
    pub fn succeed(&mut self, results: JobResults) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.progress = PROGRESS_MAX;
        self.time_remaining_ms = 0;
        self.results = Some(results);
        self.status = JobStatus::Succeeded;
        true
    }

    /// Move to `Failed`, keeping the progress reached. Returns `false` if
    /// already terminal.
    pub fn fail(&mut self, failure: JobFailure) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.failure = Some(failure);
        self.status = JobStatus::Failed;
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let phase = self.phase();
        JobSnapshot {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            phase_id: phase.id.clone(),
            phase_index: self.phase_index(),
            step_label: self
                .step_label
                .clone()
                .unwrap_or_else(|| phase.label.clone()),
            time_remaining_ms: self.time_remaining_ms,
            results: self.results.clone(),
            failure: self.failure.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
