//! Time-driven progress simulation for a generation job.
//!
//! [`ProgressSimulator::start`] spawns one tick task per job. Each tick
//! derives progress from the monotonic time elapsed since the start, so
//! progress is a pure function of time and never regresses. On entering
//! the final phase the task asks the result source for the job's outputs
//! in the background and shows the mesh as soon as it arrives. When
//! progress reaches 100 it delivers a single `Succeeded` snapshot with
//! those outputs, asking again if the early answer had no styled images. A watchdog deadline at
//! `total + watchdog_buffer` ends any run that has not finished by then.
//!
//! At most one run is active per simulator: starting a job halts the
//! previous one (delivering its `cancelled` terminal) before the new tick
//! task is spawned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use toonify_core::error::CoreError;
use toonify_core::job::{FailureKind, JobFailure, JobHandle, JobResults, JobStatus, TrackedJob};
use toonify_core::phase::PROGRESS_MAX;
use toonify_generation::GenerationBackend;

use crate::config::TrackerConfig;
use crate::progress::{compute_progress, time_remaining_ms};
use crate::tracking::{RunGate, SharedGate, SnapshotReceiver, TrackingHandle};

/// Lifecycle of the simulator's current run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Idle,
    Running,
    Succeeded,
    Failed,
}

pub struct ProgressSimulator {
    tick_interval: Duration,
    watchdog_buffer: Duration,
    active: Mutex<Option<TrackingHandle>>,
}

impl ProgressSimulator {
    pub fn new(tick_interval: Duration, watchdog_buffer: Duration) -> Self {
        Self {
            tick_interval,
            watchdog_buffer,
            active: Mutex::new(None),
        }
    }

    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.tick_interval, config.watchdog_buffer)
    }

    /// Start simulating `job`, halting any run already in progress.
    ///
    /// The initial `Starting` snapshot is already in the returned receiver.
    /// `results` is asked for the job's outputs once progress reaches 100.
    pub async fn start(
        &self,
        job: &JobHandle,
        results: Arc<dyn GenerationBackend>,
    ) -> Result<(TrackingHandle, SnapshotReceiver), CoreError> {
        if job.total_duration_ms == 0 {
            return Err(CoreError::SimulationFault(format!(
                "job {} has a non-positive duration",
                job.job_id
            )));
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            if previous.stop().await {
                tracing::info!(
                    job_id = %previous.job_id(),
                    next_job_id = %job.job_id,
                    "Superseded job stopped",
                );
            }
        }

        let (gate, rx) = RunGate::open(TrackedJob::new(job));
        let handle = TrackingHandle::new(job.job_id.clone(), gate);

        let run = SimulationRun {
            job_id: job.job_id.clone(),
            total: Duration::from_millis(job.total_duration_ms),
            tick_interval: self.tick_interval,
            watchdog_buffer: self.watchdog_buffer,
            gate: handle.gate(),
            cancel: handle.cancel_token(),
            results,
        };
        handle.attach(tokio::spawn(run.run())).await;

        tracing::info!(
            job_id = %job.job_id,
            total_duration_ms = job.total_duration_ms,
            phases = job.phases.len(),
            "Progress simulation started",
        );

        *active = Some(handle.clone());
        Ok((handle, rx))
    }

    /// Halt `handle`'s run, delivering a `cancelled` terminal if it had
    /// none yet.
    pub async fn stop(&self, handle: &TrackingHandle) -> bool {
        let mut active = self.active.lock().await;
        if active.as_ref().is_some_and(|a| a.job_id() == handle.job_id()) {
            *active = None;
        }
        drop(active);
        handle.stop().await
    }

    /// End `handle`'s run with a backend failure.
    pub async fn fail(&self, handle: &TrackingHandle, message: impl Into<String>) -> bool {
        let message = message.into();
        tracing::warn!(job_id = %handle.job_id(), error = %message, "Simulation failed");
        handle.fail(message).await
    }

    pub async fn state(&self) -> SimulatorState {
        let active = self.active.lock().await;
        let Some(handle) = active.as_ref() else {
            return SimulatorState::Idle;
        };
        match handle.snapshot().await.status {
            JobStatus::Starting | JobStatus::Running => SimulatorState::Running,
            JobStatus::Succeeded => SimulatorState::Succeeded,
            JobStatus::Failed => SimulatorState::Failed,
        }
    }
}

impl Default for ProgressSimulator {
    fn default() -> Self {
        Self::from_config(&TrackerConfig::default())
    }
}

/// Everything one tick task needs.
struct SimulationRun {
    job_id: String,
    total: Duration,
    tick_interval: Duration,
    watchdog_buffer: Duration,
    gate: SharedGate,
    cancel: CancellationToken,
    results: Arc<dyn GenerationBackend>,
}

impl SimulationRun {
    async fn run(self) {
        let started = Instant::now();
        let watchdog = tokio::time::sleep_until(started + self.total + self.watchdog_buffer);
        tokio::pin!(watchdog);

        let mut ticker = tokio::time::interval_at(started + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut early: Option<JoinHandle<Option<JobResults>>> = None;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = &mut watchdog => {
                    self.time_out().await;
                    return;
                }
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    let progress = compute_progress(elapsed, self.total);
                    if progress >= PROGRESS_MAX {
                        break;
                    }
                    let remaining = time_remaining_ms(elapsed, self.total);
                    let mut gate = self.gate.lock().await;
                    if !gate.progress(progress, remaining) {
                        return;
                    }
                    let in_final_phase = gate.job().phase_index() + 1 == gate.job().phases().len();
                    drop(gate);
                    if in_final_phase && early.is_none() {
                        early = Some(self.fetch_early());
                    }
                }
            }
        }

        let early = match early {
            Some(mut task) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = &mut watchdog => {
                    task.abort();
                    self.time_out().await;
                    return;
                }
                joined = &mut task => joined.ok().flatten(),
            },
            None => None,
        };

        let fetched = match early {
            Some(results) if !results.styled_results.is_empty() => Ok(results),
            early => {
                let fetched = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return,
                    _ = &mut watchdog => {
                        self.time_out().await;
                        return;
                    }
                    fetched = self.results.fetch_results(&self.job_id) => fetched,
                };
                match (fetched, early) {
                    (Err(e), Some(results)) => {
                        tracing::debug!(
                            job_id = %self.job_id,
                            error = %e,
                            "Final result fetch failed, keeping the earlier results",
                        );
                        Ok(results)
                    }
                    (fetched, _) => fetched,
                }
            }
        };

        let mut gate = self.gate.lock().await;
        match fetched {
            Ok(results) => {
                let styles = results.styled_results.len();
                if gate.succeed(results) {
                    tracing::info!(job_id = %self.job_id, styles, "Simulated job completed");
                }
            }
            Err(e) => {
                tracing::error!(job_id = %self.job_id, error = %e, "Failed to fetch job results");
                gate.fail(JobFailure::new(
                    FailureKind::Backend,
                    format!("Failed to fetch results: {e}"),
                ));
            }
        }
    }

    /// Ask for the job's outputs in the background and show its mesh as
    /// soon as it is known. Resolves to `None` when the backend has nothing
    /// yet or the run was cancelled.
    fn fetch_early(&self) -> JoinHandle<Option<JobResults>> {
        let job_id = self.job_id.clone();
        let gate = Arc::clone(&self.gate);
        let cancel = self.cancel.clone();
        let source = Arc::clone(&self.results);

        tokio::spawn(async move {
            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                fetched = source.fetch_results(&job_id) => fetched,
            };
            match fetched {
                Ok(results) => {
                    if let Some(mesh) = &results.mesh_model {
                        let partial = JobResults {
                            mesh_model: Some(mesh.clone()),
                            styled_results: Vec::new(),
                        };
                        if gate.lock().await.attach_partial_results(partial) {
                            tracing::debug!(job_id = %job_id, mesh = %mesh, "Mesh available early");
                        }
                    }
                    Some(results)
                }
                Err(e) => {
                    tracing::debug!(job_id = %job_id, error = %e, "Results not available yet");
                    None
                }
            }
        })
    }

    async fn time_out(&self) {
        if self.gate.lock().await.fail(JobFailure::timed_out()) {
            tracing::warn!(job_id = %self.job_id, "Watchdog stopped a job with no terminal state");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use toonify_core::generation::GenerationRequest;
    use toonify_core::job::{JobResults, JobSnapshot};
    use toonify_core::phase::{PhaseDefinition, PhaseTable};
    use toonify_generation::{GenerationError, GenerationTicket, LocalGenerationBackend};

    use super::*;

    /// Result source with a configurable outcome.
    enum Outcome {
        Ready,
        Broken,
        Never,
    }

    struct FakeResults(Outcome);

    #[async_trait]
    impl GenerationBackend for FakeResults {
        async fn request_generation(
            &self,
            _request: &GenerationRequest,
        ) -> Result<GenerationTicket, GenerationError> {
            unreachable!("the simulator never submits")
        }

        async fn fetch_results(&self, job_id: &str) -> Result<JobResults, GenerationError> {
            match self.0 {
                Outcome::Ready => Ok(JobResults {
                    mesh_model: Some(format!("/{job_id}.glb")),
                    styled_results: vec![],
                }),
                Outcome::Broken => Err(GenerationError::UnknownJob(job_id.to_string())),
                Outcome::Never => std::future::pending().await,
            }
        }
    }

    fn halves() -> PhaseTable {
        PhaseTable::new(vec![
            PhaseDefinition::new("first", "First", 0.0, 50.0, 500),
            PhaseDefinition::new("second", "Second", 50.0, 100.0, 500),
        ])
        .unwrap()
    }

    fn job(id: &str, total_duration_ms: u64) -> JobHandle {
        JobHandle {
            job_id: id.to_string(),
            submitted_at: Utc::now(),
            total_duration_ms,
            phases: halves(),
        }
    }

    fn simulator() -> ProgressSimulator {
        ProgressSimulator::new(Duration::from_millis(200), Duration::from_secs(5))
    }

    async fn drain(mut rx: SnapshotReceiver) -> Vec<JobSnapshot> {
        let mut out = Vec::new();
        while let Some(snapshot) = rx.recv().await {
            out.push(snapshot);
        }
        out
    }

    #[tokio::test(start_paused = true)]
    async fn successful_run_is_monotonic_and_ends_at_hundred() {
        let sim = simulator();
        let (_handle, rx) = sim
            .start(&job("job_a", 1_000), Arc::new(FakeResults(Outcome::Ready)))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        let progress: Vec<f64> = snapshots.iter().map(|s| s.progress).collect();
        assert_eq!(progress, [0.0, 20.0, 40.0, 60.0, 80.0, 100.0]);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));

        let terminals: Vec<&JobSnapshot> = snapshots.iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(terminals.len(), 1);
        let last = snapshots.last().unwrap();
        assert_eq!(last.status, JobStatus::Succeeded);
        assert_eq!(last.time_remaining_ms, 0);
        assert_eq!(
            last.results.as_ref().unwrap().mesh_model.as_deref(),
            Some("/job_a.glb")
        );
        assert_eq!(sim.state().await, SimulatorState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn six_hundred_ms_into_a_second_is_sixty_percent_in_phase_two() {
        let sim = simulator();
        let (_handle, rx) = sim
            .start(&job("job_b", 1_000), Arc::new(FakeResults(Outcome::Ready)))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        let at_600 = snapshots.iter().find(|s| s.progress == 60.0).unwrap();
        assert_eq!(at_600.phase_index, 1);
        assert_eq!(at_600.phase_id, "second");
        assert_eq!(at_600.time_remaining_ms, 400);
    }

    #[tokio::test(start_paused = true)]
    async fn mesh_shows_once_the_final_phase_starts() {
        let sim = simulator();
        let (_handle, rx) = sim
            .start(&job("job_m", 1_000), Arc::new(FakeResults(Outcome::Ready)))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        assert!(snapshots
            .iter()
            .filter(|s| s.phase_index == 0)
            .all(|s| s.results.is_none()));

        let at_80 = snapshots.iter().find(|s| s.progress == 80.0).unwrap();
        assert_eq!(at_80.status, JobStatus::Running);
        assert_eq!(
            at_80.results.as_ref().unwrap().mesh_model.as_deref(),
            Some("/job_m.glb")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn one_shot_result_source_still_completes() {
        let backend = Arc::new(LocalGenerationBackend::new(halves()));
        let ticket = backend
            .request_generation(&GenerationRequest::new("img", vec!["anime".to_string()]))
            .await
            .unwrap();

        let sim = simulator();
        let (_handle, rx) = sim.start(&job(&ticket.job_id, 1_000), backend).await.unwrap();

        let last = drain(rx).await.pop().unwrap();
        assert_eq!(last.status, JobStatus::Succeeded);
        let results = last.results.unwrap();
        assert_eq!(results.styled_results[0].style, "anime");
        assert!(results.mesh_model.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn phase_index_never_decreases() {
        let sim = simulator();
        let long = JobHandle {
            phases: PhaseTable::three_phase(),
            ..job("job_c", 65_000)
        };
        let (_handle, rx) = sim
            .start(&long, Arc::new(FakeResults(Outcome::Ready)))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        assert!(snapshots.windows(2).all(|w| w[0].phase_index <= w[1].phase_index));
        assert_eq!(snapshots.last().unwrap().phase_index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn coarse_ticks_report_destination_phase() {
        let sim = ProgressSimulator::new(Duration::from_millis(700), Duration::from_secs(5));
        let (_handle, rx) = sim
            .start(&job("job_d", 1_000), Arc::new(FakeResults(Outcome::Ready)))
            .await
            .unwrap();

        let snapshots = drain(rx).await;
        assert_eq!(snapshots[1].progress, 70.0);
        assert_eq!(snapshots[1].phase_id, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn starting_b_stops_a_before_b_ticks() {
        let sim = simulator();
        let source: Arc<dyn GenerationBackend> = Arc::new(FakeResults(Outcome::Ready));
        let (_a, mut rx_a) = sim.start(&job("job_a", 10_000), source.clone()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(450)).await;
        let (_b, rx_b) = sim.start(&job("job_b", 1_000), source).await.unwrap();

        let mut a_snapshots = Vec::new();
        while let Some(s) = rx_a.recv().await {
            a_snapshots.push(s);
        }
        let a_last = a_snapshots.last().unwrap();
        assert!(a_last.is_cancelled());
        assert_eq!(a_snapshots.iter().filter(|s| s.is_terminal()).count(), 1);
        assert!(a_snapshots.iter().all(|s| s.job_id == "job_a"));

        let b_snapshots = drain(rx_b).await;
        assert!(b_snapshots.iter().all(|s| s.job_id == "job_b"));
        assert_eq!(b_snapshots.last().unwrap().status, JobStatus::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_further_snapshots() {
        let sim = simulator();
        let (handle, mut rx) = sim
            .start(&job("job_e", 10_000), Arc::new(FakeResults(Outcome::Ready)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(650)).await;
        assert!(sim.stop(&handle).await);

        let mut seen = Vec::new();
        while let Some(s) = rx.recv().await {
            seen.push(s);
        }
        assert!(seen.last().unwrap().is_cancelled());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(rx.recv().await.is_none());
        assert_eq!(sim.state().await, SimulatorState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_ends_run_when_results_never_arrive() {
        let sim = simulator();
        let (_handle, rx) = sim
            .start(&job("job_f", 1_000), Arc::new(FakeResults(Outcome::Never)))
            .await
            .unwrap();

        let started = Instant::now();
        let snapshots = drain(rx).await;
        let last = snapshots.last().unwrap();
        assert_eq!(last.status, JobStatus::Failed);
        assert_eq!(last.failure.as_ref().unwrap().kind, FailureKind::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn result_fetch_error_fails_the_job() {
        let sim = simulator();
        let (_handle, rx) = sim
            .start(&job("job_g", 1_000), Arc::new(FakeResults(Outcome::Broken)))
            .await
            .unwrap();

        let last = drain(rx).await.pop().unwrap();
        assert_eq!(last.status, JobStatus::Failed);
        assert_eq!(last.failure.unwrap().kind, FailureKind::Backend);
        assert_eq!(sim.state().await, SimulatorState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn fail_short_circuits_a_running_job() {
        let sim = simulator();
        let (handle, rx) = sim
            .start(&job("job_h", 10_000), Arc::new(FakeResults(Outcome::Ready)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(sim.fail(&handle, "GPU node lost").await);

        let last = drain(rx).await.pop().unwrap();
        assert_matches!(last.failure, Some(f) if f.kind == FailureKind::Backend && f.message == "GPU node lost");
    }

    #[tokio::test]
    async fn zero_duration_is_rejected() {
        let sim = simulator();
        let result = sim
            .start(&job("job_z", 0), Arc::new(FakeResults(Outcome::Ready)))
            .await;
        assert_matches!(result, Err(CoreError::SimulationFault(_)));
        assert_eq!(sim.state().await, SimulatorState::Idle);
    }
}
