//! Progress tracking from the generation service's live feed.
//!
//! Feed updates are untrusted: progress is clamped to `[0, 100]` and to the
//! running maximum, the phase is re-derived from progress, and only the
//! first terminal update counts. A feed that closes without a terminal
//! update fails the job; a run still open at `total + watchdog_buffer` is
//! timed out.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toonify_core::job::{FailureKind, JobFailure, JobHandle, TrackedJob};
use toonify_generation::feed::{FeedError, ProgressFeed};
use toonify_generation::messages::ProgressUpdate;

use crate::progress::estimate_remaining_ms;
use crate::tracking::{RunGate, SharedGate, SnapshotReceiver, TrackingHandle};

pub struct LiveProgressTracker {
    feed: Arc<dyn ProgressFeed>,
    watchdog_buffer: Duration,
}

impl LiveProgressTracker {
    pub fn new(feed: Arc<dyn ProgressFeed>, watchdog_buffer: Duration) -> Self {
        Self {
            feed,
            watchdog_buffer,
        }
    }

    /// Open the feed for `job` and start translating its updates.
    ///
    /// Fails only if the feed cannot be opened; the caller may then fall
    /// back to simulation.
    pub async fn start(
        &self,
        job: &JobHandle,
    ) -> Result<(TrackingHandle, SnapshotReceiver), FeedError> {
        let updates = self.feed.open(&job.job_id).await?;

        let (gate, rx) = RunGate::open(TrackedJob::new(job));
        let handle = TrackingHandle::new(job.job_id.clone(), gate);

        let deadline = Instant::now()
            + Duration::from_millis(job.total_duration_ms)
            + self.watchdog_buffer;
        let task = tokio::spawn(follow(
            job.job_id.clone(),
            job.total_duration_ms,
            deadline,
            updates,
            handle.gate(),
            handle.cancel_token(),
        ));
        handle.attach(task).await;

        tracing::info!(job_id = %job.job_id, "Live progress tracking started");
        Ok((handle, rx))
    }
}

async fn follow(
    job_id: String,
    total_duration_ms: u64,
    deadline: Instant,
    mut updates: tokio::sync::mpsc::UnboundedReceiver<ProgressUpdate>,
    gate: SharedGate,
    cancel: CancellationToken,
) {
    let watchdog = tokio::time::sleep_until(deadline);
    tokio::pin!(watchdog);

    loop {
        let update = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = &mut watchdog => {
                if gate.lock().await.fail(JobFailure::timed_out()) {
                    tracing::warn!(job_id = %job_id, "Live job passed its watchdog deadline");
                }
                return;
            }
            update = updates.recv() => update,
        };

        let mut gate = gate.lock().await;
        match update {
            Some(ProgressUpdate::Progress(data)) => {
                if let Some(reported) = data.phase.as_deref() {
                    let derived = &gate.job().phases().phase_for_progress(data.progress).id;
                    if reported != derived {
                        tracing::debug!(
                            job_id = %job_id,
                            reported,
                            derived = %derived,
                            "Feed phase disagrees with progress",
                        );
                    }
                }
                let remaining = data
                    .time_remaining_ms
                    .unwrap_or_else(|| estimate_remaining_ms(data.progress, total_duration_ms));
                if let Some(partial) = data.partial_results() {
                    gate.attach_partial_results(partial);
                }
                gate.set_step_label(data.current_step);
                if !gate.progress(data.progress, remaining) {
                    return;
                }
            }
            Some(ProgressUpdate::Succeeded(results)) => {
                gate.succeed(results);
                tracing::info!(job_id = %job_id, "Live job completed");
                return;
            }
            Some(ProgressUpdate::Failed(data)) => {
                tracing::warn!(job_id = %job_id, error = %data.message, "Live job failed");
                gate.fail(JobFailure::new(FailureKind::Backend, data.message));
                return;
            }
            None => {
                tracing::warn!(job_id = %job_id, "Progress feed ended without a terminal update");
                gate.fail(JobFailure::new(
                    FailureKind::Backend,
                    "Progress feed ended before the job finished",
                ));
                return;
            }
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
    use tokio::sync::{mpsc, Mutex};
    use toonify_core::job::{JobResults, JobSnapshot, JobStatus};
    use toonify_core::phase::PhaseTable;
    use toonify_generation::messages::{FailedData, ProgressData};

    use super::*;

    /// Feed that replays whatever the test pushes into it.
    struct ScriptedFeed {
        updates: Mutex<Option<mpsc::UnboundedReceiver<ProgressUpdate>>>,
    }

    impl ScriptedFeed {
        fn new() -> (Arc<Self>, mpsc::UnboundedSender<ProgressUpdate>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let feed = Arc::new(Self {
                updates: Mutex::new(Some(rx)),
            });
            (feed, tx)
        }
    }

    #[async_trait]
    impl ProgressFeed for ScriptedFeed {
        async fn open(
            &self,
            _job_id: &str,
        ) -> Result<mpsc::UnboundedReceiver<ProgressUpdate>, FeedError> {
            self.updates
                .lock()
                .await
                .take()
                .ok_or_else(|| FeedError::Connection("already opened".to_string()))
        }
    }

    fn progress(p: f64) -> ProgressUpdate {
        ProgressUpdate::Progress(ProgressData {
            progress: p,
            phase: None,
            current_step: None,
            time_remaining_ms: None,
            mesh_model: None,
            styled_results: vec![],
        })
    }

    fn job() -> JobHandle {
        JobHandle {
            job_id: "job_live".to_string(),
            submitted_at: Utc::now(),
            total_duration_ms: 65_000,
            phases: PhaseTable::two_phase(),
        }
    }

    async fn drain(mut rx: SnapshotReceiver) -> Vec<JobSnapshot> {
        let mut out = Vec::new();
        while let Some(s) = rx.recv().await {
            out.push(s);
        }
        out
    }

    #[tokio::test]
    async fn regressions_and_overshoot_are_clamped() {
        let (feed, tx) = ScriptedFeed::new();
        let tracker = LiveProgressTracker::new(feed, Duration::from_secs(5));
        let (_handle, rx) = tracker.start(&job()).await.unwrap();

        for p in [10.0, 55.0, 30.0, 140.0] {
            tx.send(progress(p)).unwrap();
        }
        tx.send(ProgressUpdate::Succeeded(JobResults::default())).unwrap();

        let snapshots = drain(rx).await;
        let seen: Vec<f64> = snapshots.iter().map(|s| s.progress).collect();
        assert_eq!(seen, [0.0, 10.0, 55.0, 55.0, 100.0, 100.0]);
        assert_eq!(snapshots[2].phase_id, "stylize");
        assert_eq!(snapshots[1].time_remaining_ms, 58_500);
    }

    #[tokio::test]
    async fn intermediate_assets_and_step_reach_snapshots() {
        let (feed, tx) = ScriptedFeed::new();
        let tracker = LiveProgressTracker::new(feed, Duration::from_secs(5));
        let (_handle, rx) = tracker.start(&job()).await.unwrap();

        tx.send(progress(20.0)).unwrap();
        tx.send(ProgressUpdate::Progress(ProgressData {
            progress: 52.0,
            phase: Some("stylize".to_string()),
            current_step: Some("Rigging the mesh".to_string()),
            time_remaining_ms: Some(30_000),
            mesh_model: Some("/live/m.glb".to_string()),
            styled_results: vec![],
        }))
        .unwrap();
        tx.send(progress(70.0)).unwrap();
        tx.send(ProgressUpdate::Succeeded(JobResults::default())).unwrap();

        let snapshots = drain(rx).await;
        assert!(snapshots[1].results.is_none());

        let midway = &snapshots[2];
        assert_eq!(midway.status, JobStatus::Running);
        assert_eq!(midway.step_label, "Rigging the mesh");
        assert_eq!(
            midway.results.as_ref().unwrap().mesh_model.as_deref(),
            Some("/live/m.glb")
        );

        let later = &snapshots[3];
        assert_ne!(later.step_label, "Rigging the mesh");
        assert_eq!(
            later.results.as_ref().unwrap().mesh_model.as_deref(),
            Some("/live/m.glb")
        );
    }

    #[tokio::test]
    async fn only_first_terminal_counts() {
        let (feed, tx) = ScriptedFeed::new();
        let tracker = LiveProgressTracker::new(feed, Duration::from_secs(5));
        let (_handle, rx) = tracker.start(&job()).await.unwrap();

        tx.send(ProgressUpdate::Failed(FailedData {
            message: "out of memory".to_string(),
        }))
        .unwrap();
        let _ = tx.send(ProgressUpdate::Succeeded(JobResults::default()));
        let _ = tx.send(progress(80.0));

        let snapshots = drain(rx).await;
        assert_eq!(snapshots.iter().filter(|s| s.is_terminal()).count(), 1);
        let last = snapshots.last().unwrap();
        assert_eq!(last.status, JobStatus::Failed);
        assert_eq!(last.failure.as_ref().unwrap().message, "out of memory");
    }

    #[tokio::test]
    async fn feed_closing_without_terminal_fails_job() {
        let (feed, tx) = ScriptedFeed::new();
        let tracker = LiveProgressTracker::new(feed, Duration::from_secs(5));
        let (_handle, rx) = tracker.start(&job()).await.unwrap();

        tx.send(progress(20.0)).unwrap();
        drop(tx);

        let last = drain(rx).await.pop().unwrap();
        assert_eq!(last.status, JobStatus::Failed);
        assert_eq!(last.progress, 20.0);
        assert_eq!(last.failure.unwrap().kind, FailureKind::Backend);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_feed_times_out() {
        let (feed, _tx) = ScriptedFeed::new();
        let tracker = LiveProgressTracker::new(feed, Duration::from_secs(5));
        let (_handle, rx) = tracker.start(&job()).await.unwrap();

        let last = drain(rx).await.pop().unwrap();
        assert_eq!(last.failure.unwrap().kind, FailureKind::TimedOut);
    }

    #[tokio::test]
    async fn open_failure_is_reported() {
        let (feed, _tx) = ScriptedFeed::new();
        let tracker = LiveProgressTracker::new(feed, Duration::from_secs(5));
        let _first = tracker.start(&job()).await.unwrap();
        assert_matches!(tracker.start(&job()).await, Err(FeedError::Connection(_)));
    }
}
