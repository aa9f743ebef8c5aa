//! Single entry point for submitting and following generation jobs.
//!
//! [`Orchestrator::submit_and_track`] runs the submitter's checks, halts
//! whatever job was being tracked, starts tracking the new one (live feed
//! when configured and reachable, simulation otherwise), and returns a
//! [`Subscription`] that yields the job's snapshots through its terminal
//! one. Lifecycle changes are published on the [`EventBus`] and every
//! snapshot is re-broadcast for WebSocket fan-out.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use toonify_core::error::CoreError;
use toonify_core::generation::GenerationRequest;
use toonify_core::job::{FailureKind, JobHandle, JobSnapshot, JobStatus};
use toonify_core::job_events::{
    EVENT_JOB_CANCELLED, EVENT_JOB_FAILED, EVENT_JOB_SUBMITTED, EVENT_JOB_SUCCEEDED,
    EVENT_QUOTA_EXHAUSTED, EVENT_QUOTA_LOW,
};
use toonify_core::quota::{QuotaKind, QuotaSignal};
use toonify_core::types::JobId;
use toonify_events::{EventBus, PlatformEvent};
use toonify_generation::{GenerationBackend, ProgressFeed};

use crate::config::TrackerConfig;
use crate::ledger::QuotaLedger;
use crate::live::LiveProgressTracker;
use crate::simulator::ProgressSimulator;
use crate::submitter::JobSubmitter;
use crate::tracking::{SnapshotReceiver, TrackingHandle};

/// Capacity of the snapshot broadcast used for WebSocket fan-out.
const SNAPSHOT_BROADCAST_CAPACITY: usize = 256;

/// Snapshots of one tracked job, ending after its terminal snapshot.
#[derive(Debug)]
pub struct Subscription {
    job_id: JobId,
    rx: mpsc::UnboundedReceiver<JobSnapshot>,
}

impl Subscription {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// The next snapshot, or `None` after the terminal one.
    pub async fn next(&mut self) -> Option<JobSnapshot> {
        self.rx.recv().await
    }
}

pub struct Orchestrator {
    ledger: Arc<QuotaLedger>,
    submitter: JobSubmitter,
    simulator: ProgressSimulator,
    live: Option<LiveProgressTracker>,
    events: Arc<EventBus>,
    /// Run being tracked. Held across submit and cancel so they never
    /// interleave.
    current: Mutex<Option<TrackingHandle>>,
    latest: Arc<RwLock<Option<JobSnapshot>>>,
    snapshots: broadcast::Sender<JobSnapshot>,
    watchdog_buffer: std::time::Duration,
}

impl Orchestrator {
    pub fn new(
        ledger: Arc<QuotaLedger>,
        backend: Arc<dyn GenerationBackend>,
        events: Arc<EventBus>,
        config: &TrackerConfig,
    ) -> Self {
        let (snapshots, _) = broadcast::channel(SNAPSHOT_BROADCAST_CAPACITY);
        Self {
            submitter: JobSubmitter::new(Arc::clone(&ledger), backend, config.phases.clone()),
            ledger,
            simulator: ProgressSimulator::from_config(config),
            live: None,
            events,
            current: Mutex::new(None),
            latest: Arc::new(RwLock::new(None)),
            snapshots,
            watchdog_buffer: config.watchdog_buffer,
        }
    }

    /// Follow jobs through `feed`, falling back to simulation when it
    /// cannot be opened.
    pub fn with_live_feed(mut self, feed: Arc<dyn ProgressFeed>) -> Self {
        self.live = Some(LiveProgressTracker::new(feed, self.watchdog_buffer));
        self
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    /// Every snapshot of every tracked job, for fan-out to clients.
    pub fn watch(&self) -> broadcast::Receiver<JobSnapshot> {
        self.snapshots.subscribe()
    }

    /// Latest snapshot of the most recently submitted job.
    pub async fn current_snapshot(&self) -> Option<JobSnapshot> {
        self.latest.read().await.clone()
    }

    /// Submit `request` and track the resulting job.
    ///
    /// Validation, quota, and submission failures are returned as errors
    /// and leave any running job untouched. Once the job exists, every
    /// outcome arrives as a terminal snapshot on the subscription.
    pub async fn submit_and_track(
        &self,
        request: &GenerationRequest,
    ) -> Result<Subscription, CoreError> {
        let mut current = self.current.lock().await;

        let job = match self.submitter.submit(request).await {
            Ok(job) => job,
            Err(e) => {
                if let CoreError::QuotaExceeded { kind, resets_on } = &e {
                    self.events.publish(
                        PlatformEvent::new(EVENT_QUOTA_EXHAUSTED).with_payload(
                            serde_json::json!({ "kind": kind, "resets_on": resets_on }),
                        ),
                    );
                }
                return Err(e);
            }
        };

        self.events.publish(
            PlatformEvent::new(EVENT_JOB_SUBMITTED)
                .with_job(job.job_id.clone())
                .with_payload(serde_json::json!({
                    "styles": request.effective_styles(),
                    "total_duration_ms": job.total_duration_ms,
                })),
        );
        self.publish_quota_signals().await;

        if let Some(previous) = current.take() {
            self.simulator.stop(&previous).await;
        }

        let (tracking, rx) = self.start_tracking(&job).await?;
        *self.latest.write().await = Some(tracking.snapshot().await);
        *current = Some(tracking);

        let (tx, sub_rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(
            rx,
            tx,
            Arc::clone(&self.latest),
            self.snapshots.clone(),
            Arc::clone(&self.events),
        ));

        Ok(Subscription {
            job_id: job.job_id,
            rx: sub_rx,
        })
    }

    /// Stop tracking the current job. Quota already consumed is not
    /// refunded. Returns `false` if no job was running.
    pub async fn cancel(&self) -> bool {
        let previous = self.current.lock().await.take();
        match previous {
            Some(handle) => {
                let stopped = self.simulator.stop(&handle).await;
                if stopped {
                    tracing::info!(job_id = %handle.job_id(), "Job cancelled");
                }
                stopped
            }
            None => false,
        }
    }

    async fn start_tracking(
        &self,
        job: &JobHandle,
    ) -> Result<(TrackingHandle, SnapshotReceiver), CoreError> {
        if let Some(live) = &self.live {
            match live.start(job).await {
                Ok(started) => return Ok(started),
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.job_id,
                        error = %e,
                        "Live progress unavailable, simulating instead",
                    );
                }
            }
        }
        self.simulator.start(job, self.submitter.backend()).await
    }

    /// Announce low or exhausted quotas after a submission. The job
    /// already exists, so a failed check is logged and not returned.
    async fn publish_quota_signals(&self) {
        for kind in [QuotaKind::Daily, QuotaKind::Monthly] {
            let check = match self.ledger.check_quota(kind).await {
                Ok(check) => check,
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "Post-submission quota check failed");
                    continue;
                }
            };
            match check.signal {
                Some(QuotaSignal::Low { kind, remaining }) => self.events.publish(
                    PlatformEvent::new(EVENT_QUOTA_LOW)
                        .with_payload(serde_json::json!({ "kind": kind, "remaining": remaining })),
                ),
                Some(QuotaSignal::Exhausted { kind, resets_on }) => self.events.publish(
                    PlatformEvent::new(EVENT_QUOTA_EXHAUSTED)
                        .with_payload(serde_json::json!({ "kind": kind, "resets_on": resets_on })),
                ),
                None => {}
            }
        }
    }
}

/// Relay one run's snapshots to its subscriber, the latest-snapshot slot,
/// the fan-out broadcast, and the event bus.
async fn forward(
    mut rx: SnapshotReceiver,
    tx: mpsc::UnboundedSender<JobSnapshot>,
    latest: Arc<RwLock<Option<JobSnapshot>>>,
    snapshots: broadcast::Sender<JobSnapshot>,
    events: Arc<EventBus>,
) {
    while let Some(snapshot) = rx.recv().await {
        {
            // A superseded job's late snapshots must not overwrite the new one.
            let mut latest = latest.write().await;
            if latest.as_ref().map_or(true, |s| s.job_id == snapshot.job_id) {
                *latest = Some(snapshot.clone());
            }
        }

        if snapshot.is_terminal() {
            events.publish(terminal_event(&snapshot));
        }
        let _ = snapshots.send(snapshot.clone());
        let _ = tx.send(snapshot);
    }
}

fn terminal_event(snapshot: &JobSnapshot) -> PlatformEvent {
    let event = match (&snapshot.status, &snapshot.failure) {
        (JobStatus::Succeeded, _) => {
            let results = snapshot.results.clone().unwrap_or_default();
            PlatformEvent::new(EVENT_JOB_SUCCEEDED).with_payload(serde_json::json!({
                "mesh_model": results.mesh_model,
                "styles": results.styled_results.len(),
            }))
        }
        (_, Some(failure)) if failure.kind == FailureKind::Cancelled => {
            PlatformEvent::new(EVENT_JOB_CANCELLED)
                .with_payload(serde_json::json!({ "progress": snapshot.progress }))
        }
        (_, failure) => PlatformEvent::new(EVENT_JOB_FAILED).with_payload(serde_json::json!({
            "kind": failure.as_ref().map(|f| f.kind),
            "message": failure.as_ref().map(|f| f.message.as_str()),
            "progress": snapshot.progress,
        })),
    };
    event.with_job(snapshot.job_id.clone())
}
