use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::mpsc;
use toonify_core::clock::ManualClock;
use toonify_core::generation::GenerationRequest;
use toonify_core::job::{JobResults, JobSnapshot};
use toonify_core::store::MemoryStore;
use toonify_events::EventBus;
use toonify_generation::feed::{FeedError, ProgressFeed};
use toonify_generation::messages::ProgressUpdate;
use toonify_generation::{GenerationBackend, GenerationError, GenerationTicket, LocalGenerationBackend};
use toonify_pipeline::config::QuotaLimits;
use toonify_pipeline::{Orchestrator, QuotaLedger, Subscription, TrackerConfig};

/// Wraps the local backend, counting calls and optionally refusing.
pub struct FakeBackend {
    inner: LocalGenerationBackend,
    pub calls: AtomicUsize,
    pub refuse: bool,
}

impl FakeBackend {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self {
            inner: LocalGenerationBackend::default(),
            calls: AtomicUsize::new(0),
            refuse: false,
        })
    }

    pub fn refusing() -> Arc<Self> {
        Arc::new(Self {
            inner: LocalGenerationBackend::default(),
            calls: AtomicUsize::new(0),
            refuse: true,
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn request_generation(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationTicket, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refuse {
            return Err(GenerationError::ApiError {
                status: 500,
                body: "model server down".to_string(),
            });
        }
        self.inner.request_generation(request).await
    }

    async fn fetch_results(&self, job_id: &str) -> Result<JobResults, GenerationError> {
        self.inner.fetch_results(job_id).await
    }
}

/// Feed that can never be opened.
pub struct DeadFeed;

#[async_trait]
impl ProgressFeed for DeadFeed {
    async fn open(
        &self,
        _job_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<ProgressUpdate>, FeedError> {
        Err(FeedError::Connection("connection refused".to_string()))
    }
}

/// Feed that immediately reports a finished job.
pub struct InstantFeed;

#[async_trait]
impl ProgressFeed for InstantFeed {
    async fn open(
        &self,
        _job_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<ProgressUpdate>, FeedError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ProgressUpdate::Succeeded(JobResults {
            mesh_model: Some("/live.glb".to_string()),
            styled_results: vec![],
        }));
        Ok(rx)
    }
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub backend: Arc<FakeBackend>,
    pub ledger: Arc<QuotaLedger>,
    pub events: Arc<EventBus>,
    pub clock: Arc<ManualClock>,
}

pub async fn harness(backend: Arc<FakeBackend>) -> Harness {
    let clock = Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()));
    let ledger = Arc::new(
        QuotaLedger::load(Arc::new(MemoryStore::new()), clock.clone(), QuotaLimits::default())
            .await
            .unwrap(),
    );
    let events = Arc::new(EventBus::default());
    let orchestrator = Orchestrator::new(
        ledger.clone(),
        backend.clone(),
        events.clone(),
        &TrackerConfig::default(),
    );
    Harness {
        orchestrator,
        backend,
        ledger,
        events,
        clock,
    }
}

pub fn request() -> GenerationRequest {
    GenerationRequest::new("upload://dog", vec!["disney".to_string()])
}

pub async fn drain(subscription: &mut Subscription) -> Vec<JobSnapshot> {
    let mut out = Vec::new();
    while let Some(snapshot) = subscription.next().await {
        out.push(snapshot);
    }
    out
}
