//! Wiring of the collaborators selected by [`ServerConfig`].

use std::sync::Arc;

use toonify_core::clock::SystemClock;
use toonify_core::error::CoreError;
use toonify_core::store::{JsonFileStore, KeyValueStore, MemoryStore};
use toonify_events::EventBus;
use toonify_generation::api::HttpGenerationBackend;
use toonify_generation::{
    GenerationBackend, HttpModerator, LocalGenerationBackend, Moderator, PermissiveModerator,
    WsProgressFeed,
};
use toonify_pipeline::upload::UploadScreen;
use toonify_pipeline::{Orchestrator, QuotaLedger};

use crate::config::ServerConfig;

/// Long-lived services shared by the HTTP layer and background tasks.
pub struct Services {
    pub orchestrator: Arc<Orchestrator>,
    pub uploads: Arc<UploadScreen>,
    pub event_bus: Arc<EventBus>,
    /// Present when a live progress feed is configured; shut down on exit.
    pub live_feed: Option<Arc<WsProgressFeed>>,
}

/// Build the ledger, backend, feed, and moderator named by `config`.
///
/// Fails only if the quota record cannot be persisted.
pub async fn build_services(config: &ServerConfig) -> Result<Services, CoreError> {
    let store: Arc<dyn KeyValueStore> = match &config.quota_store_dir {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Quota record stored on disk");
            Arc::new(JsonFileStore::new(dir.clone()))
        }
        None => {
            tracing::warn!("QUOTA_STORE_DIR not set, quota usage will not survive restarts");
            Arc::new(MemoryStore::new())
        }
    };

    let ledger = Arc::new(
        QuotaLedger::load(store, Arc::new(SystemClock), config.tracker.quota).await?,
    );

    let backend: Arc<dyn GenerationBackend> = match &config.generation_api_url {
        Some(url) => {
            tracing::info!(url = %url, "Using remote generation service");
            Arc::new(HttpGenerationBackend::new(url.clone()))
        }
        None => {
            tracing::info!("Using local simulated generation backend");
            Arc::new(LocalGenerationBackend::new(config.tracker.phases.clone()))
        }
    };

    let event_bus = Arc::new(EventBus::default());
    let mut orchestrator = Orchestrator::new(
        ledger,
        backend,
        Arc::clone(&event_bus),
        &config.tracker,
    );

    let live_feed = config.progress_ws_url.as_ref().map(|url| {
        tracing::info!(url = %url, "Following live job progress");
        Arc::new(WsProgressFeed::new(url.clone()))
    });
    if let Some(feed) = &live_feed {
        orchestrator = orchestrator.with_live_feed(feed.clone());
    }

    let moderator: Arc<dyn Moderator> = match &config.moderation_api_url {
        Some(url) => Arc::new(HttpModerator::new(url.clone())),
        None => {
            tracing::warn!("MODERATION_API_URL not set, uploads are not classified");
            Arc::new(PermissiveModerator)
        }
    };

    Ok(Services {
        orchestrator: Arc::new(orchestrator),
        uploads: Arc::new(UploadScreen::new(moderator)),
        event_bus,
        live_feed,
    })
}
