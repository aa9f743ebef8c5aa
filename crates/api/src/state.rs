use std::sync::Arc;

use toonify_events::EventBus;
use toonify_pipeline::upload::UploadScreen;
use toonify_pipeline::Orchestrator;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Submits jobs and owns the single tracked job.
    pub orchestrator: Arc<Orchestrator>,
    /// Validates and moderates uploaded images.
    pub uploads: Arc<UploadScreen>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
    /// Centralized event bus for publishing platform events.
    pub event_bus: Arc<EventBus>,
}
