use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toonify_api::config::ServerConfig;
use toonify_api::router::build_app_router;
use toonify_api::services::build_services;
use toonify_api::state::AppState;
use toonify_api::{engine, ws};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "toonify_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Services ---
    let services = build_services(&config)
        .await
        .expect("Failed to initialise services");
    let quota = services.orchestrator.ledger().view().await;
    tracing::info!(
        daily_remaining = quota.daily.remaining,
        monthly_remaining = quota.monthly.remaining,
        "Quota ledger loaded",
    );

    // --- WebSocket manager and background tasks ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let background_cancel = CancellationToken::new();

    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        ws::HEARTBEAT_INTERVAL,
        background_cancel.clone(),
    );

    // Snapshots and quota events to WebSocket clients.
    let relay_handle = tokio::spawn(engine::progress::run(
        Arc::clone(&ws_manager),
        services.orchestrator.watch(),
        services.event_bus.subscribe(),
        background_cancel.clone(),
    ));
    tracing::info!("Heartbeat and progress relay started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        orchestrator: Arc::clone(&services.orchestrator),
        uploads: Arc::clone(&services.uploads),
        ws_manager: Arc::clone(&ws_manager),
        event_bus: Arc::clone(&services.event_bus),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let cleanup_timeout = Duration::from_secs(config.shutdown_timeout_secs);

    if services.orchestrator.cancel().await {
        tracing::info!("Stopped tracking the running job");
    }
    if let Some(feed) = &services.live_feed {
        feed.shutdown();
        tracing::info!("Live progress feed shut down");
    }

    background_cancel.cancel();
    let _ = tokio::time::timeout(cleanup_timeout, relay_handle).await;
    let _ = tokio::time::timeout(cleanup_timeout, heartbeat_handle).await;
    tracing::info!("Heartbeat and progress relay stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
