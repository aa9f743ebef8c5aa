use std::path::PathBuf;

use toonify_pipeline::TrackerConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// Collaborator URLs are optional; without them the server runs against the
/// local simulated backend and accepts uploads unscreened by a remote
/// classifier.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Upper bound on post-shutdown cleanup, in seconds (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Directory for the persisted quota record. In-memory when unset.
    pub quota_store_dir: Option<PathBuf>,
    /// Base URL of the remote generation service.
    pub generation_api_url: Option<String>,
    /// Base WebSocket URL of the live progress feed.
    pub progress_ws_url: Option<String>,
    /// Base URL of the image moderation service.
    pub moderation_api_url: Option<String>,
    /// Tick, watchdog, phase, and quota tuning.
    pub tracker: TrackerConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`| `30`                       |
    /// | `QUOTA_STORE_DIR`      | unset (in-memory)          |
    /// | `GENERATION_API_URL`   | unset (local simulation)   |
    /// | `PROGRESS_WS_URL`      | unset (simulated progress) |
    /// | `MODERATION_API_URL`   | unset (no classifier)      |
    ///
    /// Tracker settings are read by [`TrackerConfig::from_env`].
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let tracker = TrackerConfig::from_env().expect("Invalid tracker configuration");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            quota_store_dir: optional_env("QUOTA_STORE_DIR").map(PathBuf::from),
            generation_api_url: optional_env("GENERATION_API_URL"),
            progress_ws_url: optional_env("PROGRESS_WS_URL"),
            moderation_api_url: optional_env("MODERATION_API_URL"),
            tracker,
        }
    }
}

/// Read `key`, treating an empty value the same as an unset one.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
