//! Exponential-backoff reconnection for the live progress feed.
//!
//! When the feed's WebSocket drops before the job reaches a terminal
//! state, the feed task calls [`reconnect_loop`] and keeps retrying with
//! growing delays until the connection is back or the
//! [`CancellationToken`] fires.

use std::time::Duration;

use tokio_tungstenite::connect_async;
use tokio_util::sync::CancellationToken;

use crate::feed::WsStream;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// The delay after `current`, clamped to [`ReconnectConfig::max_delay`].
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Reconnect to `url` with exponential backoff.
///
/// Returns `Some(stream)` once a connection succeeds, or `None` if
/// `cancel` fires first.
pub async fn reconnect_loop(
    url: &str,
    job_id: &str,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
) -> Option<WsStream> {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        // Wait before each attempt; the drop that brought us here just happened.
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        attempt += 1;
        tracing::info!(
            job_id = %job_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting to progress feed",
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(job_id = %job_id, "Progress feed reconnect cancelled");
                return None;
            }
            result = connect_async(url) => {
                match result {
                    Ok((stream, _response)) => {
                        tracing::info!(job_id = %job_id, attempt, "Progress feed reconnected");
                        return Some(stream);
                    }
                    Err(e) => {
                        tracing::warn!(
                            job_id = %job_id,
                            error = %e,
                            "Progress feed reconnect attempt {attempt} failed",
                        );
                    }
                }
            }
        }

        delay = next_delay(delay, config);
    }
}
