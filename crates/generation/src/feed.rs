//! Live progress feed from the generation service.
//!
//! [`WsProgressFeed`] connects to `{ws_url}/jobs/{job_id}/progress`,
//! parses each frame into a [`ProgressUpdate`], and forwards updates on an
//! unbounded channel until a terminal update arrives. Dropped connections
//! are re-established with exponential backoff; the feed stops when the
//! receiver is dropped or [`WsProgressFeed::shutdown`] is called.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::messages::{parse_message, ProgressUpdate};
use crate::reconnect::{reconnect_loop, ReconnectConfig};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The initial connection could not be established.
    #[error("Connection error: {0}")]
    Connection(String),
}

/// Source of live progress updates for a job.
#[async_trait]
pub trait ProgressFeed: Send + Sync {
    /// Start following `job_id`. Updates arrive in send order; the channel
    /// closes after a terminal update or when the feed gives up.
    async fn open(&self, job_id: &str)
        -> Result<mpsc::UnboundedReceiver<ProgressUpdate>, FeedError>;
}

pub struct WsProgressFeed {
    ws_url: String,
    reconnect: ReconnectConfig,
    shutdown: CancellationToken,
}

impl WsProgressFeed {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:9000`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            reconnect: ReconnectConfig::default(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn job_url(&self, job_id: &str) -> String {
        format!("{}/jobs/{job_id}/progress", self.ws_url)
    }

    /// Stop every open feed, including ones waiting to reconnect.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl ProgressFeed for WsProgressFeed {
    async fn open(
        &self,
        job_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<ProgressUpdate>, FeedError> {
        let url = self.job_url(job_id);
        let (stream, _response) = connect_async(&url).await.map_err(|e| {
            FeedError::Connection(format!("Failed to connect to progress feed at {url}: {e}"))
        })?;

        tracing::info!(job_id = %job_id, "Connected to progress feed");

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(
            stream,
            url,
            job_id.to_string(),
            tx,
            self.reconnect.clone(),
            self.shutdown.child_token(),
        ));
        Ok(rx)
    }
}

/// Read frames until a terminal update, reconnecting on drops.
async fn pump(
    mut stream: WsStream,
    url: String,
    job_id: String,
    tx: mpsc::UnboundedSender<ProgressUpdate>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = stream.close(None).await;
                return;
            }
            _ = tx.closed() => {
                let _ = stream.close(None).await;
                return;
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => match parse_message(&text) {
                Ok(update) => {
                    let terminal = update.is_terminal();
                    if tx.send(update).is_err() || terminal {
                        let _ = stream.close(None).await;
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "Skipping unparseable feed frame");
                }
            },
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                tracing::warn!(job_id = %job_id, "Progress feed dropped before the job finished");
                let reconnected = tokio::select! {
                    _ = tx.closed() => None,
                    s = reconnect_loop(&url, &job_id, &reconnect, &cancel) => s,
                };
                match reconnected {
                    Some(s) => stream = s,
                    None => return,
                }
            }
            Some(Ok(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_url_joins_base() {
        let feed = WsProgressFeed::new("ws://gen:9000/");
        assert_eq!(feed.job_url("job_1"), "ws://gen:9000/jobs/job_1/progress");
    }
}
