//! Translates job snapshots and quota events into WebSocket notifications.

use axum::extract::ws::Message;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use toonify_core::job::{JobSnapshot, JobStatus};
use toonify_core::job_events::{
    EVENT_QUOTA_EXHAUSTED, EVENT_QUOTA_LOW, MSG_TYPE_JOB_CANCELLED, MSG_TYPE_JOB_COMPLETED,
    MSG_TYPE_JOB_FAILED, MSG_TYPE_JOB_PROGRESS, MSG_TYPE_QUOTA_EXHAUSTED, MSG_TYPE_QUOTA_WARNING,
};
use toonify_events::PlatformEvent;

use crate::ws::WsManager;

/// Forward snapshots and quota events to every connected client until
/// `cancel` fires or both sources close.
pub async fn run(
    ws_manager: std::sync::Arc<WsManager>,
    mut snapshots: broadcast::Receiver<JobSnapshot>,
    mut events: broadcast::Receiver<PlatformEvent>,
    cancel: CancellationToken,
) {
    let mut snapshots_open = true;
    let mut events_open = true;

    while snapshots_open || events_open {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = snapshots.recv(), if snapshots_open => match received {
                Ok(snapshot) => {
                    broadcast_json(&ws_manager, snapshot_message(&snapshot)).await;
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress relay lagged behind job snapshots");
                }
                Err(RecvError::Closed) => snapshots_open = false,
            },
            received = events.recv(), if events_open => match received {
                Ok(event) => {
                    if let Some(message) = quota_message(&event) {
                        broadcast_json(&ws_manager, message).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Progress relay lagged behind platform events");
                }
                Err(RecvError::Closed) => events_open = false,
            },
        }
    }

    tracing::debug!("Progress relay stopped");
}

/// Client message for one job snapshot.
pub fn snapshot_message(snapshot: &JobSnapshot) -> serde_json::Value {
    match (&snapshot.status, &snapshot.failure) {
        (JobStatus::Succeeded, _) => serde_json::json!({
            "type": MSG_TYPE_JOB_COMPLETED,
            "job_id": snapshot.job_id,
            "results": snapshot.results,
        }),
        (_, Some(failure)) if snapshot.is_cancelled() => serde_json::json!({
            "type": MSG_TYPE_JOB_CANCELLED,
            "job_id": snapshot.job_id,
            "progress": snapshot.progress,
            "reason": failure.message,
        }),
        (JobStatus::Failed, failure) => serde_json::json!({
            "type": MSG_TYPE_JOB_FAILED,
            "job_id": snapshot.job_id,
            "kind": failure.as_ref().map(|f| f.kind),
            "error": failure.as_ref().map(|f| f.message.as_str()),
        }),
        _ => {
            let mut message = serde_json::json!({
                "type": MSG_TYPE_JOB_PROGRESS,
                "job_id": snapshot.job_id,
                "status": snapshot.status,
                "progress": snapshot.progress,
                "phase_id": snapshot.phase_id,
                "phase_index": snapshot.phase_index,
                "step_label": snapshot.step_label,
                "time_remaining_ms": snapshot.time_remaining_ms,
            });
            if let Some(results) = &snapshot.results {
                message["results"] = serde_json::json!(results);
            }
            message
        }
    }
}

/// Client message for a quota event, `None` for every other event type.
pub fn quota_message(event: &PlatformEvent) -> Option<serde_json::Value> {
    let msg_type = match event.event_type.as_str() {
        EVENT_QUOTA_LOW => MSG_TYPE_QUOTA_WARNING,
        EVENT_QUOTA_EXHAUSTED => MSG_TYPE_QUOTA_EXHAUSTED,
        _ => return None,
    };
    Some(serde_json::json!({
        "type": msg_type,
        "quota": event.payload,
    }))
}

/// Serialize a JSON value and broadcast it to all connected WebSocket clients.
async fn broadcast_json(ws_manager: &WsManager, payload: serde_json::Value) {
    ws_manager
        .broadcast(Message::Text(payload.to_string().into()))
        .await;
}
