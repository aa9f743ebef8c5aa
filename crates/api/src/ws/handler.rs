use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::engine::progress::snapshot_message;
use crate::state::AppState;

/// GET /ws -- upgrade to a WebSocket that receives job and quota updates.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Register the client, replay the current job's latest snapshot so a
/// late joiner is in sync, then pump outbound messages until it leaves.
///
/// Clients only listen; inbound data frames are ignored.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    let ws_manager = state.ws_manager;
    let mut rx = ws_manager.add(conn_id.clone()).await;
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    if let Some(snapshot) = state.orchestrator.current_snapshot().await {
        let replay = snapshot_message(&snapshot).to_string();
        ws_manager
            .send_to(&conn_id, Message::Text(replay.into()))
            .await;
    }

    let (mut sink, mut stream) = socket.split();

    let writer_conn_id = conn_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() || closing {
                tracing::debug!(conn_id = %writer_conn_id, "WebSocket writer finished");
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => tracing::trace!(conn_id = %conn_id, "Pong received"),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    ws_manager.remove(&conn_id).await;
    writer.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
