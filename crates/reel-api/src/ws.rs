//! Live export progress over WebSocket.
//!
//! The client opens `/api/export/ws` and sends one render request as JSON.
//! The server submits it and forwards every progress event until the
//! terminal one, then closes. A client that disconnects before that point
//! cancels its job.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use reel_models::{ExportEvent, RenderSettings};

use crate::metrics;
use crate::state::AppState;

/// Global counter for active WebSocket connections.
static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

/// Configuration for WebSocket backpressure.
const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const WS_CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Send an event with backpressure handling.
async fn send_event(tx: &mpsc::Sender<Message>, event: &ExportEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(j) => j,
        Err(_) => return false,
    };
    let sent = match tx.try_send(Message::Text(json)) {
        Ok(_) => true,
        Err(mpsc::error::TrySendError::Full(msg)) => {
            debug!("WebSocket send buffer full, applying backpressure");
            tx.send(msg).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    };
    if sent {
        metrics::record_ws_message_sent(event.type_str());
    }
    sent
}

/// WebSocket export endpoint.
pub async fn ws_export(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    ws.on_upgrade(|socket| async move {
        handle_export_socket(socket, state).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

async fn handle_export_socket(socket: WebSocket, state: AppState) {
    let (ws_sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                break;
            }
        }
        ws_sender
    });

    let settings = match read_request(&mut receiver).await {
        Ok(settings) => settings,
        Err(message) => {
            send_event(&tx, &ExportEvent::error(message)).await;
            let _ = tx.send(Message::Close(None)).await;
            drop(tx);
            let _ = send_task.await;
            return;
        }
    };

    let (job_id, mut events) = state.engine.submit_streaming(settings).await;
    info!(job_id = %job_id, "WebSocket export started");

    // Leaving this scope before the terminal event means the client is gone.
    let guard = scopeguard::guard((state.engine.clone(), job_id.clone()), |(engine, job_id)| {
        tokio::spawn(async move {
            if engine.cancel(&job_id).await {
                info!(job_id = %job_id, "Client disconnected, export cancelled");
                metrics::record_ws_disconnect_cancel();
            }
        });
    });

    let mut heartbeat = interval(WS_HEARTBEAT_INTERVAL);
    heartbeat.tick().await;

    let mut finished = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let terminal = event.is_terminal();
                if !send_event(&tx, &event).await {
                    break;
                }
                if terminal {
                    finished = true;
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!(job_id = %job_id, "WebSocket closed by client");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(job_id = %job_id, error = %e, "WebSocket receive error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    if finished {
        scopeguard::ScopeGuard::into_inner(guard);
        let _ = tx.send(Message::Close(None)).await;
    } else {
        drop(guard);
    }

    drop(tx);
    let _ = send_task.await;
}

/// Wait for the client's render request.
async fn read_request<S>(receiver: &mut S) -> Result<RenderSettings, String>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    match tokio::time::timeout(WS_CLIENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            serde_json::from_str(&text).map_err(|e| format!("Invalid request: {}", e))
        }
        Ok(_) | Err(_) => Err("Expected JSON message or connection timeout".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_read_request_accepts_editor_payload() {
        let payload = r#"{"videoPath":"a.mp4","subtitles":[{"text":"X","start":0,"end":-1}]}"#;
        let mut incoming = stream::iter(vec![Ok(Message::Text(payload.to_string()))]);
        let settings = read_request(&mut incoming).await.unwrap();
        assert_eq!(settings.source_video_path, "a.mp4");
        assert_eq!(settings.overlays.len(), 1);
    }

    #[tokio::test]
    async fn test_read_request_rejects_bad_input() {
        let mut incoming = stream::iter(vec![Ok(Message::Text("{not json".to_string()))]);
        let err = read_request(&mut incoming).await.unwrap_err();
        assert!(err.starts_with("Invalid request"));

        let mut incoming = stream::iter(vec![Ok(Message::Binary(vec![1, 2, 3]))]);
        assert!(read_request(&mut incoming).await.is_err());

        let mut closed = stream::iter(Vec::<Result<Message, axum::Error>>::new());
        assert!(read_request(&mut closed).await.is_err());
    }
}
