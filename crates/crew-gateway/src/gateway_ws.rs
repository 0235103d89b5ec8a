use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use crate::gateway_routes::AppState;

/// Upgrades `/ws` and attaches the viewer to the live fan-out. No history
/// is replayed; the viewer only sees frames published while connected.
pub async fn handle_ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_viewer_socket(socket, state))
}

async fn handle_viewer_socket(socket: WebSocket, state: Arc<AppState>) {
    tracing::debug!("viewer websocket connected");
    let mut frames = state.fanout.subscribe();
    let (mut sink, mut stream) = socket.split();

    let mut forward_task = tokio::spawn(async move {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Fire-and-forget transport: a slow viewer just skips.
                    tracing::debug!(skipped, "viewer lagged behind the fan-out");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Viewers do not speak; drain their frames until the socket closes so
    // pings and close handshakes are serviced.
    let mut drain_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut forward_task => drain_task.abort(),
        _ = &mut drain_task => forward_task.abort(),
    }
    tracing::debug!("viewer websocket disconnected");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use crew_comments::CommentStore;
    use crew_relay::{LiveFanout, OutboundMessenger, TelegramMessageEvent};
    use crew_telegram::{PeerAddress, TelegramSendError, TelegramSendReceipt};
    use futures_util::StreamExt;
    use tokio::net::TcpListener;
    use tokio_tungstenite::connect_async;

    use crate::gateway_routes::{build_gateway_router, AppState};

    struct NoopMessenger;

    #[async_trait]
    impl OutboundMessenger for NoopMessenger {
        async fn send_text(
            &self,
            peer: &PeerAddress,
            _text: &str,
        ) -> Result<TelegramSendReceipt, TelegramSendError> {
            Ok(TelegramSendReceipt {
                peer: peer.to_string(),
                provider_message_id: None,
                sent_unix_ms: 0,
            })
        }
    }

    #[tokio::test]
    async fn integration_connected_viewer_receives_published_frames() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(CommentStore::open(temp.path()).expect("open store"));
        let fanout = LiveFanout::new();
        let state = Arc::new(AppState::new(store, Arc::new(NoopMessenger), fanout.clone()));
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let router = build_gateway_router(state);
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });

        let (mut socket, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("connect viewer");
        // Wait for the subscription to land before publishing.
        for _ in 0..50 {
            if fanout.subscriber_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        fanout.publish_telegram_message(&TelegramMessageEvent {
            from: "555000111".to_string(),
            from_name: "Dana Kim".to_string(),
            text: "Got it, thanks".to_string(),
            timestamp: 1_760_000_000_000,
        });

        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("frame in time")
            .expect("socket open")
            .expect("frame ok");
        let value: serde_json::Value =
            serde_json::from_str(frame.to_text().expect("text frame")).expect("json");
        assert_eq!(value["event"], "telegramMessage");
        assert_eq!(value["payload"]["from"], "555000111");
        assert_eq!(value["payload"]["fromName"], "Dana Kim");
        assert_eq!(value["payload"]["text"], "Got it, thanks");
    }
}
