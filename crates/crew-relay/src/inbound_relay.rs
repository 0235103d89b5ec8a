use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crew_telegram::{TelegramInboundMessage, TelegramSession};

use crate::live_fanout::{LiveFanout, TelegramMessageEvent};

/// Directory seam used to label inbound senders for display.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn lookup_display_name(&self, user_id: i64) -> Result<String>;
}

#[async_trait]
impl PeerDirectory for TelegramSession {
    async fn lookup_display_name(&self, user_id: i64) -> Result<String> {
        TelegramSession::lookup_display_name(self, user_id).await
    }
}

/// Consumes the inbound stream until it ends, publishing one normalized
/// event per message in arrival order. Label resolution failure falls back
/// to the stringified account id; it never drops the event.
pub async fn run_inbound_relay(
    mut inbound: mpsc::Receiver<TelegramInboundMessage>,
    directory: Arc<dyn PeerDirectory>,
    fanout: LiveFanout,
) {
    while let Some(message) = inbound.recv().await {
        let origin = message.origin_id();
        let from_name = match directory.lookup_display_name(origin).await {
            Ok(label) => label,
            Err(error) => {
                tracing::debug!(origin, "sender label lookup failed: {error:#}");
                origin.to_string()
            }
        };
        let event = TelegramMessageEvent {
            from: origin.to_string(),
            from_name,
            text: message.text,
            timestamp: message.date.saturating_mul(1_000),
        };
        fanout.publish_telegram_message(&event);
    }
    tracing::info!("inbound relay stream ended");
}
