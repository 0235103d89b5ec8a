use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::telegram_contract::TelegramInboundMessage;
use crate::telegram_session::TelegramSession;

pub const INBOUND_CHANNEL_CAPACITY: usize = 256;
const POLL_FAILURE_BACKOFF_CAP_MS: u64 = 30_000;

/// Subscribes to the session's inbound stream. The subscription is
/// infinite and not restartable; dropping the receiver ends the consumer
/// task. Only new, non-self-originated text messages are forwarded, in
/// arrival order.
pub fn subscribe_inbound(session: Arc<TelegramSession>) -> mpsc::Receiver<TelegramInboundMessage> {
    let (tx, rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
    tokio::spawn(run_inbound_poll_loop(session, tx));
    rx
}

async fn run_inbound_poll_loop(
    session: Arc<TelegramSession>,
    tx: mpsc::Sender<TelegramInboundMessage>,
) {
    let mut offset = 0u64;
    let mut consecutive_failures = 0u32;
    loop {
        match session.fetch_updates(offset).await {
            Ok(messages) => {
                consecutive_failures = 0;
                for message in messages {
                    if message.update_id >= offset {
                        offset = message.update_id.saturating_add(1);
                    }
                    if message.outgoing || message.text.trim().is_empty() {
                        continue;
                    }
                    if tx.send(message).await.is_err() {
                        return;
                    }
                }
            }
            Err(error) => {
                // Transport errors never crash the process; the stream just
                // stays quiet until the platform answers again.
                consecutive_failures = consecutive_failures.saturating_add(1);
                tracing::warn!(consecutive_failures, "telegram inbound poll failed: {error:#}");
                let backoff_ms = session
                    .poll_interval_ms()
                    .max(100)
                    .saturating_mul(u64::from(consecutive_failures))
                    .min(POLL_FAILURE_BACKOFF_CAP_MS);
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            }
        }
        if session.poll_interval_ms() > 0 {
            tokio::time::sleep(Duration::from_millis(session.poll_interval_ms())).await;
        }
    }
}
