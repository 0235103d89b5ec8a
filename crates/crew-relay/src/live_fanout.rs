use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast;

pub const TELEGRAM_MESSAGE_EVENT: &str = "telegramMessage";
pub const FANOUT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Normalized inbound message as every connected viewer sees it.
pub struct TelegramMessageEvent {
    pub from: String,
    pub from_name: String,
    pub text: String,
    /// Epoch milliseconds.
    pub timestamp: u64,
}

/// Process-wide broadcast of serialized wire frames to connected viewers.
/// Purely transient: no backlog, no replay, no per-client filtering. A
/// viewer connecting after a frame was published never receives it.
#[derive(Debug, Clone)]
pub struct LiveFanout {
    tx: broadcast::Sender<String>,
}

impl Default for LiveFanout {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveFanout {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(FANOUT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Fire-and-forget publish: no acknowledgment, no backpressure. With
    /// zero subscribers the frame is simply dropped.
    pub fn publish_telegram_message(&self, event: &TelegramMessageEvent) {
        let frame = json!({
            "event": TELEGRAM_MESSAGE_EVENT,
            "payload": event,
        })
        .to_string();
        match self.tx.send(frame) {
            Ok(delivered_to) => {
                tracing::debug!(delivered_to, "published telegram message frame");
            }
            Err(_) => {
                tracing::debug!("telegram message frame dropped: no connected viewers");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> TelegramMessageEvent {
        TelegramMessageEvent {
            from: "555000111".to_string(),
            from_name: "Dana Kim".to_string(),
            text: "Got it, thanks".to_string(),
            timestamp: 1_760_000_000_000,
        }
    }

    #[tokio::test]
    async fn functional_subscribers_receive_named_event_frames() {
        let fanout = LiveFanout::new();
        let mut first = fanout.subscribe();
        let mut second = fanout.subscribe();
        fanout.publish_telegram_message(&sample_event());

        for receiver in [&mut first, &mut second] {
            let frame = receiver.recv().await.expect("frame");
            let value: serde_json::Value = serde_json::from_str(&frame).expect("json");
            assert_eq!(value["event"], TELEGRAM_MESSAGE_EVENT);
            assert_eq!(value["payload"]["from"], "555000111");
            assert_eq!(value["payload"]["fromName"], "Dana Kim");
            assert_eq!(value["payload"]["timestamp"], 1_760_000_000_000_u64);
        }
    }

    #[tokio::test]
    async fn unit_publish_without_subscribers_is_a_no_op() {
        let fanout = LiveFanout::new();
        assert_eq!(fanout.subscriber_count(), 0);
        fanout.publish_telegram_message(&sample_event());
    }

    #[tokio::test]
    async fn regression_late_subscriber_never_sees_earlier_frames() {
        let fanout = LiveFanout::new();
        // Keep one subscriber alive so the publish is actually delivered
        // somewhere, then attach a second one afterwards.
        let _early = fanout.subscribe();
        fanout.publish_telegram_message(&sample_event());
        let mut late = fanout.subscribe();
        assert!(matches!(
            late.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
