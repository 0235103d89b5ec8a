use std::sync::Arc;

use async_trait::async_trait;

use crew_telegram::{
    resolve_peer_address, PeerAddress, PeerResolveError, TelegramSendError, TelegramSendReceipt,
    TelegramSession, TelegramSessionManager,
};

/// Seam over the external send so dispatch logic and tests do not depend
/// on a live platform session.
#[async_trait]
pub trait OutboundMessenger: Send + Sync {
    async fn send_text(
        &self,
        peer: &PeerAddress,
        text: &str,
    ) -> Result<TelegramSendReceipt, TelegramSendError>;
}

#[async_trait]
impl OutboundMessenger for TelegramSession {
    async fn send_text(
        &self,
        peer: &PeerAddress,
        text: &str,
    ) -> Result<TelegramSendReceipt, TelegramSendError> {
        TelegramSession::send_text(self, peer, text).await
    }
}

/// Sending through the manager awaits the session-ready gate first, so a
/// send issued before bootstrap finished simply joins the in-flight
/// bootstrap instead of racing a second session into existence.
#[async_trait]
impl OutboundMessenger for TelegramSessionManager {
    async fn send_text(
        &self,
        peer: &PeerAddress,
        text: &str,
    ) -> Result<TelegramSendReceipt, TelegramSendError> {
        let session = self.bootstrap().await.map_err(|error| {
            TelegramSendError::NotConnected(format!("session bootstrap failed: {error:#}"))
        })?;
        session.send_text(peer, text).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// What happened to one external delivery attempt. Never an error: the
/// enclosing reply operation succeeds regardless.
pub enum DeliveryOutcome {
    Sent { peer: String },
    Skipped { reason: String },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Skipped { .. } => "skipped",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// Best-effort wrapper around the messenger: resolution and send failures
/// are downgraded to logged outcomes and never propagate. Failed sends are
/// not retried; a duplicate notification is worse than a missed one.
#[derive(Clone)]
pub struct BestEffortDelivery {
    messenger: Arc<dyn OutboundMessenger>,
}

impl BestEffortDelivery {
    pub fn new(messenger: Arc<dyn OutboundMessenger>) -> Self {
        Self { messenger }
    }

    pub async fn deliver(&self, raw_peer: Option<&str>, text: &str) -> DeliveryOutcome {
        let peer = match resolve_peer_address(raw_peer) {
            Ok(peer) => peer,
            Err(PeerResolveError::Missing) => {
                tracing::debug!("external delivery skipped: worker has no telegram id");
                return DeliveryOutcome::Skipped {
                    reason: PeerResolveError::Missing.to_string(),
                };
            }
            Err(error @ PeerResolveError::Invalid(_)) => {
                tracing::warn!("external delivery skipped: {error}");
                return DeliveryOutcome::Skipped {
                    reason: error.to_string(),
                };
            }
        };
        match self.messenger.send_text(&peer, text).await {
            Ok(receipt) => {
                tracing::info!(peer = %receipt.peer, "external notification delivered");
                DeliveryOutcome::Sent { peer: receipt.peer }
            }
            Err(error) => {
                tracing::warn!(peer = %peer, "external notification failed: {error}");
                DeliveryOutcome::Failed {
                    reason: error.to_string(),
                }
            }
        }
    }
}
