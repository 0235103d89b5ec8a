use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://gate.telegram.org";
pub const DEFAULT_CONNECT_RETRY_MAX_ATTEMPTS: usize = 5;
pub const DEFAULT_CONNECT_RETRY_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct TelegramSessionConfig {
    pub api_base: String,
    /// Platform application identifier issued with the api hash.
    pub api_id: i64,
    pub api_hash: String,
    /// Durable session token; absent means the interactive first-login path.
    pub session_token: Option<String>,
    /// Phone number used only during interactive bootstrap.
    pub phone_number: Option<String>,
    /// Second-factor secret used only during interactive bootstrap.
    pub two_factor_secret: Option<String>,
    pub connect_retry_max_attempts: usize,
    pub connect_retry_base_delay_ms: u64,
    pub http_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for TelegramSessionConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            api_id: 0,
            api_hash: String::new(),
            session_token: None,
            phone_number: None,
            two_factor_secret: None,
            connect_retry_max_attempts: DEFAULT_CONNECT_RETRY_MAX_ATTEMPTS,
            connect_retry_base_delay_ms: DEFAULT_CONNECT_RETRY_BASE_DELAY_MS,
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TelegramSendReceipt {
    pub peer: String,
    pub provider_message_id: Option<String>,
    pub sent_unix_ms: u64,
}

#[derive(Debug, Error)]
pub enum TelegramSendError {
    #[error("telegram session is not connected: {0}")]
    NotConnected(String),
    #[error("telegram peer '{peer}' is unreachable (status {status})")]
    PeerUnreachable { peer: String, status: u16 },
    #[error("telegram rejected the send (status {status}): {detail}")]
    Rejected { status: u16, detail: String },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
/// One long-poll update envelope as the platform delivers it.
pub struct TelegramInboundMessage {
    pub update_id: u64,
    #[serde(default)]
    pub sender_id: Option<i64>,
    pub peer_id: i64,
    #[serde(default)]
    pub text: String,
    /// Platform timestamps are epoch seconds.
    #[serde(default)]
    pub date: u64,
    #[serde(default)]
    pub outgoing: bool,
}

impl TelegramInboundMessage {
    /// Numeric account id the message originated from: the explicit sender
    /// when present, otherwise the originating peer.
    pub fn origin_id(&self) -> i64 {
        self.sender_id.unwrap_or(self.peer_id)
    }
}
