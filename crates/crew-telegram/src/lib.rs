//! Telegram session lifecycle and peer plumbing for the comment bridge.
//!
//! Owns the single external-platform session per process: interactive
//! first-login bootstrap or headless token resume, outbound sends with a
//! typed failure taxonomy, a long-poll inbound subscription, and the
//! directory lookup used to label inbound senders.

pub mod telegram_contract;
pub mod telegram_inbound;
pub mod telegram_peer;
pub mod telegram_session;

pub use telegram_contract::*;
pub use telegram_inbound::*;
pub use telegram_peer::*;
pub use telegram_session::*;
