//! The cross-channel bridge: reply dispatch, inbound relay, and live fan-out.
//!
//! Connects the comment store to the external messaging session in both
//! directions. Outbound delivery is best-effort and isolated from thread
//! persistence; inbound messages are normalized and broadcast to every
//! connected viewer with no backlog or replay.

pub mod inbound_relay;
pub mod live_fanout;
pub mod outbound_messenger;
pub mod reply_dispatch;

pub use inbound_relay::*;
pub use live_fanout::*;
pub use outbound_messenger::*;
pub use reply_dispatch::*;
