//! Comment-thread data model, persistence, and read-state operations.
//!
//! Comments are JSON documents on disk (one file per thread) with an
//! eagerly maintained unread state machine. The store also carries the
//! worker-profile directory used to enrich threads with display fields.

pub mod comment_contract;
pub mod comment_read_state;
pub mod comment_store;

pub use comment_contract::*;
pub use comment_read_state::*;
pub use comment_store::*;
