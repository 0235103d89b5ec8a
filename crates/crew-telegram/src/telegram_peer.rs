use serde_json::{json, Value};
use thiserror::Error;

/// Address-book sigil that marks a stored identifier as a handle.
pub const HANDLE_SIGIL: char = '@';

#[derive(Debug, Clone, PartialEq, Eq)]
/// Resolved external-platform address. Conversion from the stored string
/// happens exactly once here; downstream code never re-parses.
pub enum PeerAddress {
    Handle(String),
    /// Account ids exceed 32-bit range, so the wide form is mandatory.
    UserId(i64),
}

impl PeerAddress {
    pub fn as_wire_value(&self) -> Value {
        match self {
            Self::Handle(handle) => json!({"kind": "handle", "value": handle}),
            Self::UserId(id) => json!({"kind": "user_id", "value": id}),
        }
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handle(handle) => write!(f, "{handle}"),
            Self::UserId(id) => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeerResolveError {
    #[error("worker has no stored telegram id")]
    Missing,
    #[error("stored telegram id '{0}' is neither a handle nor a numeric account id")]
    Invalid(String),
}

/// Maps a worker's stored telegram id to a sendable address. Empty or
/// absent input fails with `Missing` so callers can skip external delivery
/// without failing the enclosing reply operation.
pub fn resolve_peer_address(raw: Option<&str>) -> Result<PeerAddress, PeerResolveError> {
    let trimmed = raw.map(str::trim).unwrap_or("");
    if trimmed.is_empty() {
        return Err(PeerResolveError::Missing);
    }
    if is_telegram_handle(trimmed) {
        return Ok(PeerAddress::Handle(trimmed.to_string()));
    }
    trimmed
        .parse::<i64>()
        .map(PeerAddress::UserId)
        .map_err(|_| PeerResolveError::Invalid(trimmed.to_string()))
}

fn is_telegram_handle(value: &str) -> bool {
    value.starts_with(HANDLE_SIGIL)
        && value.len() > 1
        && value[1..]
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
