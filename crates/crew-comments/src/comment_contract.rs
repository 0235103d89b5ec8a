use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const COMMENT_DOCUMENT_SCHEMA_VERSION: u32 = 1;

/// Tenant key reserved for the login shell; comments may not live there.
pub const RESERVED_TENANT_KEY: &str = "main";

pub const UNKNOWN_WORKER_NAME: &str = "Unknown Worker";
pub const UNASSIGNED_DEPARTMENT_NAME: &str = "Unassigned";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Role of the account appending a reply.
pub enum AuthorRole {
    Worker,
    Admin,
}

impl AuthorRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Worker => "worker",
            Self::Admin => "admin",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub text: String,
    pub is_admin_reply: bool,
    pub is_new: bool,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub author_worker_id: String,
    pub tenant_key: String,
    pub text: String,
    pub created_at: u64,
    pub is_new: bool,
    #[serde(default)]
    pub has_unread_admin_reply: bool,
    #[serde(default)]
    pub last_reply_timestamp: Option<u64>,
    #[serde(default)]
    pub replies: Vec<Reply>,
}

impl Comment {
    /// Appends a reply and applies the unread state transitions: an admin
    /// reply flags the thread for the worker; any reply re-flags the thread
    /// itself as unread.
    pub fn append_reply(&mut self, text: &str, role: AuthorRole, now_unix_ms: u64) -> &Reply {
        let reply = Reply {
            text: text.to_string(),
            is_admin_reply: role.is_admin(),
            is_new: true,
            created_at: now_unix_ms,
        };
        self.replies.push(reply);
        if role.is_admin() {
            self.has_unread_admin_reply = true;
            self.last_reply_timestamp = Some(now_unix_ms);
        }
        self.is_new = true;
        self.replies.last().expect("reply just pushed")
    }

    /// Clears the unread flag on the comment and every reply. Idempotent.
    pub fn mark_read(&mut self) {
        self.is_new = false;
        for reply in &mut self.replies {
            reply.is_new = false;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Display fields joined onto a thread for clients; falls back to
/// placeholder values when the worker record is gone.
pub struct WorkerDisplay {
    pub id: String,
    pub name: String,
    pub department: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub telegram_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedComment {
    #[serde(flatten)]
    pub comment: Comment,
    pub worker: WorkerDisplay,
}

#[derive(Debug, Error)]
pub enum CommentStoreError {
    #[error("comment '{0}' was not found")]
    NotFound(String),
    #[error("{0}")]
    Validation(String),
    #[error("comment store io failure: {0}")]
    Io(#[from] anyhow::Error),
}

pub fn validate_comment_text(text: &str) -> Result<String, CommentStoreError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(CommentStoreError::Validation(
            "comment text cannot be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

pub fn validate_tenant_key(tenant_key: &str) -> Result<String, CommentStoreError> {
    let trimmed = tenant_key.trim();
    if trimmed.is_empty() || trimmed == RESERVED_TENANT_KEY {
        return Err(CommentStoreError::Validation(
            "tenant key is missing; log in again".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_comment() -> Comment {
        Comment {
            id: "c00000001".to_string(),
            author_worker_id: "w-7".to_string(),
            tenant_key: "acme".to_string(),
            text: "Shift swap request".to_string(),
            created_at: 1_760_000_000_000,
            is_new: true,
            has_unread_admin_reply: false,
            last_reply_timestamp: None,
            replies: Vec::new(),
        }
    }

    #[test]
    fn unit_append_admin_reply_sets_unread_flags() {
        let mut comment = sample_comment();
        comment.append_reply("Approved", AuthorRole::Admin, 1_760_000_100_000);
        assert!(comment.has_unread_admin_reply);
        assert_eq!(comment.last_reply_timestamp, Some(1_760_000_100_000));
        assert!(comment.is_new);
        assert!(comment.replies[0].is_admin_reply);
        assert!(comment.replies[0].is_new);
    }

    #[test]
    fn unit_append_worker_reply_does_not_flag_admin_unread() {
        let mut comment = sample_comment();
        comment.append_reply("Bumping this", AuthorRole::Worker, 1_760_000_100_000);
        assert!(!comment.has_unread_admin_reply);
        assert_eq!(comment.last_reply_timestamp, None);
        // The thread itself re-flags as unread regardless of author.
        assert!(comment.is_new);
    }

    #[test]
    fn unit_append_reply_preserves_existing_order() {
        let mut comment = sample_comment();
        comment.append_reply("first", AuthorRole::Worker, 1);
        comment.append_reply("second", AuthorRole::Admin, 2);
        comment.append_reply("third", AuthorRole::Worker, 3);
        let texts: Vec<&str> = comment
            .replies
            .iter()
            .map(|reply| reply.text.as_str())
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn unit_mark_read_is_idempotent() {
        let mut comment = sample_comment();
        comment.append_reply("first", AuthorRole::Admin, 1);
        comment.mark_read();
        let snapshot = comment.clone();
        comment.mark_read();
        assert_eq!(comment, snapshot);
        assert!(!comment.is_new);
        assert!(comment.replies.iter().all(|reply| !reply.is_new));
    }

    #[test]
    fn unit_validate_tenant_key_rejects_reserved_shell() {
        assert!(validate_tenant_key("main").is_err());
        assert!(validate_tenant_key("  ").is_err());
        assert_eq!(validate_tenant_key(" acme ").expect("tenant"), "acme");
    }

    #[test]
    fn unit_comment_serializes_with_wire_field_names() {
        let comment = sample_comment();
        let value = serde_json::to_value(&comment).expect("encode");
        assert!(value.get("authorWorkerId").is_some());
        assert!(value.get("tenantKey").is_some());
        assert!(value.get("isNew").is_some());
        assert!(value.get("hasUnreadAdminReply").is_some());
    }
}
