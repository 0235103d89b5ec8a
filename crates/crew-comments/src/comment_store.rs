use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crew_core::{current_unix_timestamp_ms, write_text_atomic};

use crate::comment_contract::{
    validate_comment_text, validate_tenant_key, Comment, CommentStoreError, EnrichedComment,
    WorkerDisplay, WorkerProfile, COMMENT_DOCUMENT_SCHEMA_VERSION, UNASSIGNED_DEPARTMENT_NAME,
    UNKNOWN_WORKER_NAME,
};

const WORKER_DIRECTORY_FILE: &str = "workers.json";
const COMMENTS_DIR: &str = "comments";

#[derive(Debug, Serialize, Deserialize)]
struct CommentDocument {
    #[serde(default = "comment_document_schema_version")]
    schema_version: u32,
    comment: Comment,
}

fn comment_document_schema_version() -> u32 {
    COMMENT_DOCUMENT_SCHEMA_VERSION
}

#[derive(Debug, Serialize, Deserialize)]
struct WorkerDirectoryFile {
    #[serde(default = "comment_document_schema_version")]
    schema_version: u32,
    #[serde(default)]
    workers: BTreeMap<String, WorkerProfile>,
}

impl Default for WorkerDirectoryFile {
    fn default() -> Self {
        Self {
            schema_version: COMMENT_DOCUMENT_SCHEMA_VERSION,
            workers: BTreeMap::new(),
        }
    }
}

/// File-backed comment-thread store: one JSON document per thread plus a
/// worker-profile directory used for display enrichment.
#[derive(Debug)]
pub struct CommentStore {
    root: PathBuf,
    next_sequence: Mutex<u64>,
}

impl CommentStore {
    pub fn open(root: &Path) -> Result<Self, CommentStoreError> {
        let comments_dir = root.join(COMMENTS_DIR);
        std::fs::create_dir_all(&comments_dir)
            .with_context(|| format!("failed to create {}", comments_dir.display()))?;
        let next_sequence = highest_existing_sequence(&comments_dir)?.saturating_add(1);
        Ok(Self {
            root: root.to_path_buf(),
            next_sequence: Mutex::new(next_sequence),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn comments_dir(&self) -> PathBuf {
        self.root.join(COMMENTS_DIR)
    }

    fn comment_path(&self, id: &str) -> PathBuf {
        self.comments_dir().join(format!("{id}.json"))
    }

    fn worker_directory_path(&self) -> PathBuf {
        self.root.join(WORKER_DIRECTORY_FILE)
    }

    fn allocate_comment_id(&self) -> String {
        let mut guard = self.next_sequence.lock().expect("sequence lock poisoned");
        let id = format!("c{:08}", *guard);
        *guard = guard.saturating_add(1);
        id
    }

    pub fn create_comment(
        &self,
        author_worker_id: &str,
        tenant_key: &str,
        text: &str,
    ) -> Result<Comment, CommentStoreError> {
        let text = validate_comment_text(text)?;
        let tenant_key = validate_tenant_key(tenant_key)?;
        let author_worker_id = author_worker_id.trim();
        if author_worker_id.is_empty() {
            return Err(CommentStoreError::Validation(
                "comment author worker id cannot be empty".to_string(),
            ));
        }

        let comment = Comment {
            id: self.allocate_comment_id(),
            author_worker_id: author_worker_id.to_string(),
            tenant_key,
            text,
            created_at: current_unix_timestamp_ms(),
            is_new: true,
            has_unread_admin_reply: false,
            last_reply_timestamp: None,
            replies: Vec::new(),
        };
        self.save(&comment)?;
        Ok(comment)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Option<Comment>, CommentStoreError> {
        let path = self.comment_path(id.trim());
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let document = serde_json::from_str::<CommentDocument>(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(document.comment))
    }

    pub fn require_by_id(&self, id: &str) -> Result<Comment, CommentStoreError> {
        self.find_by_id(id)?
            .ok_or_else(|| CommentStoreError::NotFound(id.trim().to_string()))
    }

    pub fn save(&self, comment: &Comment) -> Result<(), CommentStoreError> {
        let document = CommentDocument {
            schema_version: COMMENT_DOCUMENT_SCHEMA_VERSION,
            comment: comment.clone(),
        };
        let encoded =
            serde_json::to_string_pretty(&document).context("failed to encode comment document")?;
        write_text_atomic(&self.comment_path(&comment.id), &encoded)?;
        Ok(())
    }

    /// Loads every readable comment document. Corrupt documents are skipped
    /// rather than failing the listing.
    fn all_comments(&self) -> Result<Vec<Comment>, CommentStoreError> {
        let dir = self.comments_dir();
        let entries = std::fs::read_dir(&dir)
            .with_context(|| format!("failed to read {}", dir.display()))?;
        let mut comments = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to enumerate {}", dir.display()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = std::fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(document) = serde_json::from_str::<CommentDocument>(&raw) {
                comments.push(document.comment);
            }
        }
        Ok(comments)
    }

    pub fn find_for_worker(&self, worker_id: &str) -> Result<Vec<Comment>, CommentStoreError> {
        let mut comments: Vec<Comment> = self
            .all_comments()?
            .into_iter()
            .filter(|comment| comment.author_worker_id == worker_id.trim())
            .collect();
        sort_newest_first(&mut comments);
        Ok(comments)
    }

    pub fn find_for_tenant(&self, tenant_key: &str) -> Result<Vec<Comment>, CommentStoreError> {
        let tenant_key = validate_tenant_key(tenant_key)?;
        let mut comments: Vec<Comment> = self
            .all_comments()?
            .into_iter()
            .filter(|comment| comment.tenant_key == tenant_key)
            .collect();
        sort_newest_first(&mut comments);
        Ok(comments)
    }

    pub fn find_unread_admin_replies(
        &self,
        worker_id: &str,
    ) -> Result<Vec<Comment>, CommentStoreError> {
        let mut comments: Vec<Comment> = self
            .all_comments()?
            .into_iter()
            .filter(|comment| {
                comment.author_worker_id == worker_id.trim() && comment.has_unread_admin_reply
            })
            .collect();
        sort_newest_first(&mut comments);
        Ok(comments)
    }

    /// Bulk-clears `hasUnreadAdminReply` across a worker's threads and
    /// returns how many documents changed. No-op when nothing is flagged.
    pub fn clear_unread_admin_replies(&self, worker_id: &str) -> Result<usize, CommentStoreError> {
        let flagged = self.find_unread_admin_replies(worker_id)?;
        let mut cleared = 0usize;
        for mut comment in flagged {
            comment.has_unread_admin_reply = false;
            self.save(&comment)?;
            cleared = cleared.saturating_add(1);
        }
        Ok(cleared)
    }

    pub fn upsert_worker_profile(&self, profile: &WorkerProfile) -> Result<(), CommentStoreError> {
        let mut directory = self.load_worker_directory()?;
        directory
            .workers
            .insert(profile.id.clone(), profile.clone());
        let encoded = serde_json::to_string_pretty(&directory)
            .context("failed to encode worker directory")?;
        write_text_atomic(&self.worker_directory_path(), &encoded)?;
        Ok(())
    }

    pub fn worker_profile(&self, id: &str) -> Result<Option<WorkerProfile>, CommentStoreError> {
        Ok(self.load_worker_directory()?.workers.get(id.trim()).cloned())
    }

    fn load_worker_directory(&self) -> Result<WorkerDirectoryFile, CommentStoreError> {
        let path = self.worker_directory_path();
        if !path.exists() {
            return Ok(WorkerDirectoryFile::default());
        }
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let directory = serde_json::from_str::<WorkerDirectoryFile>(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(directory)
    }

    /// Joins the owning worker's display fields onto a thread. A missing
    /// worker record falls back to placeholder display values instead of
    /// failing the read.
    pub fn enrich(&self, comment: Comment) -> Result<EnrichedComment, CommentStoreError> {
        let worker = match self.worker_profile(&comment.author_worker_id)? {
            Some(profile) => WorkerDisplay {
                id: profile.id,
                name: profile.name,
                department: profile
                    .department
                    .unwrap_or_else(|| UNASSIGNED_DEPARTMENT_NAME.to_string()),
                photo: profile.photo,
                telegram_id: profile.telegram_id,
            },
            None => WorkerDisplay {
                id: comment.author_worker_id.clone(),
                name: UNKNOWN_WORKER_NAME.to_string(),
                department: UNASSIGNED_DEPARTMENT_NAME.to_string(),
                photo: None,
                telegram_id: None,
            },
        };
        Ok(EnrichedComment { comment, worker })
    }

    pub fn enrich_all(
        &self,
        comments: Vec<Comment>,
    ) -> Result<Vec<EnrichedComment>, CommentStoreError> {
        comments
            .into_iter()
            .map(|comment| self.enrich(comment))
            .collect()
    }
}

fn sort_newest_first(comments: &mut [Comment]) {
    comments.sort_by(|left, right| {
        right
            .created_at
            .cmp(&left.created_at)
            .then_with(|| right.id.cmp(&left.id))
    });
}

fn highest_existing_sequence(comments_dir: &Path) -> Result<u64> {
    let mut highest = 0u64;
    let entries = std::fs::read_dir(comments_dir)
        .with_context(|| format!("failed to read {}", comments_dir.display()))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to enumerate {}", comments_dir.display()))?;
        let name = entry.file_name();
        let Some(stem) = name.to_str().and_then(|name| name.strip_suffix(".json")) else {
            continue;
        };
        if let Some(sequence) = stem
            .strip_prefix('c')
            .and_then(|digits| digits.parse::<u64>().ok())
        {
            highest = highest.max(sequence);
        }
    }
    Ok(highest)
}
